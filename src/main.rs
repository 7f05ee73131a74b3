//! Headless terrain layer session.
//!
//! Builds a small scene, drags a road across it like an editor brush would,
//! and ticks the layer manager against the in-memory GPU backend.
//!
//! Usage: cargo run --release -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>       Load pipeline settings from JSON
//!   --save-config <PATH>  Write the effective settings as JSON and continue
//!   --frames <N>          Frames to simulate (default: 240)
//!   --drag <FRAMES>       Frames the road is dragged for (default: 60)
//!   --speed <UNITS>       Road drag distance per frame (default: 8.0)

use std::path::PathBuf;
use std::process;

use terralayer::core::logging;
use terralayer::core::types::{UVec2, Vec2};
use terralayer::gpu::{GpuBackend, MemoryBackend, RecordingExecutor};
use terralayer::layer::{FeatureCaps, Layer, MaskStep, Scene};
use terralayer::renderer::RecordingRenderer;
use terralayer::{HostContext, TerrainConfig, TerrainLayerManager, UpdatePhase};

const FRAME_TIME: f32 = 1.0 / 60.0;

fn main() {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let frames = parse_usize_arg(&args, "--frames").unwrap_or(240);
    let drag_frames = parse_usize_arg(&args, "--drag").unwrap_or(60);
    let speed = parse_f32_arg(&args, "--speed").unwrap_or(8.0);

    let config = match parse_str_arg(&args, "--config") {
        Some(path) => match TerrainConfig::load(&PathBuf::from(&path)) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to load config {}: {}", path, e);
                process::exit(1);
            }
        },
        None => TerrainConfig::default(),
    };
    if let Some(path) = parse_str_arg(&args, "--save-config") {
        match config.save(&PathBuf::from(&path)) {
            Ok(()) => log::info!("Wrote config to {}", path),
            Err(e) => log::warn!("Failed to write config {}: {}", path, e),
        }
    }

    let mut manager = match TerrainLayerManager::new(config.clone()) {
        Ok(manager) => manager,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };

    let size = config.region_size;
    let mut scene = Scene::new();
    scene.add(
        Layer::height("continent", Vec2::splat(size), Vec2::splat(size * 2.0))
            .with_pixel_size(UVec2::splat(config.region_resolution)),
    );
    scene.add(
        Layer::texture("rock slopes", Vec2::splat(size * 0.75), Vec2::splat(size))
            .with_mask(MaskStep::height_based("slope"))
            .with_pixel_size(UVec2::splat(config.region_resolution / 2)),
    );
    let road = scene.add(Layer::path(
        "road",
        FeatureCaps::path(1),
        vec![Vec2::new(size * 0.2, size * 0.5), Vec2::new(size * 0.9, size * 0.6)],
        12.0,
    ));
    let trees = scene.add(
        Layer::feature("forest", FeatureCaps::instancer(2, 1), Vec2::splat(size * 0.6), Vec2::splat(size * 0.5))
            .with_pixel_size(UVec2::splat(64)),
    );
    manager.select_layer(Some(trees));

    let mut backend = MemoryBackend::new();
    let mut executor = RecordingExecutor::new();
    let mut renderer = RecordingRenderer::new(size);

    let mut last_phase = manager.phase();
    let mut last_cycles = 0;
    for frame in 0..frames {
        let dragging = frame < drag_frames;
        if dragging {
            if let Some(layer) = scene.get_mut(road) {
                layer.translate(Vec2::new(speed, 0.0));
            }
            manager.signal_changes();
        }
        if dragging != manager.brush_active() {
            manager.set_brush_active(dragging);
        }

        let mut host = HostContext {
            scene: &mut scene,
            backend: &mut backend,
            executor: &mut executor,
            renderer: &mut renderer,
        };
        let phase = manager.tick(FRAME_TIME, &mut host);
        if phase != last_phase {
            log::debug!("Frame {}: {} -> {}", frame, last_phase, phase);
            last_phase = phase;
        }

        let stats = manager.stats();
        if stats.cycles_completed != last_cycles {
            last_cycles = stats.cycles_completed;
            let cycle = &stats.last_cycle;
            log::info!(
                "Frame {}: cycle {} ({}) - {} dirty layers, {} tasks, {} regions pushed, {} removed, {} instances, {} errors",
                frame,
                stats.cycles_completed,
                if cycle.interactive { "interactive" } else { "full" },
                cycle.dirty_layers,
                cycle.tasks_submitted,
                cycle.regions_pushed,
                cycle.regions_removed,
                cycle.instances_pushed,
                cycle.errors,
            );
        }
    }

    if manager.phase() != UpdatePhase::Idle {
        log::warn!("Stopped mid-cycle in phase {}", manager.phase());
    }

    let probe = Vec2::splat(size * 0.5);
    match manager.height_at(probe, &backend) {
        Some(height) => log::info!("Height at ({}, {}): {:.2}", probe.x, probe.y, height),
        None => log::info!("No height data at ({}, {})", probe.x, probe.y),
    }

    let stats = manager.stats();
    log::info!(
        "Done: {} cycles, {} deferred, {} regions live, {} tasks executed, {} trees placed",
        stats.cycles_completed,
        stats.deferred_updates,
        manager.regions().len(),
        executor.completion_order().len(),
        renderer.instance_count(1),
    );

    manager.shutdown(&mut backend);
    if backend.live_buffer_count() != 0 {
        log::warn!("{} buffers leaked", backend.live_buffer_count());
    }
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}
