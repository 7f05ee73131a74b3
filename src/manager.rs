//! Top-level orchestration, ticked once per frame by the host.
//!
//! A cycle walks Idle -> Processing -> ReadyToPush, then optionally
//! WaitingForInstancePush -> ReadyToPushInstances, and back to Idle. Every
//! state returns control to the host immediately; GPU work only ever
//! advances through executor polls.

use std::collections::HashSet;
use std::fmt;

use crate::config::TerrainConfig;
use crate::core::error::Error;
use crate::core::types::{Result, Vec2};
use crate::gpu::{BufferHandle, GpuBackend, TaskExecutor};
use crate::height_query::HeightQuery;
use crate::instancing::InstanceTracker;
use crate::layer::{
    affected_regions, propagate_dirty_state, propagate_position_changes, LayerCollection, LayerId,
    LayerSource,
};
use crate::pipeline::{PipelineContext, TerrainUpdateProcessor, UpdateRequest};
use crate::region::{RegionCoord, RegionDependencyManager, RegionMap};
use crate::renderer::{ControlImage, HeightImage, TerrainRenderer};
use crate::scheduler::UpdateScheduler;

/// Orchestrator state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UpdatePhase {
    #[default]
    Idle,
    /// GPU tasks in flight
    Processing,
    ReadyToPush,
    /// Waiting for the renderer before reading back instance buffers
    WaitingForInstancePush,
    ReadyToPushInstances,
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Counters of one update cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CycleStats {
    pub interactive: bool,
    pub dirty_layers: usize,
    pub tasks_submitted: usize,
    pub regions_processed: usize,
    pub regions_pushed: usize,
    pub regions_removed: usize,
    pub instances_pushed: usize,
    pub errors: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateStats {
    pub cycles_completed: u64,
    /// Updates postponed because the renderer was still busy
    pub deferred_updates: u64,
    pub last_cycle: CycleStats,
}

/// Host collaborators borrowed for one tick.
pub struct HostContext<'a> {
    pub scene: &'a mut dyn LayerSource,
    pub backend: &'a mut dyn GpuBackend,
    pub executor: &'a mut dyn TaskExecutor,
    pub renderer: &'a mut dyn TerrainRenderer,
}

/// Owns every pipeline component and drives the update state machine.
pub struct TerrainLayerManager {
    config: TerrainConfig,
    scheduler: UpdateScheduler,
    dependencies: RegionDependencyManager,
    collection: LayerCollection,
    regions: RegionMap,
    instances: InstanceTracker,
    processor: TerrainUpdateProcessor,
    height_query: HeightQuery,

    phase: UpdatePhase,
    brush_active: bool,
    selected_layer: Option<LayerId>,
    cycle_interactive: bool,
    processed_regions: Vec<RegionCoord>,
    regions_to_remove: Vec<RegionCoord>,
    /// Regions to recomposite on the next full pass
    deferred_regions: HashSet<RegionCoord>,
    /// Regions the renderer has been told about
    renderer_regions: HashSet<RegionCoord>,
    cycle: CycleStats,
    stats: UpdateStats,
}

impl TerrainLayerManager {
    /// Create a manager. Invalid configuration is fatal.
    pub fn new(config: TerrainConfig) -> Result<Self> {
        if let Err(e) = config.validate() {
            log::error!("Terrain layer pipeline not started: {}", e);
            return Err(e);
        }
        log::info!(
            "Terrain layer pipeline: region size {}, resolution {}, limit {}",
            config.region_size,
            config.region_resolution,
            config.region_limit
        );

        Ok(Self {
            scheduler: UpdateScheduler::from_config(&config),
            dependencies: RegionDependencyManager::new(config.region_size, config.region_limit),
            collection: LayerCollection::new(),
            regions: RegionMap::new(config.region_resolution),
            instances: InstanceTracker::new(),
            processor: TerrainUpdateProcessor::new(&config),
            height_query: HeightQuery::new(&config),
            phase: UpdatePhase::Idle,
            brush_active: false,
            selected_layer: None,
            cycle_interactive: false,
            processed_regions: Vec::new(),
            regions_to_remove: Vec::new(),
            deferred_regions: HashSet::new(),
            renderer_regions: HashSet::new(),
            cycle: CycleStats::default(),
            stats: UpdateStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    pub fn stats(&self) -> &UpdateStats {
        &self.stats
    }

    pub fn regions(&self) -> &RegionMap {
        &self.regions
    }

    pub fn dependencies(&self) -> &RegionDependencyManager {
        &self.dependencies
    }

    pub fn instances(&self) -> &InstanceTracker {
        &self.instances
    }

    /// A layer was edited; keeps updates interactive until edits settle.
    pub fn signal_changes(&mut self) {
        self.scheduler.signal_changes();
    }

    /// Pause the pipeline while the host paints directly into region buffers.
    pub fn set_brush_active(&mut self, active: bool) {
        self.brush_active = active;
    }

    pub fn brush_active(&self) -> bool {
        self.brush_active
    }

    /// Layer whose mask is visualized in the editor.
    pub fn select_layer(&mut self, layer: Option<LayerId>) {
        self.selected_layer = layer;
    }

    pub fn selected_layer(&self) -> Option<LayerId> {
        self.selected_layer
    }

    /// Store a hand-painted edit and recomposite its region on the next full pass.
    pub fn record_manual_edit(&mut self, coord: RegionCoord, handle: BufferHandle, backend: &mut dyn GpuBackend) {
        self.processor.record_manual_edit(coord, handle, backend);
        self.deferred_regions.insert(coord);
    }

    /// World-space height at `world` (x, z) from composited regions.
    pub fn height_at(&self, world: Vec2, backend: &dyn GpuBackend) -> Option<f32> {
        self.height_query.height_at(world, &self.regions, backend)
    }

    /// Regions recomposited but not pushed. Only accumulates with auto push off.
    pub fn take_updated_regions(&mut self) -> Vec<RegionCoord> {
        self.dependencies.take_updated_regions()
    }

    /// Advance the state machine by one frame.
    pub fn tick(&mut self, delta: f32, host: &mut HostContext<'_>) -> UpdatePhase {
        self.scheduler.process(delta);

        match self.phase {
            UpdatePhase::Idle => self.tick_idle(host),
            UpdatePhase::Processing => {
                let completed = host.executor.poll();
                if !completed.is_empty() {
                    log::trace!("{} task(s) completed", completed.len());
                }
                if !host.executor.has_pending_work() {
                    self.phase = UpdatePhase::ReadyToPush;
                }
            }
            UpdatePhase::ReadyToPush => self.push_regions(host),
            UpdatePhase::WaitingForInstancePush => {
                if !host.renderer.has_pending_work() {
                    let read = self.instances.readback(&*host.backend);
                    log::debug!("Read back {} instance buffer(s)", read);
                    self.phase = UpdatePhase::ReadyToPushInstances;
                }
            }
            UpdatePhase::ReadyToPushInstances => self.push_instances(host),
        }

        self.phase
    }

    fn tick_idle(&mut self, host: &mut HostContext<'_>) {
        if self.brush_active || !self.scheduler.should_process_update() {
            return;
        }
        if host.renderer.has_pending_work() {
            log::warn!("Renderer push still pending; deferring terrain update");
            self.stats.deferred_updates += 1;
            return;
        }
        self.process_update(host);
    }

    fn process_update(&mut self, host: &mut HostContext<'_>) {
        let interactive = self.scheduler.begin_update_cycle();
        self.cycle = CycleStats {
            interactive,
            ..Default::default()
        };
        self.cycle_interactive = interactive;

        let mut boundary = self.dependencies.update(host.scene.layers_mut());
        let diff = self.collection.refresh(host.scene.layers());
        if !diff.is_empty() {
            log::debug!("Layers added: {}, removed: {}", diff.added.len(), diff.removed.len());
        }

        let mut dirty: HashSet<LayerId> = self
            .collection
            .layers()
            .iter()
            .filter(|l| l.needs_update())
            .map(|l| l.id)
            .collect();
        dirty.extend(diff.added.iter().copied());
        if !interactive {
            dirty.extend(self.scheduler.take_redirty_layers());
            boundary.extend(self.deferred_regions.drain());
        }

        let moved: HashSet<LayerId> = self
            .collection
            .layers()
            .iter()
            .filter(|l| l.position_dirty)
            .map(|l| l.id)
            .collect();
        let dirty = propagate_position_changes(&self.collection, &moved, &dirty);
        let dirty = propagate_dirty_state(&self.collection, &dirty);
        let dirty_regions = affected_regions(&self.collection, &dirty, &boundary, self.config.region_size);
        let managed_stale = self.dependencies.regions_to_remove(self.regions.coords());

        for layer in host.scene.layers_mut() {
            layer.clear_dirty_flags();
        }

        if dirty.is_empty() && dirty_regions.is_empty() && managed_stale.is_empty() {
            self.complete_update_cycle(host);
            return;
        }

        let request = UpdateRequest::new(
            &self.collection,
            &dirty,
            dirty_regions,
            self.dependencies.active_region_coords(),
        )
        .with_interactive(interactive)
        .with_world_scale(self.config.world_scale)
        .with_selected_layer(self.selected_layer);
        log::debug!(
            "{} update: {} dirty layer(s), {} dirty region(s)",
            if interactive { "Interactive" } else { "Full" },
            request.dirty_layer_count(),
            request.dirty_regions.len()
        );

        let outcome = {
            let mut ctx = PipelineContext {
                layers: &self.collection,
                dependencies: &self.dependencies,
                regions: &mut self.regions,
                scheduler: &mut self.scheduler,
                backend: &mut *host.backend,
                executor: &mut *host.executor,
            };
            self.processor.process(&request, &mut ctx)
        };

        if interactive {
            // Region work was skipped; replay it with every dirty layer on the full pass
            for id in &dirty {
                self.scheduler.mark_layer_for_redirty(*id);
            }
            self.deferred_regions.extend(request.dirty_regions.iter().copied());
        } else {
            self.deferred_regions.extend(outcome.failed_regions.iter().copied());
            self.regions_to_remove = managed_stale;
        }
        for &id in &outcome.failed_layers {
            self.scheduler.mark_layer_for_redirty(id);
            self.deferred_regions.extend(self.dependencies.regions_for_layer(id));
        }

        self.cycle.dirty_layers = dirty.len();
        self.cycle.tasks_submitted = outcome.submitted_tasks.len();
        self.cycle.regions_processed = outcome.processed_regions.len();
        self.cycle.errors = outcome.errors;
        self.processed_regions = outcome.processed_regions;
        self.instances.track(outcome.pending_instance_buffers);

        self.phase = UpdatePhase::Processing;
    }

    fn push_regions(&mut self, host: &mut HostContext<'_>) {
        for coord in &self.processed_regions {
            self.dependencies.mark_region_updated(*coord);
        }

        if self.config.auto_push {
            for coord in self.dependencies.take_updated_regions() {
                match self.push_region(coord, host) {
                    Ok(()) => self.cycle.regions_pushed += 1,
                    Err(e) => {
                        log::warn!("Push of region {} failed, retrying next cycle: {}", coord, e);
                        self.cycle.errors += 1;
                        self.deferred_regions.insert(coord);
                    }
                }
            }
        }

        for coord in std::mem::take(&mut self.regions_to_remove) {
            if !self.regions.remove_region(coord, &mut *host.backend) {
                continue;
            }
            self.cycle.regions_removed += 1;
            if self.processor.discard_manual_edit(coord, &mut *host.backend) {
                log::debug!("Dropped manual edit of removed region {}", coord);
            }
            if self.renderer_regions.remove(&coord) {
                if let Err(e) = host.renderer.remove_region_layer(coord) {
                    log::warn!("Renderer could not remove region {}: {}", coord, e);
                }
            }
        }

        if !self.cycle_interactive && self.instances.needs_push(&self.collection, &self.dependencies) {
            self.phase = UpdatePhase::WaitingForInstancePush;
        } else {
            self.complete_update_cycle(host);
        }
    }

    fn push_region(&mut self, coord: RegionCoord, host: &mut HostContext<'_>) -> Result<()> {
        let region = self
            .regions
            .get(coord)
            .ok_or_else(|| Error::region(coord, "no region data to push"))?;
        let resolution = self.regions.resolution();
        let height = HeightImage {
            resolution,
            data: host.backend.read_heights(region.height)?,
        };
        let control = ControlImage {
            resolution,
            data: host.backend.read_control(region.control)?,
        };

        if !self.renderer_regions.contains(&coord) {
            host.renderer.add_region(coord)?;
            self.renderer_regions.insert(coord);
        }
        host.renderer.push_region(coord, &height, &control)
    }

    fn push_instances(&mut self, host: &mut HostContext<'_>) {
        if !host.renderer.is_ready() {
            log::warn!("Renderer not ready; skipping instance push this cycle");
            self.complete_update_cycle(host);
            return;
        }

        let plan = self.instances.aggregate(&self.collection, &self.dependencies);
        for (coord, mesh_id) in &plan.clears {
            host.renderer.clear_instances_for_mesh(*coord, *mesh_id);
        }
        for ((_, mesh_id), transforms) in &plan.transforms {
            if !transforms.is_empty() {
                host.renderer.add_instance_transforms(*mesh_id, transforms);
            }
        }
        for (layer, coord) in &plan.orphaned {
            self.regions.remove_instance_buffer(*coord, *layer, &mut *host.backend);
        }
        self.cycle.instances_pushed = plan.instance_count();
        log::debug!(
            "Pushed {} instance(s), cleared {} mesh slot(s)",
            self.cycle.instances_pushed,
            plan.clears.len()
        );

        self.complete_update_cycle(host);
    }

    fn complete_update_cycle(&mut self, host: &mut HostContext<'_>) {
        self.processed_regions.clear();
        self.regions_to_remove.clear();
        self.instances.clear_pending();

        for (layer, coord) in self.instances.untrack_missing(&self.collection) {
            self.regions.remove_instance_buffer(coord, layer, &mut *host.backend);
        }
        let collection = &self.collection;
        let pruned = self
            .regions
            .prune_instance_buffers(|id| collection.get(id).is_some_and(|l| l.is_instancer()), &mut *host.backend);
        if pruned > 0 {
            log::debug!("Freed {} instance buffer(s) of removed layers", pruned);
        }

        self.scheduler.complete_update_cycle();
        self.stats.cycles_completed += 1;
        self.stats.last_cycle = std::mem::take(&mut self.cycle);
        self.phase = UpdatePhase::Idle;
    }

    /// Release every GPU resource and forget all state.
    pub fn shutdown(&mut self, backend: &mut dyn GpuBackend) {
        self.regions.free_all(backend);
        self.processor.free_all(backend);
        self.instances = InstanceTracker::new();
        self.dependencies.clear();
        self.collection = LayerCollection::new();
        self.processed_regions.clear();
        self.regions_to_remove.clear();
        self.deferred_regions.clear();
        self.renderer_regions.clear();
        self.phase = UpdatePhase::Idle;
        log::info!("Terrain layer pipeline shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Mat4, UVec2, Vec3};
    use crate::gpu::{BufferDesc, BufferKind, MemoryBackend, RecordingExecutor};
    use crate::layer::{FeatureCaps, Layer, Scene};
    use crate::renderer::RecordingRenderer;

    struct Host {
        scene: Scene,
        backend: MemoryBackend,
        executor: RecordingExecutor,
        renderer: RecordingRenderer,
    }

    impl Host {
        fn new() -> Self {
            Self {
                scene: Scene::new(),
                backend: MemoryBackend::new(),
                executor: RecordingExecutor::new(),
                renderer: RecordingRenderer::new(1024.0),
            }
        }

        fn tick(&mut self, manager: &mut TerrainLayerManager, delta: f32) -> UpdatePhase {
            let mut ctx = HostContext {
                scene: &mut self.scene,
                backend: &mut self.backend,
                executor: &mut self.executor,
                renderer: &mut self.renderer,
            };
            manager.tick(delta, &mut ctx)
        }

        /// Start an update and tick until the manager is idle again.
        fn run_cycle(&mut self, manager: &mut TerrainLayerManager) {
            self.tick(manager, 1.0);
            for _ in 0..10 {
                if self.tick(manager, 0.0) == UpdatePhase::Idle {
                    return;
                }
            }
            panic!("cycle stuck in {}", manager.phase());
        }
    }

    fn config() -> TerrainConfig {
        TerrainConfig {
            region_resolution: 16,
            ..Default::default()
        }
    }

    fn hills() -> Layer {
        Layer::height("hills", Vec2::splat(512.0), Vec2::splat(1024.0)).with_pixel_size(UVec2::splat(8))
    }

    #[test]
    fn test_invalid_config_refuses_to_start() {
        let result = TerrainLayerManager::new(TerrainConfig {
            region_size: -1.0,
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_moved_layer_changes_active_regions() {
        let mut host = Host::new();
        let mut manager = TerrainLayerManager::new(config()).unwrap();
        let id = host.scene.add(hills());

        host.run_cycle(&mut manager);
        assert_eq!(manager.regions().coords(), vec![RegionCoord::new(0, 0)]);
        assert_eq!(host.renderer.pushed, vec![RegionCoord::new(0, 0)]);
        assert_eq!(manager.stats().cycles_completed, 1);

        host.renderer.clear_log();
        host.scene.get_mut(id).unwrap().translate(Vec2::new(1024.0, 0.0));
        host.run_cycle(&mut manager);

        assert_eq!(manager.regions().coords(), vec![RegionCoord::new(1, 0)]);
        assert_eq!(host.renderer.pushed, vec![RegionCoord::new(1, 0)]);
        assert_eq!(host.renderer.removed, vec![RegionCoord::new(0, 0)]);
        assert_eq!(manager.stats().last_cycle.regions_removed, 1);

        manager.shutdown(&mut host.backend);
        assert_eq!(host.backend.live_buffer_count(), 0);
    }

    #[test]
    fn test_nothing_dirty_completes_without_tasks() {
        let mut host = Host::new();
        let mut manager = TerrainLayerManager::new(config()).unwrap();
        host.scene.add(hills());
        host.run_cycle(&mut manager);
        host.executor.clear_history();

        host.tick(&mut manager, 1.0);
        assert_eq!(manager.phase(), UpdatePhase::Idle);
        assert!(host.executor.tasks().is_empty());
        assert_eq!(manager.stats().cycles_completed, 2);
    }

    #[test]
    fn test_instances_pushed_then_cleared_on_delete() {
        let mut host = Host::new();
        let mut manager = TerrainLayerManager::new(config()).unwrap();
        host.scene.add(hills());
        let trees = host.scene.add(
            Layer::feature("trees", FeatureCaps::instancer(1, 3), Vec2::splat(512.0), Vec2::splat(1024.0))
                .with_pixel_size(UVec2::splat(8)),
        );
        let coord = RegionCoord::new(0, 0);

        assert_eq!(host.tick(&mut manager, 1.0), UpdatePhase::Processing);
        let buffer = manager.regions().instance_buffer(coord, trees).unwrap();
        let transforms: Vec<Mat4> = (0..4)
            .map(|i| Mat4::from_translation(Vec3::new(100.0 + i as f32, 0.0, 100.0)))
            .collect();
        host.backend.write_transforms(buffer, &transforms).unwrap();

        assert_eq!(host.tick(&mut manager, 0.0), UpdatePhase::ReadyToPush);
        assert_eq!(host.tick(&mut manager, 0.0), UpdatePhase::WaitingForInstancePush);
        assert_eq!(host.tick(&mut manager, 0.0), UpdatePhase::ReadyToPushInstances);
        assert_eq!(host.tick(&mut manager, 0.0), UpdatePhase::Idle);
        assert_eq!(host.renderer.instances_in(coord, 3), 4);
        assert_eq!(manager.stats().last_cycle.instances_pushed, 4);

        host.scene.remove(trees);
        host.run_cycle(&mut manager);
        assert_eq!(host.renderer.instance_count(3), 0);
        assert!(host.renderer.cleared.contains(&(coord, 3)));
        assert!(manager.regions().instance_buffer(coord, trees).is_none());
        assert_eq!(manager.instances().tracked_layer_count(), 0);
    }

    #[test]
    fn test_waits_for_renderer_before_instance_readback() {
        let mut host = Host::new();
        let mut manager = TerrainLayerManager::new(config()).unwrap();
        host.scene.add(hills());
        host.scene.add(Layer::feature(
            "rocks",
            FeatureCaps::instancer(1, 5),
            Vec2::splat(512.0),
            Vec2::splat(256.0),
        ));

        host.tick(&mut manager, 1.0);
        host.tick(&mut manager, 0.0);
        assert_eq!(host.tick(&mut manager, 0.0), UpdatePhase::WaitingForInstancePush);

        host.renderer.pending_work = true;
        assert_eq!(host.tick(&mut manager, 0.0), UpdatePhase::WaitingForInstancePush);
        host.renderer.pending_work = false;
        assert_eq!(host.tick(&mut manager, 0.0), UpdatePhase::ReadyToPushInstances);
    }

    #[test]
    fn test_renderer_not_ready_still_completes() {
        let mut host = Host::new();
        let mut manager = TerrainLayerManager::new(config()).unwrap();
        host.scene.add(hills());
        host.scene.add(Layer::feature(
            "rocks",
            FeatureCaps::instancer(1, 5),
            Vec2::splat(512.0),
            Vec2::splat(256.0),
        ));
        host.renderer.ready = false;

        host.run_cycle(&mut manager);
        assert_eq!(manager.phase(), UpdatePhase::Idle);
        assert!(host.renderer.cleared.is_empty());
        assert_eq!(manager.stats().last_cycle.instances_pushed, 0);
    }

    #[test]
    fn test_held_executor_keeps_processing() {
        let mut host = Host::new();
        let mut manager = TerrainLayerManager::new(config()).unwrap();
        host.scene.add(hills());
        host.executor.hold = true;

        host.tick(&mut manager, 1.0);
        for _ in 0..5 {
            assert_eq!(host.tick(&mut manager, 1.0), UpdatePhase::Processing);
        }
        host.executor.hold = false;
        assert_eq!(host.tick(&mut manager, 0.0), UpdatePhase::ReadyToPush);
    }

    #[test]
    fn test_brush_stroke_pauses_pipeline() {
        let mut host = Host::new();
        let mut manager = TerrainLayerManager::new(config()).unwrap();
        host.scene.add(hills());

        manager.set_brush_active(true);
        assert_eq!(host.tick(&mut manager, 1.0), UpdatePhase::Idle);
        assert!(host.executor.tasks().is_empty());

        manager.set_brush_active(false);
        assert_eq!(host.tick(&mut manager, 0.0), UpdatePhase::Processing);
    }

    #[test]
    fn test_pending_renderer_push_defers_update() {
        let mut host = Host::new();
        let mut manager = TerrainLayerManager::new(config()).unwrap();
        host.scene.add(hills());
        host.renderer.pending_work = true;

        assert_eq!(host.tick(&mut manager, 1.0), UpdatePhase::Idle);
        assert_eq!(manager.stats().deferred_updates, 1);
        host.renderer.pending_work = false;
        assert_eq!(host.tick(&mut manager, 0.0), UpdatePhase::Processing);
    }

    #[test]
    fn test_interactive_pass_defers_regions_to_full_update() {
        let mut host = Host::new();
        let mut manager = TerrainLayerManager::new(config()).unwrap();
        host.scene.add(hills());

        manager.signal_changes();
        host.tick(&mut manager, 0.2);
        assert!(manager.stats().cycles_completed == 0 && manager.phase() == UpdatePhase::Processing);
        for _ in 0..3 {
            host.tick(&mut manager, 0.0);
        }
        assert_eq!(manager.phase(), UpdatePhase::Idle);
        assert!(manager.stats().last_cycle.interactive);
        assert!(manager.regions().is_empty());
        assert!(host.renderer.pushed.is_empty());

        // Interaction settles; the queued full update picks up the deferred work
        host.run_cycle(&mut manager);
        assert!(!manager.stats().last_cycle.interactive);
        assert_eq!(host.renderer.pushed, vec![RegionCoord::new(0, 0)]);
    }

    #[test]
    fn test_manual_push_when_auto_push_disabled() {
        let mut host = Host::new();
        let mut manager = TerrainLayerManager::new(TerrainConfig {
            auto_push: false,
            ..config()
        })
        .unwrap();
        host.scene.add(hills());

        host.run_cycle(&mut manager);
        assert!(host.renderer.pushed.is_empty());
        assert_eq!(manager.take_updated_regions(), vec![RegionCoord::new(0, 0)]);
    }

    #[test]
    fn test_rejected_push_is_retried() {
        let mut host = Host::new();
        let mut manager = TerrainLayerManager::new(config()).unwrap();
        host.scene.add(hills());
        let coord = RegionCoord::new(0, 0);
        host.renderer.reject.insert(coord);

        host.run_cycle(&mut manager);
        assert_eq!(manager.stats().last_cycle.errors, 1);
        assert!(host.renderer.pushed.is_empty());

        host.renderer.reject.clear();
        host.run_cycle(&mut manager);
        assert_eq!(host.renderer.pushed, vec![coord]);
    }

    #[test]
    fn test_failed_mask_is_regenerated_next_cycle() {
        let mut host = Host::new();
        let mut manager = TerrainLayerManager::new(config()).unwrap();
        let id = host.scene.add(hills());

        host.backend.fail_next_allocations(1);
        host.run_cycle(&mut manager);
        assert_eq!(manager.stats().last_cycle.errors, 1);
        assert!(manager.processor.masks().get(id).is_none());

        host.renderer.clear_log();
        host.executor.clear_history();
        host.run_cycle(&mut manager);
        assert!(manager.processor.masks().get(id).is_some());
        assert!(host.executor.find("height mask 'hills'").is_some());
        assert_eq!(manager.stats().last_cycle.errors, 0);
        assert_eq!(host.renderer.pushed, vec![RegionCoord::new(0, 0)]);
    }

    #[test]
    fn test_instances_cleared_when_terrain_moves_away() {
        let mut host = Host::new();
        let mut manager = TerrainLayerManager::new(config()).unwrap();
        let ground = host.scene.add(hills());
        let trees = host.scene.add(
            Layer::feature("trees", FeatureCaps::instancer(1, 3), Vec2::splat(512.0), Vec2::splat(1024.0))
                .with_pixel_size(UVec2::splat(8)),
        );
        let coord = RegionCoord::new(0, 0);

        host.tick(&mut manager, 1.0);
        let buffer = manager.regions().instance_buffer(coord, trees).unwrap();
        let transforms: Vec<Mat4> = (0..4)
            .map(|i| Mat4::from_translation(Vec3::new(200.0 + i as f32, 0.0, 200.0)))
            .collect();
        host.backend.write_transforms(buffer, &transforms).unwrap();
        for _ in 0..4 {
            host.tick(&mut manager, 0.0);
        }
        assert_eq!(manager.phase(), UpdatePhase::Idle);
        assert_eq!(host.renderer.instances_in(coord, 3), 4);

        host.scene.get_mut(ground).unwrap().translate(Vec2::new(1024.0, 0.0));
        host.run_cycle(&mut manager);

        assert!(!manager.regions().contains(coord));
        assert_eq!(host.renderer.instances_in(coord, 3), 0);
        assert!(host.renderer.cleared.contains(&(coord, 3)));
        assert!(manager.instances().persisted(trees, coord).is_none());
    }

    #[test]
    fn test_removed_region_frees_manual_edit() {
        let mut host = Host::new();
        let mut manager = TerrainLayerManager::new(config()).unwrap();
        let id = host.scene.add(hills());
        host.run_cycle(&mut manager);
        let coord = RegionCoord::new(0, 0);

        let edit = host
            .backend
            .create_buffer(&BufferDesc::new("edit", BufferKind::ManualEdit, 16, 16))
            .unwrap();
        manager.record_manual_edit(coord, edit, &mut host.backend);
        host.run_cycle(&mut manager);
        assert!(host.backend.contains(edit));
        let live = host.backend.live_buffer_count();

        host.scene.get_mut(id).unwrap().translate(Vec2::new(1024.0, 0.0));
        host.run_cycle(&mut manager);

        assert!(!host.backend.contains(edit));
        assert!(manager.processor.edits().get(coord).is_none());
        // Old region's three maps and the edit went, the new region's three came
        assert_eq!(host.backend.live_buffer_count(), live - 1);
    }

    #[test]
    fn test_height_query_reads_composited_region() {
        let mut host = Host::new();
        let mut manager = TerrainLayerManager::new(config()).unwrap();
        host.scene.add(hills());
        host.run_cycle(&mut manager);

        let height = manager.regions().get(RegionCoord::new(0, 0)).unwrap().height;
        host.backend.write_heights(height, &[3.0; 256]).unwrap();
        let h = manager.height_at(Vec2::new(300.0, 300.0), &host.backend).unwrap();
        assert!((h - 3.0).abs() < 1e-5);
        assert!(manager.height_at(Vec2::new(-5.0, 300.0), &host.backend).is_none());
    }
}
