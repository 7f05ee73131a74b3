//! Phased GPU task construction for one update cycle.
//!
//! Phases run in a fixed order and each one only submits tasks after the
//! previous phase's tasks exist, so construction order equals submission
//! order equals dependency order. Failures are contained to the layer or
//! region that caused them.

use std::collections::HashMap;
use std::sync::Arc;

use super::{ManualEdits, MaskCache, MaskSlot, Phase, PipelineContext, UpdateOutcome, UpdateRequest};
use crate::config::TerrainConfig;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::gpu::{
    BufferDesc, BufferHandle, BufferKind, GpuBackend, GpuCommand, GpuTask, Kernel, KernelParams,
    TaskId, TaskOwner,
};
use crate::instancing::PendingInstances;
use crate::layer::{Layer, LayerCollection, LayerId, LayerSnapshot, LayerTier};
use crate::math::Bounds2;
use crate::region::{pixel_overlap, regions_for_bounds, PixelOverlap, RegionCoord};

/// Task bookkeeping for a single run.
#[derive(Default)]
struct CycleTasks {
    snapshots: HashMap<LayerId, Arc<LayerSnapshot>>,
    masks: HashMap<LayerId, TaskId>,
    /// Feature mask tasks with their bounds and priority
    feature_masks: Vec<(Bounds2, i32, TaskId)>,
    /// Last task writing each region
    region_tail: HashMap<RegionCoord, TaskId>,
}

impl CycleTasks {
    /// One snapshot per layer per run, captured on first use.
    fn snapshot(&mut self, layer: &Layer) -> Arc<LayerSnapshot> {
        self.snapshots
            .entry(layer.id)
            .or_insert_with(|| layer.snapshot())
            .clone()
    }

    fn region_deps(&self, coord: RegionCoord) -> Vec<TaskId> {
        self.region_tail.get(&coord).copied().into_iter().collect()
    }
}

/// Builds and submits the GPU tasks of an update.
#[derive(Debug)]
pub struct TerrainUpdateProcessor {
    region_size: f32,
    resolution: u32,
    blend_smoothing: bool,
    smoothing_passes: u32,
    masks: MaskCache,
    edits: ManualEdits,
}

impl TerrainUpdateProcessor {
    pub fn new(config: &TerrainConfig) -> Self {
        Self {
            region_size: config.region_size,
            resolution: config.region_resolution,
            blend_smoothing: config.blend_smoothing,
            smoothing_passes: config.blend_smoothing_passes.max(1),
            masks: MaskCache::new(),
            edits: ManualEdits::new(),
        }
    }

    pub fn masks(&self) -> &MaskCache {
        &self.masks
    }

    pub fn edits(&self) -> &ManualEdits {
        &self.edits
    }

    /// Store a hand-painted edit for `coord`; reapplied after every recomposite.
    pub fn record_manual_edit(
        &mut self,
        coord: RegionCoord,
        handle: BufferHandle,
        backend: &mut dyn GpuBackend,
    ) {
        self.edits.record(coord, handle, backend);
    }

    /// Drop the stored edit of a region that went away.
    pub fn discard_manual_edit(&mut self, coord: RegionCoord, backend: &mut dyn GpuBackend) -> bool {
        self.edits.remove(coord, backend)
    }

    /// Release masks and stored edits.
    pub fn free_all(&mut self, backend: &mut dyn GpuBackend) {
        self.masks.free_all(backend);
        self.edits.free_all(backend);
    }

    /// Run every phase for `request`.
    pub fn process(&mut self, request: &UpdateRequest, ctx: &mut PipelineContext<'_>) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();
        let mut cycle = CycleTasks::default();

        self.masks.release_missing(ctx.layers, &mut *ctx.backend);

        // 1. Height masks
        if request.dirty_height.is_empty() {
            skip(&mut outcome, Phase::HeightMasks);
        } else {
            self.generate_masks(&request.dirty_height, request, ctx, &mut cycle, &mut outcome);
        }

        // 2. Interactive passes stop here
        if request.interactive {
            log::debug!(
                "Interactive pass: {} region(s) wait for the full update",
                request.dirty_regions.len()
            );
            outcome.interactive_exit = true;
            return outcome;
        }

        let mut regions: Vec<RegionCoord> = request
            .dirty_regions
            .iter()
            .filter(|coord| request.active_regions.contains(*coord))
            .copied()
            .collect();
        regions.sort();

        // 3. Height composite
        if regions.is_empty() {
            skip(&mut outcome, Phase::HeightComposite);
        } else {
            self.composite_height(&regions, request, ctx, &mut cycle, &mut outcome);
        }
        let processed = outcome.processed_regions.clone();

        // 4. Texture masks
        if request.dirty_texture.is_empty() {
            skip(&mut outcome, Phase::TextureMasks);
        } else {
            self.generate_masks(&request.dirty_texture, request, ctx, &mut cycle, &mut outcome);
        }

        // 5. Texture composite
        if processed.is_empty() {
            skip(&mut outcome, Phase::TextureComposite);
        } else {
            self.composite_texture(&processed, request, ctx, &mut cycle, &mut outcome);
        }

        // 6. Feature masks, descending priority
        if request.dirty_feature.is_empty() {
            skip(&mut outcome, Phase::FeatureMasks);
        } else {
            self.generate_masks(&request.dirty_feature, request, ctx, &mut cycle, &mut outcome);
        }

        // 7. Feature apply
        let with_features: Vec<RegionCoord> = processed
            .iter()
            .copied()
            .filter(|coord| self.has_applied_feature(*coord, ctx))
            .collect();
        if with_features.is_empty() {
            skip(&mut outcome, Phase::FeatureApply);
        } else {
            self.apply_features(&with_features, request, ctx, &mut cycle, &mut outcome);
        }

        // 8. Exclusion maps
        let with_instancers: Vec<RegionCoord> = processed
            .iter()
            .copied()
            .filter(|coord| {
                ctx.dependencies
                    .tiered_layers(*coord)
                    .is_some_and(|t| t.has_instancer())
            })
            .collect();
        if with_instancers.is_empty() {
            skip(&mut outcome, Phase::Exclusion);
        } else {
            self.write_exclusion(&with_instancers, request, ctx, &mut cycle, &mut outcome);
        }

        // 9. Blend smoothing
        if !self.blend_smoothing || processed.is_empty() {
            skip(&mut outcome, Phase::BlendSmoothing);
        } else {
            self.smooth_blends(&processed, request, ctx, &mut cycle, &mut outcome);
        }

        // 10. Manual edits
        let edited: Vec<RegionCoord> = processed
            .iter()
            .copied()
            .filter(|coord| self.edits.get(*coord).is_some())
            .collect();
        if edited.is_empty() {
            skip(&mut outcome, Phase::ManualEdits);
        } else {
            self.reapply_edits(&edited, request, ctx, &mut cycle, &mut outcome);
        }

        // 11. Instance placement
        if with_instancers.is_empty() {
            skip(&mut outcome, Phase::InstancePlacement);
        } else {
            self.place_instances(&with_instancers, request, ctx, &mut cycle, &mut outcome);
        }

        // 12. Visualization
        self.refresh_visualization(request, ctx, &mut cycle, &mut outcome);

        log::debug!(
            "Update submitted {} task(s) for {} region(s), {} error(s)",
            outcome.submitted_tasks.len(),
            outcome.processed_regions.len(),
            outcome.errors
        );
        outcome
    }

    fn generate_masks(
        &mut self,
        ids: &[LayerId],
        request: &UpdateRequest,
        ctx: &mut PipelineContext<'_>,
        cycle: &mut CycleTasks,
        outcome: &mut UpdateOutcome,
    ) {
        let layers = ctx.layers;
        for &id in ids {
            let Some(layer) = layers.get(id) else {
                log::debug!("Dirty layer {} left the scene", id);
                continue;
            };
            match self.mask_task(layer, request, ctx, cycle) {
                Ok(Some(task)) => {
                    let task_id = submit(ctx, outcome, task);
                    cycle.masks.insert(id, task_id);
                    if layer.tier() == LayerTier::Feature {
                        cycle.feature_masks.push((layer.bounds(), layer.priority(), task_id));
                    }
                }
                Ok(None) => outcome.deferred_layers.push(id),
                Err(e) => {
                    log::warn!("Mask generation for '{}' failed: {}", layer.name, e);
                    outcome.errors += 1;
                    outcome.failed_layers.push(id);
                }
            }
        }
    }

    fn mask_task(
        &mut self,
        layer: &Layer,
        request: &UpdateRequest,
        ctx: &mut PipelineContext<'_>,
        cycle: &mut CycleTasks,
    ) -> Result<Option<GpuTask>> {
        let handle = match self.masks.ensure(layer, &mut *ctx.backend, request.interactive)? {
            MaskSlot::Ready(handle) => handle,
            MaskSlot::Deferred => {
                ctx.scheduler.mark_layer_for_redirty(layer.id);
                return Ok(None);
            }
        };
        let snapshot = cycle.snapshot(layer);

        let mut deps: Vec<TaskId> = Vec::new();
        let mut heights = Vec::new();
        if snapshot.tier != LayerTier::Height && layer.requires_height() {
            for coord in regions_for_bounds(&snapshot.bounds, self.region_size) {
                deps.extend(cycle.region_tail.get(&coord));
                if let Some(region) = ctx.regions.get(coord) {
                    heights.push(region.height);
                }
            }
        }
        if snapshot.tier == LayerTier::Feature {
            let priority = layer.priority();
            deps.extend(
                cycle
                    .feature_masks
                    .iter()
                    .filter(|(bounds, p, _)| *p > priority && bounds.intersects(&snapshot.bounds))
                    .map(|(_, _, task)| *task),
            );
        }

        let params = KernelParams {
            layer: Some(snapshot.clone()),
            world_scale: request.world_scale,
            ..Default::default()
        };
        let mut commands = vec![GpuCommand::new(Kernel::LayerShape, params.clone()).write(handle)];
        for (index, step) in snapshot.masks.iter().enumerate() {
            let mut command = GpuCommand::new(
                Kernel::MaskStep,
                KernelParams {
                    step: Some(index),
                    ..params.clone()
                },
            )
            .read(handle);
            if step.requires_height {
                for &height in &heights {
                    command = command.read(height);
                }
            }
            commands.push(command.write(handle));
        }

        let name = format!("{} mask '{}'", tier_label(snapshot.tier), snapshot.name);
        Ok(Some(
            GpuTask::new(name, commands)
                .depends_on(deps)
                .owned_by(TaskOwner::Layer(layer.id)),
        ))
    }

    fn composite_height(
        &mut self,
        regions: &[RegionCoord],
        request: &UpdateRequest,
        ctx: &mut PipelineContext<'_>,
        cycle: &mut CycleTasks,
        outcome: &mut UpdateOutcome,
    ) {
        for &coord in regions {
            match self.height_composite_task(coord, request, ctx, cycle) {
                Ok(task) => {
                    let task_id = submit(ctx, outcome, task);
                    cycle.region_tail.insert(coord, task_id);
                    outcome.processed_regions.push(coord);
                }
                Err(e) => {
                    log::warn!("Skipping region {} this cycle: {}", coord, e);
                    outcome.errors += 1;
                    outcome.failed_regions.push(coord);
                }
            }
        }
    }

    fn height_composite_task(
        &self,
        coord: RegionCoord,
        request: &UpdateRequest,
        ctx: &mut PipelineContext<'_>,
        cycle: &mut CycleTasks,
    ) -> Result<GpuTask> {
        let (layers, dependencies) = (ctx.layers, ctx.dependencies);
        let tiers = dependencies
            .tiered_layers(coord)
            .ok_or_else(|| Error::region(coord, "no layers overlap the region"))?;
        let target = ctx.regions.get_or_create(coord, &mut *ctx.backend)?.height;

        // Base pass resets the region before layers blend in
        let mut commands =
            vec![GpuCommand::new(Kernel::HeightComposite, self.region_params(coord, request)).write(target)];
        let mut deps: Vec<TaskId> = Vec::new();
        for &id in &tiers.height {
            let Some((layer, mask, overlap)) = self.composite_input(id, coord, layers) else {
                continue;
            };
            deps.extend(cycle.masks.get(&id));
            commands.push(
                GpuCommand::new(Kernel::HeightComposite, self.layer_params(coord, request, layer, overlap, cycle))
                    .read(mask)
                    .write(target),
            );
        }

        Ok(chain(format!("height composite {coord}"), commands, deps).owned_by(TaskOwner::Region(coord)))
    }

    fn composite_texture(
        &mut self,
        regions: &[RegionCoord],
        request: &UpdateRequest,
        ctx: &mut PipelineContext<'_>,
        cycle: &mut CycleTasks,
        outcome: &mut UpdateOutcome,
    ) {
        let (layers, dependencies) = (ctx.layers, ctx.dependencies);
        for &coord in regions {
            let (Some(tiers), Some(region)) = (dependencies.tiered_layers(coord), ctx.regions.get(coord)) else {
                continue;
            };
            let (control, color) = (region.control, region.color);

            let mut commands = vec![
                GpuCommand::new(Kernel::TextureComposite, self.region_params(coord, request))
                    .write(control)
                    .write(color),
            ];
            let mut deps = cycle.region_deps(coord);
            for &id in &tiers.texture {
                let Some((layer, mask, overlap)) = self.composite_input(id, coord, layers) else {
                    continue;
                };
                deps.extend(cycle.masks.get(&id));
                commands.push(
                    GpuCommand::new(
                        Kernel::TextureComposite,
                        self.layer_params(coord, request, layer, overlap, cycle),
                    )
                    .read(mask)
                    .write(control)
                    .write(color),
                );
            }

            let task = chain(format!("texture composite {coord}"), commands, deps)
                .owned_by(TaskOwner::Region(coord));
            let task_id = submit(ctx, outcome, task);
            cycle.region_tail.insert(coord, task_id);
        }
    }

    fn has_applied_feature(&self, coord: RegionCoord, ctx: &PipelineContext<'_>) -> bool {
        ctx.dependencies.tiered_layers(coord).is_some_and(|tiers| {
            tiers.feature.iter().any(|id| {
                ctx.layers
                    .get(*id)
                    .and_then(Layer::feature_caps)
                    .is_some_and(|c| !c.is_instancer && (c.modifies_height || c.modifies_texture))
            })
        })
    }

    fn apply_features(
        &mut self,
        regions: &[RegionCoord],
        request: &UpdateRequest,
        ctx: &mut PipelineContext<'_>,
        cycle: &mut CycleTasks,
        outcome: &mut UpdateOutcome,
    ) {
        let (layers, dependencies) = (ctx.layers, ctx.dependencies);
        for &coord in regions {
            let (Some(tiers), Some(region)) = (dependencies.tiered_layers(coord), ctx.regions.get(coord)) else {
                continue;
            };
            let (height, control) = (region.height, region.control);

            let mut commands = Vec::new();
            let mut deps = cycle.region_deps(coord);
            for &id in &tiers.feature {
                let Some(caps) = layers.get(id).and_then(Layer::feature_caps).copied() else {
                    continue;
                };
                if caps.is_instancer {
                    continue;
                }
                let Some((layer, mask, overlap)) = self.composite_input(id, coord, layers) else {
                    continue;
                };
                deps.extend(cycle.masks.get(&id));
                let mut command = GpuCommand::new(
                    Kernel::FeatureApply,
                    self.layer_params(coord, request, layer, overlap, cycle),
                )
                .read(mask)
                .read(height);
                if caps.modifies_height {
                    command = command.write(height);
                }
                if caps.modifies_texture {
                    command = command.write(control);
                }
                commands.push(command);
            }

            let task = chain(format!("feature apply {coord}"), commands, deps).owned_by(TaskOwner::Region(coord));
            let task_id = submit(ctx, outcome, task);
            cycle.region_tail.insert(coord, task_id);
        }
    }

    fn write_exclusion(
        &mut self,
        regions: &[RegionCoord],
        request: &UpdateRequest,
        ctx: &mut PipelineContext<'_>,
        cycle: &mut CycleTasks,
        outcome: &mut UpdateOutcome,
    ) {
        let (layers, dependencies) = (ctx.layers, ctx.dependencies);
        for &coord in regions {
            let exclusion = match ctx.regions.ensure_exclusion(coord, &mut *ctx.backend) {
                Ok(handle) => handle,
                Err(e) => {
                    log::warn!("No exclusion map for region {}: {}", coord, e);
                    outcome.errors += 1;
                    continue;
                }
            };
            let Some(tiers) = dependencies.tiered_layers(coord) else {
                continue;
            };

            let mut commands =
                vec![GpuCommand::new(Kernel::ExclusionClear, self.region_params(coord, request)).write(exclusion)];
            let mut deps = cycle.region_deps(coord);
            for &id in &tiers.feature {
                if layers.get(id).is_none_or(Layer::is_instancer) {
                    continue;
                }
                let Some((layer, mask, overlap)) = self.composite_input(id, coord, layers) else {
                    continue;
                };
                deps.extend(cycle.masks.get(&id));
                commands.push(
                    GpuCommand::new(
                        Kernel::ExclusionWrite,
                        self.layer_params(coord, request, layer, overlap, cycle),
                    )
                    .read(mask)
                    .write(exclusion),
                );
            }

            let task = chain(format!("exclusion {coord}"), commands, deps).owned_by(TaskOwner::Region(coord));
            let task_id = submit(ctx, outcome, task);
            cycle.region_tail.insert(coord, task_id);
        }
    }

    fn smooth_blends(
        &mut self,
        regions: &[RegionCoord],
        request: &UpdateRequest,
        ctx: &mut PipelineContext<'_>,
        cycle: &mut CycleTasks,
        outcome: &mut UpdateOutcome,
    ) {
        for &coord in regions {
            let Some(region) = ctx.regions.get(coord) else {
                continue;
            };
            let control = region.control;
            let params = KernelParams {
                passes: self.smoothing_passes,
                ..self.region_params(coord, request)
            };
            let command = GpuCommand::new(Kernel::BlendSmooth, params).read(control).write(control);

            let task = chain(format!("blend smoothing {coord}"), vec![command], cycle.region_deps(coord))
                .owned_by(TaskOwner::Region(coord));
            let task_id = submit(ctx, outcome, task);
            cycle.region_tail.insert(coord, task_id);
        }
    }

    fn reapply_edits(
        &mut self,
        regions: &[RegionCoord],
        request: &UpdateRequest,
        ctx: &mut PipelineContext<'_>,
        cycle: &mut CycleTasks,
        outcome: &mut UpdateOutcome,
    ) {
        for &coord in regions {
            let (Some(edit), Some(region)) = (self.edits.get(coord), ctx.regions.get(coord)) else {
                continue;
            };
            let height = region.height;
            let command = GpuCommand::new(Kernel::ManualEditReapply, self.region_params(coord, request))
                .read(edit)
                .read(height)
                .write(height);

            let task = chain(format!("manual edits {coord}"), vec![command], cycle.region_deps(coord))
                .owned_by(TaskOwner::Region(coord));
            let task_id = submit(ctx, outcome, task);
            cycle.region_tail.insert(coord, task_id);
        }
    }

    fn place_instances(
        &mut self,
        regions: &[RegionCoord],
        request: &UpdateRequest,
        ctx: &mut PipelineContext<'_>,
        cycle: &mut CycleTasks,
        outcome: &mut UpdateOutcome,
    ) {
        let (layers, dependencies) = (ctx.layers, ctx.dependencies);
        for &coord in regions {
            let Some(tiers) = dependencies.tiered_layers(coord) else {
                continue;
            };
            for &id in &tiers.feature {
                let Some(layer) = layers.get(id).filter(|l| l.is_instancer()) else {
                    continue;
                };
                match self.instance_task(layer, coord, request, ctx, cycle) {
                    Ok(Some((task, pending))) => {
                        submit(ctx, outcome, task);
                        outcome.pending_instance_buffers.push(pending);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        log::warn!("Instance placement of '{}' in region {} failed: {}", layer.name, coord, e);
                        outcome.errors += 1;
                        if !outcome.failed_layers.contains(&id) {
                            outcome.failed_layers.push(id);
                        }
                    }
                }
            }
        }
    }

    fn instance_task(
        &self,
        layer: &Layer,
        coord: RegionCoord,
        request: &UpdateRequest,
        ctx: &mut PipelineContext<'_>,
        cycle: &mut CycleTasks,
    ) -> Result<Option<(GpuTask, PendingInstances)>> {
        let Some(caps) = layer.feature_caps().copied() else {
            return Ok(None);
        };
        let Some((layer, mask, overlap)) = self.composite_input(layer.id, coord, ctx.layers) else {
            log::debug!("No mask for instancer '{}' in region {}", layer.name, coord);
            return Ok(None);
        };

        let buffer = ctx.backend.create_buffer(&BufferDesc::new(
            format!("instances {} {}", layer.name, coord),
            BufferKind::Instances,
            caps.max_instances.max(1),
            1,
        ))?;
        if let Err(e) = ctx.regions.set_instance_buffer(coord, layer.id, buffer, &mut *ctx.backend) {
            ctx.backend.free_buffer(buffer);
            return Err(e);
        }
        let region = ctx
            .regions
            .get(coord)
            .ok_or_else(|| Error::region(coord, "region missing after instance allocation"))?;

        let mut command = GpuCommand::new(
            Kernel::InstancePlacement,
            self.layer_params(coord, request, layer, overlap, cycle),
        )
        .read(mask)
        .read(region.height);
        if let Some(exclusion) = region.exclusion {
            command = command.read(exclusion);
        }
        let command = command.write(buffer);

        let mut deps = cycle.region_deps(coord);
        deps.extend(cycle.masks.get(&layer.id));
        let task = chain(format!("instances '{}' {}", layer.name, coord), vec![command], deps)
            .owned_by(TaskOwner::Layer(layer.id))
            .owned_by(TaskOwner::Region(coord));

        Ok(Some((
            task,
            PendingInstances {
                layer: layer.id,
                region: coord,
                mesh_id: caps.mesh_id,
                buffer,
            },
        )))
    }

    fn refresh_visualization(
        &mut self,
        request: &UpdateRequest,
        ctx: &mut PipelineContext<'_>,
        cycle: &mut CycleTasks,
        outcome: &mut UpdateOutcome,
    ) {
        let layers = ctx.layers;
        let selected = request
            .selected_layer
            .and_then(|id| layers.get(id))
            .and_then(|layer| self.masks.get(layer.id).map(|mask| (layer, mask)));
        let Some((layer, mask)) = selected else {
            skip(outcome, Phase::Visualization);
            return;
        };

        let params = KernelParams {
            layer: Some(cycle.snapshot(layer)),
            world_scale: request.world_scale,
            ..Default::default()
        };
        let command = GpuCommand::new(Kernel::Visualization, params).read(mask);
        let deps: Vec<TaskId> = cycle.masks.get(&layer.id).copied().into_iter().collect();
        let task = chain(format!("visualize '{}'", layer.name), vec![command], deps)
            .owned_by(TaskOwner::Layer(layer.id));
        submit(ctx, outcome, task);
    }

    /// Layer, mask and pixel overlap for compositing `id` into `coord`.
    fn composite_input<'l>(
        &self,
        id: LayerId,
        coord: RegionCoord,
        layers: &'l LayerCollection,
    ) -> Option<(&'l Layer, BufferHandle, PixelOverlap)> {
        let layer = layers.get(id)?;
        let mask = self.masks.get(id)?;
        let overlap = pixel_overlap(coord, self.region_size, self.resolution, &layer.bounds(), layer.pixel_size)?;
        Some((layer, mask, overlap))
    }

    fn region_params(&self, coord: RegionCoord, request: &UpdateRequest) -> KernelParams {
        KernelParams {
            region: Some(coord),
            world_scale: request.world_scale,
            ..Default::default()
        }
    }

    fn layer_params(
        &self,
        coord: RegionCoord,
        request: &UpdateRequest,
        layer: &Layer,
        overlap: PixelOverlap,
        cycle: &mut CycleTasks,
    ) -> KernelParams {
        KernelParams {
            layer: Some(cycle.snapshot(layer)),
            overlap: Some(overlap),
            ..self.region_params(coord, request)
        }
    }
}

fn tier_label(tier: LayerTier) -> &'static str {
    match tier {
        LayerTier::Height => "height",
        LayerTier::Texture => "texture",
        LayerTier::Feature => "feature",
    }
}

/// Task for `commands`, or a no-op that keeps the dependency chain when empty.
fn chain(name: String, commands: Vec<GpuCommand>, deps: Vec<TaskId>) -> GpuTask {
    if commands.is_empty() {
        GpuTask::noop(name, deps)
    } else {
        GpuTask::new(name, commands).depends_on(deps)
    }
}

fn submit(ctx: &mut PipelineContext<'_>, outcome: &mut UpdateOutcome, task: GpuTask) -> TaskId {
    let id = ctx.executor.submit(task);
    outcome.submitted_tasks.push(id);
    id
}

fn skip(outcome: &mut UpdateOutcome, phase: Phase) {
    log::debug!("Skipping {}: nothing to do", phase);
    outcome.skipped_phases.push(phase);
}
