//! Terrain update pipeline.
//!
//! Turns the dirty state of one cycle into ordered GPU tasks. Nothing here
//! blocks: tasks are submitted with explicit dependency edges and the
//! executor runs them asynchronously.

pub mod edits;
pub mod masks;
pub mod processor;

use std::collections::HashSet;
use std::fmt;

use crate::gpu::{GpuBackend, TaskExecutor, TaskId};
use crate::instancing::PendingInstances;
use crate::layer::{LayerCollection, LayerId, LayerTier};
use crate::region::{RegionCoord, RegionDependencyManager, RegionMap};
use crate::scheduler::UpdateScheduler;

pub use edits::ManualEdits;
pub use masks::{MaskCache, MaskSlot};
pub use processor::TerrainUpdateProcessor;

/// Pipeline phases in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    HeightMasks,
    HeightComposite,
    TextureMasks,
    TextureComposite,
    FeatureMasks,
    FeatureApply,
    Exclusion,
    BlendSmoothing,
    ManualEdits,
    InstancePlacement,
    Visualization,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::HeightMasks => "height masks",
            Phase::HeightComposite => "height composite",
            Phase::TextureMasks => "texture masks",
            Phase::TextureComposite => "texture composite",
            Phase::FeatureMasks => "feature masks",
            Phase::FeatureApply => "feature apply",
            Phase::Exclusion => "exclusion maps",
            Phase::BlendSmoothing => "blend smoothing",
            Phase::ManualEdits => "manual edits",
            Phase::InstancePlacement => "instance placement",
            Phase::Visualization => "visualization",
        };
        f.write_str(name)
    }
}

/// Input of one processor run.
#[derive(Clone, Debug)]
pub struct UpdateRequest {
    pub dirty_regions: HashSet<RegionCoord>,
    pub dirty_height: Vec<LayerId>,
    pub dirty_texture: Vec<LayerId>,
    /// Descending priority
    pub dirty_feature: Vec<LayerId>,
    pub active_regions: HashSet<RegionCoord>,
    /// Stop after height masks; region work waits for the full pass
    pub interactive: bool,
    pub world_scale: f32,
    /// Layer whose mask is shown in the editor
    pub selected_layer: Option<LayerId>,
}

impl UpdateRequest {
    /// Split `dirty` by tier in processing order.
    pub fn new(
        collection: &LayerCollection,
        dirty: &HashSet<LayerId>,
        dirty_regions: HashSet<RegionCoord>,
        active_regions: HashSet<RegionCoord>,
    ) -> Self {
        let mut request = Self {
            dirty_regions,
            dirty_height: Vec::new(),
            dirty_texture: Vec::new(),
            dirty_feature: Vec::new(),
            active_regions,
            interactive: false,
            world_scale: 1.0,
            selected_layer: None,
        };
        for layer in collection.processing_order() {
            if !dirty.contains(&layer.id) {
                continue;
            }
            match layer.tier() {
                LayerTier::Height => request.dirty_height.push(layer.id),
                LayerTier::Texture => request.dirty_texture.push(layer.id),
                LayerTier::Feature => request.dirty_feature.push(layer.id),
            }
        }
        request
    }

    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn with_world_scale(mut self, world_scale: f32) -> Self {
        self.world_scale = world_scale;
        self
    }

    pub fn with_selected_layer(mut self, layer: Option<LayerId>) -> Self {
        self.selected_layer = layer;
        self
    }

    pub fn dirty_layer_count(&self) -> usize {
        self.dirty_height.len() + self.dirty_texture.len() + self.dirty_feature.len()
    }
}

/// What a processor run submitted.
#[derive(Debug, Default)]
pub struct UpdateOutcome {
    pub submitted_tasks: Vec<TaskId>,
    /// Regions whose height composite was submitted, sorted
    pub processed_regions: Vec<RegionCoord>,
    /// Regions skipped after an error; retried next cycle
    pub failed_regions: Vec<RegionCoord>,
    /// Layers whose mask or placement could not be built; retried next full pass
    pub failed_layers: Vec<LayerId>,
    /// Instance buffers written this cycle, awaiting readback
    pub pending_instance_buffers: Vec<PendingInstances>,
    pub skipped_phases: Vec<Phase>,
    /// Layers whose mask resize was postponed by an interactive pass
    pub deferred_layers: Vec<LayerId>,
    /// Per-layer or per-region failures that were logged and skipped
    pub errors: usize,
    /// Run stopped after the height masks
    pub interactive_exit: bool,
}

impl UpdateOutcome {
    pub fn skipped(&self, phase: Phase) -> bool {
        self.skipped_phases.contains(&phase)
    }
}

/// Collaborators borrowed for one processor run.
pub struct PipelineContext<'a> {
    pub layers: &'a LayerCollection,
    pub dependencies: &'a RegionDependencyManager,
    pub regions: &'a mut RegionMap,
    pub scheduler: &'a mut UpdateScheduler,
    pub backend: &'a mut dyn GpuBackend,
    pub executor: &'a mut dyn TaskExecutor,
}
