//! Task descriptors submitted to the executor.

use std::fmt;
use std::sync::Arc;

use super::BufferHandle;
use crate::layer::{LayerId, LayerSnapshot};
use crate::region::{PixelOverlap, RegionCoord};

/// Executor-issued task identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

/// What a task works on; used for diagnostics and executor bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskOwner {
    Layer(LayerId),
    Region(RegionCoord),
}

/// Numeric kernel selected by a command. Kernels live outside the core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// Rasterize a layer shape with falloff into its mask
    LayerShape,
    /// Run one mask step over a layer mask
    MaskStep,
    HeightComposite,
    TextureComposite,
    FeatureApply,
    ExclusionClear,
    /// Max-blend a feature's influence into the exclusion map
    ExclusionWrite,
    BlendSmooth,
    ManualEditReapply,
    InstancePlacement,
    Visualization,
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-dispatch parameters. Layer data comes only from the frozen snapshot.
#[derive(Clone, Debug, Default)]
pub struct KernelParams {
    pub layer: Option<Arc<LayerSnapshot>>,
    pub region: Option<RegionCoord>,
    pub overlap: Option<PixelOverlap>,
    /// Mask step index for [`Kernel::MaskStep`]
    pub step: Option<usize>,
    pub world_scale: f32,
    pub passes: u32,
}

/// One kernel dispatch.
#[derive(Clone, Debug)]
pub struct GpuCommand {
    pub kernel: Kernel,
    pub reads: Vec<BufferHandle>,
    pub writes: Vec<BufferHandle>,
    pub params: KernelParams,
}

impl GpuCommand {
    pub fn new(kernel: Kernel, params: KernelParams) -> Self {
        Self {
            kernel,
            reads: Vec::new(),
            writes: Vec::new(),
            params,
        }
    }

    pub fn read(mut self, handle: BufferHandle) -> Self {
        self.reads.push(handle);
        self
    }

    pub fn write(mut self, handle: BufferHandle) -> Self {
        self.writes.push(handle);
        self
    }
}

/// A unit of asynchronous GPU work with explicit ordering edges.
#[derive(Clone, Debug)]
pub struct GpuTask {
    pub name: String,
    pub dependencies: Vec<TaskId>,
    pub owners: Vec<TaskOwner>,
    pub commands: Vec<GpuCommand>,
}

impl GpuTask {
    pub fn new(name: impl Into<String>, commands: Vec<GpuCommand>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            owners: Vec::new(),
            commands,
        }
    }

    /// Task that does nothing but keeps a dependency chain intact.
    pub fn noop(name: impl Into<String>, dependencies: Vec<TaskId>) -> Self {
        Self {
            name: name.into(),
            dependencies,
            owners: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn depends_on(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        for dep in deps {
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }

    pub fn owned_by(mut self, owner: TaskOwner) -> Self {
        self.owners.push(owner);
        self
    }

    pub fn is_noop(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_are_deduplicated() {
        let task = GpuTask::new("t", Vec::new())
            .depends_on([TaskId(1), TaskId(2)])
            .depends_on([TaskId(2), TaskId(3)]);
        assert_eq!(task.dependencies, vec![TaskId(1), TaskId(2), TaskId(3)]);
    }

    #[test]
    fn test_noop_task() {
        let task = GpuTask::noop("empty", vec![TaskId(4)]);
        assert!(task.is_noop());
        assert_eq!(task.dependencies, vec![TaskId(4)]);
    }
}
