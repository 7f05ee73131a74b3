//! GPU execution abstraction consumed by the pipeline.
//!
//! The core never dispatches shaders itself. It allocates buffers through a
//! [`GpuBackend`] and submits [`GpuTask`]s, each with an explicit dependency
//! list, to a [`TaskExecutor`] that runs them asynchronously.

pub mod memory;
pub mod task;

use crate::core::types::{Mat4, Result};

pub use memory::{MemoryBackend, RecordingExecutor};
pub use task::{GpuCommand, GpuTask, Kernel, KernelParams, TaskId, TaskOwner};

/// Opaque handle to a GPU buffer or texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

/// What a buffer stores; decides the element type on readback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// `f32` heights
    Height,
    /// `u32` packed control map
    Control,
    /// `u32` packed RGBA color
    Color,
    /// `f32` placement exclusion
    Exclusion,
    /// `f32` layer mask
    Mask,
    /// `Mat4` instance transforms
    Instances,
    /// `f32` hand-painted height edits
    ManualEdit,
}

impl BufferKind {
    /// Size of one element in bytes.
    pub fn element_size(&self) -> usize {
        match self {
            BufferKind::Instances => std::mem::size_of::<Mat4>(),
            _ => 4,
        }
    }
}

/// Buffer allocation request.
#[derive(Clone, Debug, PartialEq)]
pub struct BufferDesc {
    pub label: String,
    pub kind: BufferKind,
    pub width: u32,
    pub height: u32,
}

impl BufferDesc {
    pub fn new(label: impl Into<String>, kind: BufferKind, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            kind,
            width,
            height,
        }
    }

    pub fn element_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Buffer allocation and synchronous readback.
pub trait GpuBackend {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle>;
    fn free_buffer(&mut self, handle: BufferHandle);
    /// Outstanding (unfreed) buffers.
    fn live_buffer_count(&self) -> usize;
    fn read_heights(&self, handle: BufferHandle) -> Result<Vec<f32>>;
    fn read_control(&self, handle: BufferHandle) -> Result<Vec<u32>>;
    fn read_transforms(&self, handle: BufferHandle) -> Result<Vec<Mat4>>;
}

/// Asynchronous task execution.
pub trait TaskExecutor {
    /// Queue a task; its dependencies must already have been submitted.
    fn submit(&mut self, task: GpuTask) -> TaskId;
    fn has_pending_work(&self) -> bool;
    /// Drain completion notifications.
    fn poll(&mut self) -> Vec<TaskId>;
}
