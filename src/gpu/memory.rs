//! CPU-side stand-ins for the GPU: a buffer store and a recording executor.
//!
//! Hosts without a compute backend (tools, headless tests) can drive the whole
//! pipeline with these. Kernels are not evaluated; buffer contents only change
//! through the explicit `write_*` hooks.

use std::collections::{HashMap, HashSet};

use super::{BufferDesc, BufferHandle, BufferKind, GpuBackend, GpuTask, TaskExecutor, TaskId};
use crate::core::error::Error;
use crate::core::types::{Mat4, Result};

#[derive(Debug)]
struct MemoryBuffer {
    desc: BufferDesc,
    bytes: Vec<u8>,
}

/// Buffer store backed by plain byte vectors.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    buffers: HashMap<BufferHandle, MemoryBuffer>,
    next_id: u64,
    /// Remaining allocations that fail, for exercising transient errors
    fail_allocations: usize,
    total_allocations: u64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` allocations fail.
    pub fn fail_next_allocations(&mut self, count: usize) {
        self.fail_allocations = count;
    }

    pub fn desc(&self, handle: BufferHandle) -> Option<&BufferDesc> {
        self.buffers.get(&handle).map(|b| &b.desc)
    }

    pub fn contains(&self, handle: BufferHandle) -> bool {
        self.buffers.contains_key(&handle)
    }

    /// Allocations made over the backend's lifetime.
    pub fn total_allocations(&self) -> u64 {
        self.total_allocations
    }

    pub fn write_heights(&mut self, handle: BufferHandle, data: &[f32]) -> Result<()> {
        self.write(handle, bytemuck::cast_slice(data), &[
            BufferKind::Height,
            BufferKind::Exclusion,
            BufferKind::Mask,
            BufferKind::ManualEdit,
        ])
    }

    pub fn write_control(&mut self, handle: BufferHandle, data: &[u32]) -> Result<()> {
        self.write(handle, bytemuck::cast_slice(data), &[BufferKind::Control, BufferKind::Color])
    }

    pub fn write_transforms(&mut self, handle: BufferHandle, data: &[Mat4]) -> Result<()> {
        self.write(handle, bytemuck::cast_slice(data), &[BufferKind::Instances])
    }

    fn write(&mut self, handle: BufferHandle, bytes: &[u8], kinds: &[BufferKind]) -> Result<()> {
        let buffer = self.buffer_mut(handle, kinds)?;
        let capacity = buffer.desc.element_count() * buffer.desc.kind.element_size();
        if bytes.len() > capacity {
            return Err(Error::Gpu(format!(
                "write of {} bytes exceeds '{}' capacity {}",
                bytes.len(),
                buffer.desc.label,
                capacity
            )));
        }
        if buffer.desc.kind == BufferKind::Instances {
            buffer.bytes = bytes.to_vec();
        } else {
            buffer.bytes[..bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }

    fn buffer(&self, handle: BufferHandle, kinds: &[BufferKind]) -> Result<&MemoryBuffer> {
        let buffer = self
            .buffers
            .get(&handle)
            .ok_or_else(|| Error::Gpu(format!("unknown buffer {:?}", handle)))?;
        if !kinds.contains(&buffer.desc.kind) {
            return Err(Error::Gpu(format!(
                "buffer '{}' is {:?}, expected one of {:?}",
                buffer.desc.label, buffer.desc.kind, kinds
            )));
        }
        Ok(buffer)
    }

    fn buffer_mut(&mut self, handle: BufferHandle, kinds: &[BufferKind]) -> Result<&mut MemoryBuffer> {
        self.buffer(handle, kinds)?;
        self.buffers
            .get_mut(&handle)
            .ok_or_else(|| Error::Gpu(format!("unknown buffer {:?}", handle)))
    }
}

impl GpuBackend for MemoryBackend {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle> {
        if self.fail_allocations > 0 {
            self.fail_allocations -= 1;
            return Err(Error::Gpu(format!("allocation of '{}' failed", desc.label)));
        }
        if desc.element_count() == 0 {
            return Err(Error::Gpu(format!("'{}' has zero size", desc.label)));
        }

        self.next_id += 1;
        self.total_allocations += 1;
        let handle = BufferHandle(self.next_id);
        // Instance buffers start empty; their length is the placed instance count
        let bytes = match desc.kind {
            BufferKind::Instances => Vec::new(),
            kind => vec![0; desc.element_count() * kind.element_size()],
        };
        self.buffers.insert(handle, MemoryBuffer { desc: desc.clone(), bytes });
        log::trace!("Allocated '{}' as {:?}", desc.label, handle);
        Ok(handle)
    }

    fn free_buffer(&mut self, handle: BufferHandle) {
        if self.buffers.remove(&handle).is_none() {
            log::warn!("Freeing unknown buffer {:?}", handle);
        }
    }

    fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn read_heights(&self, handle: BufferHandle) -> Result<Vec<f32>> {
        let buffer = self.buffer(handle, &[
            BufferKind::Height,
            BufferKind::Exclusion,
            BufferKind::Mask,
            BufferKind::ManualEdit,
        ])?;
        Ok(bytemuck::pod_collect_to_vec(&buffer.bytes))
    }

    fn read_control(&self, handle: BufferHandle) -> Result<Vec<u32>> {
        let buffer = self.buffer(handle, &[BufferKind::Control, BufferKind::Color])?;
        Ok(bytemuck::pod_collect_to_vec(&buffer.bytes))
    }

    fn read_transforms(&self, handle: BufferHandle) -> Result<Vec<Mat4>> {
        let buffer = self.buffer(handle, &[BufferKind::Instances])?;
        Ok(bytemuck::pod_collect_to_vec(&buffer.bytes))
    }
}

/// Executor that records every submitted task and completes them in
/// dependency order on [`poll`](TaskExecutor::poll).
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    next_id: u64,
    tasks: Vec<(TaskId, GpuTask)>,
    pending: Vec<TaskId>,
    completed: HashSet<TaskId>,
    completion_order: Vec<TaskId>,
    /// While set, `poll` completes nothing (simulates long-running work)
    pub hold: bool,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every task submitted since the last [`clear_history`](Self::clear_history).
    pub fn tasks(&self) -> &[(TaskId, GpuTask)] {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<&GpuTask> {
        self.tasks.iter().find(|(tid, _)| *tid == id).map(|(_, t)| t)
    }

    /// First task whose name matches exactly.
    pub fn find(&self, name: &str) -> Option<(TaskId, &GpuTask)> {
        self.tasks
            .iter()
            .find(|(_, t)| t.name == name)
            .map(|(id, t)| (*id, t))
    }

    pub fn names(&self) -> Vec<&str> {
        self.tasks.iter().map(|(_, t)| t.name.as_str()).collect()
    }

    pub fn completion_order(&self) -> &[TaskId] {
        &self.completion_order
    }

    pub fn clear_history(&mut self) {
        self.tasks.clear();
        self.completion_order.clear();
    }
}

impl TaskExecutor for RecordingExecutor {
    fn submit(&mut self, task: GpuTask) -> TaskId {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        for dep in &task.dependencies {
            if dep.0 >= id.0 {
                log::warn!("Task '{}' depends on unsubmitted task {:?}", task.name, dep);
            }
        }
        log::trace!("Submitted '{}' as {:?} ({} deps)", task.name, id, task.dependencies.len());
        self.tasks.push((id, task));
        self.pending.push(id);
        id
    }

    fn has_pending_work(&self) -> bool {
        !self.pending.is_empty()
    }

    fn poll(&mut self) -> Vec<TaskId> {
        if self.hold {
            return Vec::new();
        }

        let mut done = Vec::new();
        loop {
            let ready: Vec<TaskId> = self
                .pending
                .iter()
                .copied()
                .filter(|id| {
                    self.task(*id).is_some_and(|t| {
                        t.dependencies.iter().all(|d| self.completed.contains(d) || !self.is_known(*d))
                    })
                })
                .collect();
            if ready.is_empty() {
                break;
            }
            for id in ready {
                self.pending.retain(|p| *p != id);
                self.completed.insert(id);
                self.completion_order.push(id);
                done.push(id);
            }
        }
        done
    }
}

impl RecordingExecutor {
    fn is_known(&self, id: TaskId) -> bool {
        id.0 >= 1 && id.0 <= self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_free() {
        let mut backend = MemoryBackend::new();
        let h = backend
            .create_buffer(&BufferDesc::new("height", BufferKind::Height, 4, 4))
            .unwrap();
        assert_eq!(backend.live_buffer_count(), 1);
        assert_eq!(backend.read_heights(h).unwrap(), vec![0.0; 16]);
        backend.free_buffer(h);
        assert_eq!(backend.live_buffer_count(), 0);
        assert!(backend.read_heights(h).is_err());
    }

    #[test]
    fn test_failed_allocation() {
        let mut backend = MemoryBackend::new();
        backend.fail_next_allocations(1);
        let desc = BufferDesc::new("height", BufferKind::Height, 4, 4);
        assert!(backend.create_buffer(&desc).is_err());
        assert!(backend.create_buffer(&desc).is_ok());
    }

    #[test]
    fn test_write_and_read_back() {
        let mut backend = MemoryBackend::new();
        let h = backend
            .create_buffer(&BufferDesc::new("height", BufferKind::Height, 2, 2))
            .unwrap();
        backend.write_heights(h, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(backend.read_heights(h).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert!(backend.write_heights(h, &[0.0; 5]).is_err());
        assert!(backend.read_control(h).is_err(), "kind mismatch");
    }

    #[test]
    fn test_instance_buffer_length_tracks_writes() {
        let mut backend = MemoryBackend::new();
        let h = backend
            .create_buffer(&BufferDesc::new("trees", BufferKind::Instances, 16, 1))
            .unwrap();
        assert!(backend.read_transforms(h).unwrap().is_empty());
        backend
            .write_transforms(h, &[Mat4::IDENTITY, Mat4::from_translation(glam::Vec3::X)])
            .unwrap();
        assert_eq!(backend.read_transforms(h).unwrap().len(), 2);
    }

    #[test]
    fn test_executor_completes_in_dependency_order() {
        let mut exec = RecordingExecutor::new();
        let a = exec.submit(GpuTask::new("a", Vec::new()));
        let b = exec.submit(GpuTask::new("b", Vec::new()).depends_on([a]));
        let c = exec.submit(GpuTask::new("c", Vec::new()).depends_on([b, a]));
        assert!(exec.has_pending_work());

        let done = exec.poll();
        assert_eq!(done, vec![a, b, c]);
        assert!(!exec.has_pending_work());
        assert_eq!(exec.find("b").map(|(id, _)| id), Some(b));
    }

    #[test]
    fn test_executor_hold() {
        let mut exec = RecordingExecutor::new();
        exec.submit(GpuTask::noop("n", Vec::new()));
        exec.hold = true;
        assert!(exec.poll().is_empty());
        assert!(exec.has_pending_work());
        exec.hold = false;
        assert_eq!(exec.poll().len(), 1);
    }
}
