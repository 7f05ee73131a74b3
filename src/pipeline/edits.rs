//! Hand-painted region edits that procedural layers must not overwrite.

use std::collections::HashMap;

use crate::gpu::{BufferHandle, GpuBackend};
use crate::region::RegionCoord;

#[derive(Debug, Default)]
pub struct ManualEdits {
    edits: HashMap<RegionCoord, BufferHandle>,
}

impl ManualEdits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the edit buffer for a region, taking ownership of `handle`.
    pub fn record(&mut self, coord: RegionCoord, handle: BufferHandle, backend: &mut dyn GpuBackend) {
        if let Some(old) = self.edits.insert(coord, handle) {
            if old != handle {
                backend.free_buffer(old);
            }
        }
    }

    pub fn get(&self, coord: RegionCoord) -> Option<BufferHandle> {
        self.edits.get(&coord).copied()
    }

    pub fn remove(&mut self, coord: RegionCoord, backend: &mut dyn GpuBackend) -> bool {
        match self.edits.remove(&coord) {
            Some(handle) => {
                backend.free_buffer(handle);
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn free_all(&mut self, backend: &mut dyn GpuBackend) {
        for (_, handle) in self.edits.drain() {
            backend.free_buffer(handle);
        }
    }
}
