//! Private per-layer mask buffers.

use std::collections::HashMap;

use crate::core::types::{Result, UVec2};
use crate::gpu::{BufferDesc, BufferHandle, BufferKind, GpuBackend};
use crate::layer::{Layer, LayerCollection, LayerId};

/// Result of asking for a layer's mask buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskSlot {
    Ready(BufferHandle),
    /// Reallocation needed but skipped during an interactive pass
    Deferred,
}

#[derive(Debug)]
struct MaskEntry {
    handle: BufferHandle,
    size: UVec2,
}

/// Mask buffers keyed by layer. Layers never see region buffers, only these.
#[derive(Debug, Default)]
pub struct MaskCache {
    masks: HashMap<LayerId, MaskEntry>,
}

impl MaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mask buffer sized for the layer's current pixel size.
    ///
    /// A first allocation always happens. Resizing an existing mask is
    /// deferred while `interactive` is set.
    pub fn ensure(
        &mut self,
        layer: &Layer,
        backend: &mut dyn GpuBackend,
        interactive: bool,
    ) -> Result<MaskSlot> {
        if let Some(entry) = self.masks.get(&layer.id) {
            if entry.size == layer.pixel_size {
                return Ok(MaskSlot::Ready(entry.handle));
            }
            if interactive {
                log::debug!("Deferring mask resize of '{}' until the full update", layer.name);
                return Ok(MaskSlot::Deferred);
            }
        }

        let handle = backend.create_buffer(&BufferDesc::new(
            format!("mask {}", layer.name),
            BufferKind::Mask,
            layer.pixel_size.x,
            layer.pixel_size.y,
        ))?;
        if let Some(old) = self.masks.insert(layer.id, MaskEntry { handle, size: layer.pixel_size }) {
            backend.free_buffer(old.handle);
        }
        Ok(MaskSlot::Ready(handle))
    }

    pub fn get(&self, id: LayerId) -> Option<BufferHandle> {
        self.masks.get(&id).map(|e| e.handle)
    }

    /// Free masks of layers that left the scene.
    pub fn release_missing(&mut self, collection: &LayerCollection, backend: &mut dyn GpuBackend) {
        let missing: Vec<LayerId> = self
            .masks
            .keys()
            .filter(|id| !collection.contains(**id))
            .copied()
            .collect();
        for id in missing {
            if let Some(entry) = self.masks.remove(&id) {
                backend.free_buffer(entry.handle);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn free_all(&mut self, backend: &mut dyn GpuBackend) {
        for (_, entry) in self.masks.drain() {
            backend.free_buffer(entry.handle);
        }
    }
}
