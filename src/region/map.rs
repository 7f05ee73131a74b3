//! Per-region GPU resources.
//!
//! The map exclusively owns every region buffer. Buffers are created on first
//! use and freed when the region is removed; removal only happens once no task
//! touching the region is in flight (the manager defers it past the push step).

use std::collections::{HashMap, HashSet};

use super::RegionCoord;
use crate::core::types::Result;
use crate::gpu::{BufferDesc, BufferHandle, BufferKind, GpuBackend};
use crate::layer::LayerId;

/// GPU-resident data of one active region.
#[derive(Debug)]
pub struct RegionData {
    pub coord: RegionCoord,
    pub height: BufferHandle,
    pub control: BufferHandle,
    pub color: BufferHandle,
    /// Created when an instancer first touches the region
    pub exclusion: Option<BufferHandle>,
    /// Placement output per instancer layer
    pub instances: HashMap<LayerId, BufferHandle>,
}

impl RegionData {
    fn allocate(coord: RegionCoord, resolution: u32, backend: &mut dyn GpuBackend) -> Result<Self> {
        let mut created = Vec::with_capacity(3);
        for kind in [BufferKind::Height, BufferKind::Control, BufferKind::Color] {
            let desc = BufferDesc::new(
                format!("region {coord} {kind:?}"),
                kind,
                resolution,
                resolution,
            );
            match backend.create_buffer(&desc) {
                Ok(handle) => created.push(handle),
                Err(e) => {
                    for handle in created {
                        backend.free_buffer(handle);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            coord,
            height: created[0],
            control: created[1],
            color: created[2],
            exclusion: None,
            instances: HashMap::new(),
        })
    }

    /// Every buffer owned by the region.
    pub fn buffers(&self) -> Vec<BufferHandle> {
        let mut buffers = vec![self.height, self.control, self.color];
        buffers.extend(self.exclusion);
        buffers.extend(self.instances.values().copied());
        buffers
    }

    fn free(self, backend: &mut dyn GpuBackend) {
        for handle in self.buffers() {
            backend.free_buffer(handle);
        }
    }
}

/// Owns [`RegionData`] for every active region.
#[derive(Debug)]
pub struct RegionMap {
    resolution: u32,
    regions: HashMap<RegionCoord, RegionData>,
    /// Cosmetic region outlines, kept in lockstep with `regions`
    previews: HashSet<RegionCoord>,
}

impl RegionMap {
    pub fn new(resolution: u32) -> Self {
        Self {
            resolution,
            regions: HashMap::new(),
            previews: HashSet::new(),
        }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Fetch the region, allocating its buffers on first call only.
    pub fn get_or_create(
        &mut self,
        coord: RegionCoord,
        backend: &mut dyn GpuBackend,
    ) -> Result<&mut RegionData> {
        if !self.regions.contains_key(&coord) {
            let data = RegionData::allocate(coord, self.resolution, backend)?;
            log::debug!("Created region {}", coord);
            self.regions.insert(coord, data);
            self.previews.insert(coord);
        }
        self.regions
            .get_mut(&coord)
            .ok_or_else(|| crate::core::Error::region(coord, "region vanished after creation"))
    }

    pub fn get(&self, coord: RegionCoord) -> Option<&RegionData> {
        self.regions.get(&coord)
    }

    pub fn contains(&self, coord: RegionCoord) -> bool {
        self.regions.contains_key(&coord)
    }

    /// Exclusion map of a region, created lazily.
    pub fn ensure_exclusion(
        &mut self,
        coord: RegionCoord,
        backend: &mut dyn GpuBackend,
    ) -> Result<BufferHandle> {
        let resolution = self.resolution;
        let region = self.get_or_create(coord, backend)?;
        if let Some(handle) = region.exclusion {
            return Ok(handle);
        }
        let handle = backend.create_buffer(&BufferDesc::new(
            format!("region {coord} exclusion"),
            BufferKind::Exclusion,
            resolution,
            resolution,
        ))?;
        region.exclusion = Some(handle);
        Ok(handle)
    }

    /// Store a fresh instance buffer for `(layer, region)`, freeing the one it replaces.
    pub fn set_instance_buffer(
        &mut self,
        coord: RegionCoord,
        layer: LayerId,
        handle: BufferHandle,
        backend: &mut dyn GpuBackend,
    ) -> Result<()> {
        let region = self.get_or_create(coord, backend)?;
        if let Some(old) = region.instances.insert(layer, handle) {
            if old != handle {
                backend.free_buffer(old);
            }
        }
        Ok(())
    }

    pub fn instance_buffer(&self, coord: RegionCoord, layer: LayerId) -> Option<BufferHandle> {
        self.regions.get(&coord)?.instances.get(&layer).copied()
    }

    /// Free the instance buffer of `(layer, region)` if present.
    pub fn remove_instance_buffer(
        &mut self,
        coord: RegionCoord,
        layer: LayerId,
        backend: &mut dyn GpuBackend,
    ) -> bool {
        match self.regions.get_mut(&coord).and_then(|r| r.instances.remove(&layer)) {
            Some(handle) => {
                backend.free_buffer(handle);
                true
            }
            None => false,
        }
    }

    /// Free instance buffers of layers rejected by `keep`. Returns how many went.
    pub fn prune_instance_buffers(
        &mut self,
        keep: impl Fn(LayerId) -> bool,
        backend: &mut dyn GpuBackend,
    ) -> usize {
        let mut pruned = 0;
        for region in self.regions.values_mut() {
            region.instances.retain(|layer, handle| {
                if keep(*layer) {
                    return true;
                }
                backend.free_buffer(*handle);
                pruned += 1;
                false
            });
        }
        pruned
    }

    /// Free every buffer of a region. Returns false if the region was unknown.
    pub fn remove_region(&mut self, coord: RegionCoord, backend: &mut dyn GpuBackend) -> bool {
        self.previews.remove(&coord);
        match self.regions.remove(&coord) {
            Some(data) => {
                log::debug!("Removed region {}", coord);
                data.free(backend);
                true
            }
            None => false,
        }
    }

    /// Sorted coordinates of all managed regions.
    pub fn coords(&self) -> Vec<RegionCoord> {
        let mut coords: Vec<RegionCoord> = self.regions.keys().copied().collect();
        coords.sort();
        coords
    }

    pub fn previews(&self) -> &HashSet<RegionCoord> {
        &self.previews
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Release every region.
    pub fn free_all(&mut self, backend: &mut dyn GpuBackend) {
        for (_, data) in self.regions.drain() {
            data.free(backend);
        }
        self.previews.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::MemoryBackend;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut backend = MemoryBackend::new();
        let mut map = RegionMap::new(8);
        let coord = RegionCoord::new(0, 0);

        let first = map.get_or_create(coord, &mut backend).unwrap().height;
        let second = map.get_or_create(coord, &mut backend).unwrap().height;
        assert_eq!(first, second);
        assert_eq!(backend.live_buffer_count(), 3);
        assert!(map.previews().contains(&coord));
    }

    #[test]
    fn test_failed_allocation_leaks_nothing() {
        let mut backend = MemoryBackend::new();
        let mut map = RegionMap::new(8);
        let coord = RegionCoord::new(1, 1);

        backend.fail_next_allocations(1);
        assert!(map.get_or_create(coord, &mut backend).is_err());
        assert_eq!(backend.live_buffer_count(), 0);
        assert!(!map.contains(coord));

        // Retried next cycle
        assert!(map.get_or_create(coord, &mut backend).is_ok());
        assert_eq!(backend.live_buffer_count(), 3);
    }

    #[test]
    fn test_remove_region_frees_everything() {
        let mut backend = MemoryBackend::new();
        let mut map = RegionMap::new(8);
        let coord = RegionCoord::new(2, -1);
        let layer = LayerId(42);

        map.ensure_exclusion(coord, &mut backend).unwrap();
        let inst = backend
            .create_buffer(&BufferDesc::new("inst", BufferKind::Instances, 4, 1))
            .unwrap();
        map.set_instance_buffer(coord, layer, inst, &mut backend).unwrap();
        assert_eq!(backend.live_buffer_count(), 5);

        assert!(map.remove_region(coord, &mut backend));
        assert_eq!(backend.live_buffer_count(), 0);
        assert!(!map.remove_region(coord, &mut backend));
        assert!(map.previews().is_empty());
    }

    #[test]
    fn test_replacing_instance_buffer_frees_old() {
        let mut backend = MemoryBackend::new();
        let mut map = RegionMap::new(4);
        let coord = RegionCoord::new(0, 0);
        let layer = LayerId(1);
        let desc = BufferDesc::new("inst", BufferKind::Instances, 4, 1);

        let a = backend.create_buffer(&desc).unwrap();
        map.set_instance_buffer(coord, layer, a, &mut backend).unwrap();
        let b = backend.create_buffer(&desc).unwrap();
        map.set_instance_buffer(coord, layer, b, &mut backend).unwrap();

        assert!(!backend.contains(a));
        assert_eq!(map.instance_buffer(coord, layer), Some(b));
        assert!(map.remove_instance_buffer(coord, layer, &mut backend));
        assert!(!backend.contains(b));
    }

    #[test]
    fn test_prune_instance_buffers() {
        let mut backend = MemoryBackend::new();
        let mut map = RegionMap::new(4);
        let coord = RegionCoord::new(0, 0);
        let desc = BufferDesc::new("inst", BufferKind::Instances, 4, 1);
        for id in [1, 2] {
            let handle = backend.create_buffer(&desc).unwrap();
            map.set_instance_buffer(coord, LayerId(id), handle, &mut backend).unwrap();
        }

        assert_eq!(map.prune_instance_buffers(|id| id == LayerId(1), &mut backend), 1);
        assert!(map.instance_buffer(coord, LayerId(1)).is_some());
        assert!(map.instance_buffer(coord, LayerId(2)).is_none());
        assert_eq!(backend.live_buffer_count(), 4);
    }

    #[test]
    fn test_free_all_after_churn_leaves_no_buffers() {
        let mut backend = MemoryBackend::new();
        let mut map = RegionMap::new(4);
        for i in 0..20 {
            let coord = RegionCoord::new(i % 5, i / 5);
            map.get_or_create(coord, &mut backend).unwrap();
            if i % 3 == 0 {
                map.ensure_exclusion(coord, &mut backend).unwrap();
            }
            if i % 4 == 0 {
                map.remove_region(RegionCoord::new((i + 1) % 5, i / 5), &mut backend);
            }
        }
        map.free_all(&mut backend);
        assert_eq!(backend.live_buffer_count(), 0);
        assert!(map.is_empty());
    }
}
