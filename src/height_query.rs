//! World-space terrain height lookups against composited regions.

use std::collections::HashMap;

use crate::config::TerrainConfig;
use crate::core::types::Vec2;
use crate::gpu::GpuBackend;
use crate::region::{region_world_bounds, world_to_region, RegionCoord, RegionMap};

/// Samples region heightmaps after a synchronous readback.
#[derive(Clone, Copy, Debug)]
pub struct HeightQuery {
    region_size: f32,
    world_scale: f32,
}

impl HeightQuery {
    pub fn new(config: &TerrainConfig) -> Self {
        Self {
            region_size: config.region_size,
            world_scale: config.world_scale,
        }
    }

    /// Height at `world` (x, z), or `None` when the region has no data or the
    /// sample falls on its outer edge.
    pub fn height_at(&self, world: Vec2, regions: &RegionMap, backend: &dyn GpuBackend) -> Option<f32> {
        let coord = world_to_region(world, self.region_size);
        let heights = self.read_region(coord, regions, backend)?;
        self.sample(coord, world, &heights, regions.resolution())
    }

    /// Heights for many points, reading each region once.
    pub fn heights_at(&self, points: &[Vec2], regions: &RegionMap, backend: &dyn GpuBackend) -> Vec<Option<f32>> {
        let mut cache: HashMap<RegionCoord, Option<Vec<f32>>> = HashMap::new();
        points
            .iter()
            .map(|&world| {
                let coord = world_to_region(world, self.region_size);
                let heights = cache
                    .entry(coord)
                    .or_insert_with(|| self.read_region(coord, regions, backend));
                heights
                    .as_deref()
                    .and_then(|h| self.sample(coord, world, h, regions.resolution()))
            })
            .collect()
    }

    fn read_region(&self, coord: RegionCoord, regions: &RegionMap, backend: &dyn GpuBackend) -> Option<Vec<f32>> {
        let region = regions.get(coord)?;
        match backend.read_heights(region.height) {
            Ok(heights) => Some(heights),
            Err(e) => {
                log::warn!("Height readback of region {} failed: {}", coord, e);
                None
            }
        }
    }

    fn sample(&self, coord: RegionCoord, world: Vec2, heights: &[f32], resolution: u32) -> Option<f32> {
        let origin = region_world_bounds(coord, self.region_size).min;
        let local = (world - origin) / self.region_size;
        let pixel = local * resolution as f32;

        let x0 = pixel.x.floor() as u32;
        let z0 = pixel.y.floor() as u32;
        // Last row and column have no neighbor to interpolate toward
        if x0 + 1 >= resolution || z0 + 1 >= resolution {
            return None;
        }
        let tx = pixel.x - x0 as f32;
        let tz = pixel.y - z0 as f32;

        let at = |x: u32, z: u32| heights.get((z * resolution + x) as usize).copied();
        let h00 = at(x0, z0)?;
        let h10 = at(x0 + 1, z0)?;
        let h01 = at(x0, z0 + 1)?;
        let h11 = at(x0 + 1, z0 + 1)?;

        let top = h00 + (h10 - h00) * tx;
        let bottom = h01 + (h11 - h01) * tx;
        Some((top + (bottom - top) * tz) * self.world_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::MemoryBackend;

    fn setup(world_scale: f32) -> (HeightQuery, RegionMap, MemoryBackend) {
        let config = TerrainConfig {
            region_size: 40.0,
            region_resolution: 4,
            world_scale,
            ..Default::default()
        };
        let mut backend = MemoryBackend::new();
        let mut regions = RegionMap::new(config.region_resolution);
        let height = regions
            .get_or_create(RegionCoord::new(0, 0), &mut backend)
            .unwrap()
            .height;
        // Height equals the pixel column index
        let data: Vec<f32> = (0..16).map(|i| (i % 4) as f32).collect();
        backend.write_heights(height, &data).unwrap();
        (HeightQuery::new(&config), regions, backend)
    }

    #[test]
    fn test_bilinear_sample() {
        let (query, regions, backend) = setup(1.0);
        // 10 world units per pixel; x = 15 is halfway between columns 1 and 2
        let h = query.height_at(Vec2::new(15.0, 5.0), &regions, &backend).unwrap();
        assert!((h - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_world_scale_applied() {
        let (query, regions, backend) = setup(2.0);
        let h = query.height_at(Vec2::new(10.0, 10.0), &regions, &backend).unwrap();
        assert!((h - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_edge_and_missing_region() {
        let (query, regions, backend) = setup(1.0);
        assert!(query.height_at(Vec2::new(35.0, 5.0), &regions, &backend).is_none());
        assert!(query.height_at(Vec2::new(45.0, 5.0), &regions, &backend).is_none());
    }

    #[test]
    fn test_batch_matches_single() {
        let (query, regions, backend) = setup(1.0);
        let points = [Vec2::new(5.0, 5.0), Vec2::new(39.5, 1.0), Vec2::new(-3.0, 1.0)];
        let batch = query.heights_at(&points, &regions, &backend);
        let single: Vec<Option<f32>> = points
            .iter()
            .map(|p| query.height_at(*p, &regions, &backend))
            .collect();
        assert_eq!(batch, single);
        assert!(batch[0].is_some());
    }
}
