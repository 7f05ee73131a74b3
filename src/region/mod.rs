//! Terrain regions: grid math, layer membership and GPU resources.

pub mod coords;
pub mod dependency;
pub mod map;
pub mod tiered;

pub use coords::{
    pixel_overlap, region_range, region_world_bounds, regions_for_bounds, world_to_region,
    PixelOverlap, PixelRect, RegionCoord,
};
pub use dependency::RegionDependencyManager;
pub use map::{RegionData, RegionMap};
pub use tiered::TieredRegionLayers;
