//! Region grid coordinates and pixel-space overlap math.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::types::{UVec2, Vec2};
use crate::math::Bounds2;

/// Integer grid coordinate of a terrain region on the (x, z) plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionCoord {
    pub x: i32,
    pub z: i32,
}

impl RegionCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Whether the host terrain accepts this coordinate (`|x|, |z| < limit`).
    pub fn in_bounds(&self, limit: i32) -> bool {
        self.x.abs() < limit && self.z.abs() < limit
    }
}

impl fmt::Display for RegionCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Region containing a world position (floor division).
pub fn world_to_region(pos: Vec2, region_size: f32) -> RegionCoord {
    RegionCoord::new(
        (pos.x / region_size).floor() as i32,
        (pos.y / region_size).floor() as i32,
    )
}

/// World-space bounds covered by a region.
pub fn region_world_bounds(coord: RegionCoord, region_size: f32) -> Bounds2 {
    let min = Vec2::new(coord.x as f32, coord.z as f32) * region_size;
    Bounds2::new(min, min + Vec2::splat(region_size))
}

/// Inclusive range of region coordinates touched by `bounds` on both axes.
///
/// The min corner uses floor division. A max edge lying exactly on a region
/// boundary stays in the lower region, so a layer spanning exactly one region
/// maps to exactly that region.
pub fn region_range(bounds: &Bounds2, region_size: f32) -> (RegionCoord, RegionCoord) {
    let min = world_to_region(bounds.min, region_size);
    let max_x = ((bounds.max.x / region_size).ceil() as i32 - 1).max(min.x);
    let max_z = ((bounds.max.y / region_size).ceil() as i32 - 1).max(min.z);
    (min, RegionCoord::new(max_x, max_z))
}

/// Every region touched by `bounds`, row by row.
pub fn regions_for_bounds(bounds: &Bounds2, region_size: f32) -> impl Iterator<Item = RegionCoord> {
    let (min, max) = region_range(bounds, region_size);
    (min.z..=max.z).flat_map(move |z| (min.x..=max.x).map(move |x| RegionCoord::new(x, z)))
}

/// Half-open pixel rectangle `[min, max)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub min: UVec2,
    pub max: UVec2,
}

impl PixelRect {
    pub fn size(&self) -> UVec2 {
        self.max.saturating_sub(self.min)
    }

    pub fn is_empty(&self) -> bool {
        self.max.x <= self.min.x || self.max.y <= self.min.y
    }
}

/// Where a layer mask lands inside a region, in both pixel spaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelOverlap {
    /// Pixels of the region buffer covered by the layer
    pub region: PixelRect,
    /// Pixels of the layer mask that fall inside the region
    pub layer: PixelRect,
}

/// Compute the pixel overlap between a region and a layer mask.
///
/// Returns `None` when the two do not share any area or either pixel rectangle
/// collapses to nothing.
pub fn pixel_overlap(
    coord: RegionCoord,
    region_size: f32,
    region_resolution: u32,
    layer_bounds: &Bounds2,
    layer_pixels: UVec2,
) -> Option<PixelOverlap> {
    let region_bounds = region_world_bounds(coord, region_size);
    let shared = region_bounds.intersection(layer_bounds)?;

    let region_scale = region_resolution as f32 / region_size;
    let region = to_pixels(
        (shared.min - region_bounds.min) * region_scale,
        (shared.max - region_bounds.min) * region_scale,
        UVec2::splat(region_resolution),
    );

    let extent = layer_bounds.size();
    if extent.x <= 0.0 || extent.y <= 0.0 {
        return None;
    }
    let layer_scale = layer_pixels.as_vec2() / extent;
    let layer = to_pixels(
        (shared.min - layer_bounds.min) * layer_scale,
        (shared.max - layer_bounds.min) * layer_scale,
        layer_pixels,
    );

    if region.is_empty() || layer.is_empty() {
        return None;
    }
    Some(PixelOverlap { region, layer })
}

fn to_pixels(min: Vec2, max: Vec2, limit: UVec2) -> PixelRect {
    let min = min.floor().max(Vec2::ZERO).as_uvec2().min(limit);
    let max = max.ceil().max(Vec2::ZERO).as_uvec2().min(limit);
    PixelRect { min, max }
}
