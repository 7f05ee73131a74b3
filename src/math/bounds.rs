//! World-space XZ bounding rectangle

use crate::core::types::Vec2;

/// Tolerance used when deciding whether a layer's bounds moved.
pub const BOUNDS_EPSILON: f32 = 1e-4;

/// Axis-aligned rectangle on the terrain plane (x, z) defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds2 {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds2 {
    /// Create bounds from min and max corners
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Create bounds from center and full size
    pub fn from_center_size(center: Vec2, size: Vec2) -> Self {
        let half = size.abs() * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Smallest bounds containing every point, `None` for an empty slice
    pub fn from_points(points: &[Vec2]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bounds = Self::new(*first, *first);
        for p in rest {
            bounds.expand(*p);
        }
        Some(bounds)
    }

    /// Get center point
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Get size (max - min)
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// Check if point is inside bounds (inclusive)
    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x &&
        p.y >= self.min.y && p.y <= self.max.y
    }

    /// Check if two bounds intersect. Touching edges count as intersecting.
    pub fn intersects(&self, other: &Bounds2) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y
    }

    /// Overlapping area of two bounds, `None` when the overlap has no area
    pub fn intersection(&self, other: &Bounds2) -> Option<Bounds2> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        if min.x < max.x && min.y < max.y {
            Some(Bounds2 { min, max })
        } else {
            None
        }
    }

    /// Expand bounds to include point
    pub fn expand(&mut self, point: Vec2) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Grow bounds by `amount` on every side
    pub fn inflated(&self, amount: f32) -> Bounds2 {
        Bounds2::new(self.min - Vec2::splat(amount), self.max + Vec2::splat(amount))
    }

    /// Return merged bounds containing both
    pub fn union(&self, other: &Bounds2) -> Bounds2 {
        Bounds2 {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Bounds moved by `offset`
    pub fn translated(&self, offset: Vec2) -> Bounds2 {
        Bounds2 {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Equality within [`BOUNDS_EPSILON`]
    pub fn approx_eq(&self, other: &Bounds2) -> bool {
        self.min.abs_diff_eq(other.min, BOUNDS_EPSILON)
            && self.max.abs_diff_eq(other.max, BOUNDS_EPSILON)
    }
}
