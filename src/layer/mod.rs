//! Terrain layers: height, texture and feature influence sources.
//!
//! Layers are authored by the host scene. The pipeline only observes them
//! each cycle through a [`LayerSource`], reads their bounds and dirty flags,
//! and clears the dirty flags once their work has been submitted.

pub mod collection;
pub mod propagation;
pub mod snapshot;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::core::types::{UVec2, Vec2};
use crate::math::Bounds2;

pub use collection::{CollectionDiff, LayerCollection, LayerSource, Scene};
pub use propagation::{affected_regions, affects, layers_overlap, propagate_dirty_state, propagate_position_changes};
pub use snapshot::LayerSnapshot;

/// Stable identifier issued when a layer is created.
///
/// Hosts persist it with the layer so identity survives scene reloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(pub u64);

impl LayerId {
    /// Allocate a process-unique id.
    pub fn new_unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Processing tier. Dependencies only flow Height -> Texture -> Feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerTier {
    Height,
    Texture,
    Feature,
}

/// Capabilities of a feature layer (paths, instancers, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureCaps {
    /// Writes height deltas into regions
    pub modifies_height: bool,
    /// Writes texture/control deltas into regions
    pub modifies_texture: bool,
    /// Places mesh instances instead of writing region buffers
    pub is_instancer: bool,
    /// Higher priority features are processed first
    pub priority: i32,
    /// Mesh placed by an instancer
    pub mesh_id: u32,
    /// Capacity of the per-region instance buffer
    pub max_instances: u32,
}

impl FeatureCaps {
    /// Road/path style feature: carves height and paints texture.
    pub fn path(priority: i32) -> Self {
        Self {
            modifies_height: true,
            modifies_texture: true,
            is_instancer: false,
            priority,
            mesh_id: 0,
            max_instances: 0,
        }
    }

    /// Mesh scattering feature.
    pub fn instancer(priority: i32, mesh_id: u32) -> Self {
        Self {
            modifies_height: false,
            modifies_texture: false,
            is_instancer: true,
            priority,
            mesh_id,
            max_instances: 4096,
        }
    }

    pub fn with_height(mut self, modifies: bool) -> Self {
        self.modifies_height = modifies;
        self
    }

    pub fn with_texture(mut self, modifies: bool) -> Self {
        self.modifies_texture = modifies;
        self
    }
}

/// Layer variant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LayerKind {
    Height,
    Texture,
    Feature(FeatureCaps),
}

/// One pluggable mask-generation step. The kernel itself lives outside the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaskStep {
    pub name: String,
    /// Samples composited region height (slope, altitude, ...)
    pub requires_height: bool,
}

impl MaskStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires_height: false,
        }
    }

    pub fn height_based(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires_height: true,
        }
    }
}

/// Edge attenuation of a layer's influence.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Falloff {
    /// Fraction of the half-size over which influence fades (0..1)
    pub radius: f32,
    pub strength: f32,
}

impl Default for Falloff {
    fn default() -> Self {
        Self {
            radius: 0.25,
            strength: 1.0,
        }
    }
}

/// Spatial shape of a layer.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerGeometry {
    /// Center + size rectangle
    Rect { center: Vec2, size: Vec2 },
    /// Polyline with a constant width (curve extent drives the bounds)
    Path { points: Vec<Vec2>, width: f32 },
}

impl LayerGeometry {
    pub fn bounds(&self) -> Bounds2 {
        match self {
            LayerGeometry::Rect { center, size } => Bounds2::from_center_size(*center, *size),
            LayerGeometry::Path { points, width } => Bounds2::from_points(points)
                .map(|b| b.inflated(width.max(0.0) * 0.5))
                .unwrap_or_default(),
        }
    }

    pub fn translate(&mut self, offset: Vec2) {
        match self {
            LayerGeometry::Rect { center, .. } => *center += offset,
            LayerGeometry::Path { points, .. } => {
                for p in points.iter_mut() {
                    *p += offset;
                }
            }
        }
    }
}

/// A user-authored terrain layer.
#[derive(Clone, Debug)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub kind: LayerKind,
    pub geometry: LayerGeometry,
    /// Mask dimensions in pixels
    pub pixel_size: UVec2,
    pub masks: Vec<MaskStep>,
    pub falloff: Falloff,
    /// Mask content is stale
    pub is_dirty: bool,
    /// Bounds moved since the last check
    pub position_dirty: bool,
    /// Pixel dimensions changed
    pub size_changed: bool,
}

impl Layer {
    pub fn new(name: impl Into<String>, kind: LayerKind, geometry: LayerGeometry) -> Self {
        Self {
            id: LayerId::new_unique(),
            name: name.into(),
            kind,
            geometry,
            pixel_size: UVec2::splat(256),
            masks: Vec::new(),
            falloff: Falloff::default(),
            is_dirty: true,
            position_dirty: false,
            size_changed: false,
        }
    }

    pub fn height(name: impl Into<String>, center: Vec2, size: Vec2) -> Self {
        Self::new(name, LayerKind::Height, LayerGeometry::Rect { center, size })
    }

    pub fn texture(name: impl Into<String>, center: Vec2, size: Vec2) -> Self {
        Self::new(name, LayerKind::Texture, LayerGeometry::Rect { center, size })
    }

    pub fn feature(name: impl Into<String>, caps: FeatureCaps, center: Vec2, size: Vec2) -> Self {
        Self::new(name, LayerKind::Feature(caps), LayerGeometry::Rect { center, size })
    }

    pub fn path(name: impl Into<String>, caps: FeatureCaps, points: Vec<Vec2>, width: f32) -> Self {
        Self::new(name, LayerKind::Feature(caps), LayerGeometry::Path { points, width })
    }

    pub fn with_id(mut self, id: LayerId) -> Self {
        self.id = id;
        self
    }

    pub fn with_mask(mut self, mask: MaskStep) -> Self {
        self.masks.push(mask);
        self
    }

    pub fn with_pixel_size(mut self, pixel_size: UVec2) -> Self {
        self.pixel_size = pixel_size;
        self
    }

    pub fn with_falloff(mut self, falloff: Falloff) -> Self {
        self.falloff = falloff;
        self
    }

    /// World-space bounds computed from the layer's geometry.
    pub fn bounds(&self) -> Bounds2 {
        self.geometry.bounds()
    }

    pub fn tier(&self) -> LayerTier {
        match self.kind {
            LayerKind::Height => LayerTier::Height,
            LayerKind::Texture => LayerTier::Texture,
            LayerKind::Feature(_) => LayerTier::Feature,
        }
    }

    pub fn feature_caps(&self) -> Option<&FeatureCaps> {
        match &self.kind {
            LayerKind::Feature(caps) => Some(caps),
            _ => None,
        }
    }

    /// Feature layer that writes height.
    pub fn is_height_feature(&self) -> bool {
        self.feature_caps().is_some_and(|c| c.modifies_height)
    }

    pub fn is_instancer(&self) -> bool {
        self.feature_caps().is_some_and(|c| c.is_instancer)
    }

    /// Processing priority; zero for non-feature layers.
    pub fn priority(&self) -> i32 {
        self.feature_caps().map_or(0, |c| c.priority)
    }

    /// Any mask step samples composited height.
    pub fn requires_height(&self) -> bool {
        self.masks.iter().any(|m| m.requires_height)
    }

    /// Move the layer and flag the move.
    pub fn translate(&mut self, offset: Vec2) {
        self.geometry.translate(offset);
        self.position_dirty = true;
    }

    /// Change the mask resolution.
    pub fn resize(&mut self, pixel_size: UVec2) {
        if self.pixel_size != pixel_size {
            self.pixel_size = pixel_size;
            self.size_changed = true;
            self.is_dirty = true;
        }
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    /// Any flag asking for reprocessing.
    pub fn needs_update(&self) -> bool {
        self.is_dirty || self.position_dirty || self.size_changed
    }

    pub fn clear_dirty_flags(&mut self) {
        self.is_dirty = false;
        self.position_dirty = false;
        self.size_changed = false;
    }
}
