//! Frozen bake parameters handed to asynchronous GPU work.

use std::sync::Arc;

use super::{Falloff, FeatureCaps, Layer, LayerGeometry, LayerId, LayerTier, MaskStep};
use crate::core::types::{UVec2, Vec2};
use crate::math::Bounds2;

/// Immutable capture of everything a layer's kernels read.
///
/// Taken on the main thread right before task construction. Commands hold an
/// `Arc` to it, so later edits to the live layer never reach in-flight work.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerSnapshot {
    pub id: LayerId,
    pub name: String,
    pub tier: LayerTier,
    pub caps: Option<FeatureCaps>,
    pub bounds: Bounds2,
    pub pixel_size: UVec2,
    pub falloff: Falloff,
    pub masks: Vec<MaskStep>,
    /// Curve points for path layers
    pub path: Option<Arc<[Vec2]>>,
    pub path_width: f32,
}

impl Layer {
    /// Capture a fresh snapshot of the layer's current parameters.
    pub fn snapshot(&self) -> Arc<LayerSnapshot> {
        let (path, path_width): (Option<Arc<[Vec2]>>, f32) = match &self.geometry {
            LayerGeometry::Path { points, width } => (Some(Arc::from(points.as_slice())), *width),
            LayerGeometry::Rect { .. } => (None, 0.0),
        };
        Arc::new(LayerSnapshot {
            id: self.id,
            name: self.name.clone(),
            tier: self.tier(),
            caps: self.feature_caps().copied(),
            bounds: self.bounds(),
            pixel_size: self.pixel_size,
            falloff: self.falloff,
            masks: self.masks.clone(),
            path,
            path_width,
        })
    }
}
