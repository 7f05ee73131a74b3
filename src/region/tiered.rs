//! Per-region classification of overlapping layers.

use crate::layer::{Layer, LayerId, LayerTier};

/// Layers overlapping one region, bucketed by tier.
///
/// Derived data: rebuilt from scratch every cycle, never patched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TieredRegionLayers {
    pub height: Vec<LayerId>,
    pub texture: Vec<LayerId>,
    /// Feature layers in processing order (descending priority)
    pub feature: Vec<LayerId>,
    height_features: usize,
    instancers: usize,
}

impl TieredRegionLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an overlapping layer. Feature layers must be added in processing order.
    pub fn add(&mut self, layer: &Layer) {
        match layer.tier() {
            LayerTier::Height => self.height.push(layer.id),
            LayerTier::Texture => self.texture.push(layer.id),
            LayerTier::Feature => {
                self.feature.push(layer.id);
                if layer.is_height_feature() {
                    self.height_features += 1;
                }
                if layer.is_instancer() {
                    self.instancers += 1;
                }
            }
        }
    }

    /// Region has geometry to rasterize. Texture-only regions are skipped.
    pub fn should_process(&self) -> bool {
        !self.height.is_empty() || self.height_features > 0
    }

    pub fn has_instancer(&self) -> bool {
        self.instancers > 0
    }

    pub fn is_empty(&self) -> bool {
        self.height.is_empty() && self.texture.is_empty() && self.feature.is_empty()
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.height.contains(&id) || self.texture.contains(&id) || self.feature.contains(&id)
    }

    pub fn layer_count(&self) -> usize {
        self.height.len() + self.texture.len() + self.feature.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec2;
    use crate::layer::FeatureCaps;

    #[test]
    fn test_texture_only_is_not_processed() {
        let mut tiers = TieredRegionLayers::new();
        tiers.add(&Layer::texture("t", Vec2::ZERO, Vec2::ONE));
        assert!(!tiers.is_empty());
        assert!(!tiers.should_process());
    }

    #[test]
    fn test_height_feature_activates_region() {
        let mut tiers = TieredRegionLayers::new();
        tiers.add(&Layer::feature("trees", FeatureCaps::instancer(1, 1), Vec2::ZERO, Vec2::ONE));
        assert!(!tiers.should_process());
        assert!(tiers.has_instancer());

        tiers.add(&Layer::feature("road", FeatureCaps::path(1), Vec2::ZERO, Vec2::ONE));
        assert!(tiers.should_process());
        assert_eq!(tiers.layer_count(), 2);
    }

    #[test]
    fn test_height_layer_activates_region() {
        let mut tiers = TieredRegionLayers::new();
        let h = Layer::height("h", Vec2::ZERO, Vec2::ONE);
        tiers.add(&h);
        assert!(tiers.should_process());
        assert!(tiers.contains(h.id));
    }
}
