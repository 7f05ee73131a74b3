//! Per-cycle snapshot of the scene's active layers.

use std::collections::{HashMap, HashSet};

use super::{Layer, LayerId, LayerTier};

/// Host scene access. Layers are enumerated once per cycle; the pipeline only
/// writes back cleared dirty flags.
pub trait LayerSource {
    fn layers(&self) -> &[Layer];
    fn layers_mut(&mut self) -> &mut [Layer];
}

/// Minimal in-memory scene, used by hosts without their own graph and by tests.
#[derive(Debug, Default)]
pub struct Scene {
    layers: Vec<Layer>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer and return its id.
    pub fn add(&mut self, layer: Layer) -> LayerId {
        let id = layer.id;
        self.layers.push(layer);
        id
    }

    pub fn remove(&mut self, id: LayerId) -> Option<Layer> {
        let pos = self.layers.iter().position(|l| l.id == id)?;
        Some(self.layers.remove(pos))
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn get_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl LayerSource for Scene {
    fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }
}

/// Layers that appeared or disappeared since the previous refresh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollectionDiff {
    pub added: Vec<LayerId>,
    pub removed: Vec<LayerId>,
}

impl CollectionDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Snapshot of all active layers, refreshed once per cycle.
#[derive(Debug, Default)]
pub struct LayerCollection {
    layers: Vec<Layer>,
    index: HashMap<LayerId, usize>,
}

impl LayerCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot with the current scene layers.
    pub fn refresh(&mut self, layers: &[Layer]) -> CollectionDiff {
        let previous: HashSet<LayerId> = self.index.keys().copied().collect();

        self.layers = layers.to_vec();
        self.index = self
            .layers
            .iter()
            .enumerate()
            .map(|(i, l)| (l.id, i))
            .collect();

        if self.index.len() != self.layers.len() {
            log::warn!("Duplicate layer ids in scene; later entries shadow earlier ones");
        }

        let mut diff = CollectionDiff::default();
        for layer in &self.layers {
            if !previous.contains(&layer.id) {
                diff.added.push(layer.id);
            }
        }
        diff.removed = previous
            .into_iter()
            .filter(|id| !self.index.contains_key(id))
            .collect();
        diff.removed.sort();
        diff
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.index.get(&id).map(|&i| &self.layers[i])
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn height_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|l| l.tier() == LayerTier::Height)
    }

    pub fn texture_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|l| l.tier() == LayerTier::Texture)
    }

    /// Feature layers sorted by descending priority (stable for ties).
    pub fn feature_layers(&self) -> Vec<&Layer> {
        let mut features: Vec<&Layer> = self
            .layers
            .iter()
            .filter(|l| l.tier() == LayerTier::Feature)
            .collect();
        features.sort_by(|a, b| b.priority().cmp(&a.priority()));
        features
    }

    pub fn instancer_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|l| l.is_instancer())
    }

    /// Heights, then textures, then features by descending priority.
    pub fn processing_order(&self) -> Vec<&Layer> {
        let mut order: Vec<&Layer> = self.height_layers().collect();
        order.extend(self.texture_layers());
        order.extend(self.feature_layers());
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec2;
    use crate::layer::FeatureCaps;

    fn unit(name: &str, caps: FeatureCaps) -> Layer {
        Layer::feature(name, caps, Vec2::ZERO, Vec2::ONE)
    }

    #[test]
    fn test_refresh_reports_additions_and_removals() {
        let mut scene = Scene::new();
        let a = scene.add(Layer::height("a", Vec2::ZERO, Vec2::ONE));
        let b = scene.add(Layer::texture("b", Vec2::ZERO, Vec2::ONE));

        let mut collection = LayerCollection::new();
        let diff = collection.refresh(scene.layers());
        assert_eq!(diff.added, vec![a, b]);
        assert!(diff.removed.is_empty());

        let diff = collection.refresh(scene.layers());
        assert!(diff.is_empty());

        scene.remove(a);
        let diff = collection.refresh(scene.layers());
        assert_eq!(diff.removed, vec![a]);
        assert!(!collection.contains(a));
        assert!(collection.get(b).is_some());
    }

    #[test]
    fn test_processing_order() {
        let mut scene = Scene::new();
        let low = scene.add(unit("low", FeatureCaps::path(1)));
        let tex = scene.add(Layer::texture("tex", Vec2::ZERO, Vec2::ONE));
        let high = scene.add(unit("high", FeatureCaps::path(9)));
        let height = scene.add(Layer::height("height", Vec2::ZERO, Vec2::ONE));

        let mut collection = LayerCollection::new();
        collection.refresh(scene.layers());
        let order: Vec<LayerId> = collection.processing_order().iter().map(|l| l.id).collect();
        assert_eq!(order, vec![height, tex, high, low]);
    }

    #[test]
    fn test_equal_priority_keeps_scene_order() {
        let mut scene = Scene::new();
        let first = scene.add(unit("first", FeatureCaps::path(2)));
        let second = scene.add(unit("second", FeatureCaps::path(2)));

        let mut collection = LayerCollection::new();
        collection.refresh(scene.layers());
        let ids: Vec<LayerId> = collection.feature_layers().iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![first, second]);
    }
}
