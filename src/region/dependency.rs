//! Region <-> layer dependency tracking.
//!
//! Each cycle the manager compares every layer's bounds against the bounds
//! recorded on the previous cycle, collects the regions whose layer membership
//! changed ("boundary-dirty"), and rebuilds the region -> tiered layers map.

use std::collections::{HashMap, HashSet};

use super::{regions_for_bounds, RegionCoord, TieredRegionLayers};
use crate::layer::{Layer, LayerId, LayerTier};
use crate::math::Bounds2;

/// Tracks which layers touch which regions.
#[derive(Debug)]
pub struct RegionDependencyManager {
    region_size: f32,
    /// Host terrain accepts coordinates with |x|, |z| below this
    region_limit: i32,
    /// Bounds recorded on the previous update
    layer_bounds: HashMap<LayerId, Bounds2>,
    regions: HashMap<RegionCoord, TieredRegionLayers>,
    /// Regions recomposited this cycle, drained by the push step
    updated: HashSet<RegionCoord>,
}

impl RegionDependencyManager {
    pub fn new(region_size: f32, region_limit: i32) -> Self {
        Self {
            region_size,
            region_limit,
            layer_bounds: HashMap::new(),
            regions: HashMap::new(),
            updated: HashSet::new(),
        }
    }

    pub fn region_size(&self) -> f32 {
        self.region_size
    }

    /// Diff layer bounds against the previous cycle and rebuild the tier map.
    ///
    /// Moved layers get `position_dirty` set. Returns every region whose
    /// membership changed, including regions that lost their last layer.
    pub fn update(&mut self, layers: &mut [Layer]) -> HashSet<RegionCoord> {
        let size = self.region_size;
        let mut dirty = HashSet::new();
        let mut seen = HashSet::with_capacity(layers.len());

        for layer in layers.iter_mut() {
            let bounds = layer.bounds();
            seen.insert(layer.id);

            match self.layer_bounds.get(&layer.id) {
                None => {
                    log::debug!("New layer '{}' ({})", layer.name, layer.id);
                    dirty.extend(regions_for_bounds(&bounds, size));
                }
                Some(old) if !old.approx_eq(&bounds) => {
                    log::debug!("Layer '{}' moved", layer.name);
                    dirty.extend(regions_for_bounds(old, size));
                    dirty.extend(regions_for_bounds(&bounds, size));
                    layer.position_dirty = true;
                }
                Some(_) if layer.position_dirty => {
                    dirty.extend(regions_for_bounds(&bounds, size));
                }
                Some(_) => {}
            }
            self.layer_bounds.insert(layer.id, bounds);
        }

        let deleted: Vec<LayerId> = self
            .layer_bounds
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();
        for id in deleted {
            if let Some(old) = self.layer_bounds.remove(&id) {
                log::debug!("Layer {} deleted", id);
                dirty.extend(regions_for_bounds(&old, size));
            }
        }

        let previous: Vec<RegionCoord> = self.regions.keys().copied().collect();
        self.rebuild(layers);
        for coord in previous {
            if !self.regions.contains_key(&coord) {
                dirty.insert(coord);
            }
        }

        dirty
    }

    /// Clear and rebuild the region -> tier map from current layer bounds.
    fn rebuild(&mut self, layers: &[Layer]) {
        self.regions.clear();

        let mut ordered: Vec<&Layer> = layers.iter().collect();
        // Stable sort keeps scene order within a tier
        ordered.sort_by(|a, b| {
            a.tier().cmp(&b.tier()).then_with(|| {
                if a.tier() == LayerTier::Feature {
                    b.priority().cmp(&a.priority())
                } else {
                    std::cmp::Ordering::Equal
                }
            })
        });

        for layer in ordered {
            for coord in regions_for_bounds(&layer.bounds(), self.region_size) {
                self.regions.entry(coord).or_default().add(layer);
            }
        }
    }

    pub fn tiered_layers(&self, coord: RegionCoord) -> Option<&TieredRegionLayers> {
        self.regions.get(&coord)
    }

    /// Regions inside the terrain limit that have geometry to process.
    pub fn active_region_coords(&self) -> HashSet<RegionCoord> {
        self.regions
            .iter()
            .filter(|(coord, tiers)| coord.in_bounds(self.region_limit) && tiers.should_process())
            .map(|(coord, _)| *coord)
            .collect()
    }

    pub fn is_active(&self, coord: RegionCoord) -> bool {
        coord.in_bounds(self.region_limit)
            && self.regions.get(&coord).is_some_and(|t| t.should_process())
    }

    /// Currently managed regions that are no longer active.
    pub fn regions_to_remove(
        &self,
        managed: impl IntoIterator<Item = RegionCoord>,
    ) -> Vec<RegionCoord> {
        let mut remove: Vec<RegionCoord> = managed
            .into_iter()
            .filter(|coord| !self.is_active(*coord))
            .collect();
        remove.sort();
        remove
    }

    /// Regions an active layer currently occupies.
    pub fn regions_for_layer(&self, id: LayerId) -> HashSet<RegionCoord> {
        self.regions
            .iter()
            .filter(|(coord, tiers)| coord.in_bounds(self.region_limit) && tiers.contains(id))
            .map(|(coord, _)| *coord)
            .collect()
    }

    pub fn mark_region_updated(&mut self, coord: RegionCoord) {
        self.updated.insert(coord);
    }

    /// Drain the regions recomposited since the last call, sorted.
    pub fn take_updated_regions(&mut self) -> Vec<RegionCoord> {
        let mut regions: Vec<RegionCoord> = self.updated.drain().collect();
        regions.sort();
        regions
    }

    pub fn layer_bounds(&self, id: LayerId) -> Option<Bounds2> {
        self.layer_bounds.get(&id).copied()
    }

    pub fn tracked_layer_count(&self) -> usize {
        self.layer_bounds.len()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn clear(&mut self) {
        self.layer_bounds.clear();
        self.regions.clear();
        self.updated.clear();
    }
}
