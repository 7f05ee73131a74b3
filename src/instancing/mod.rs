//! Instance transform tracking between GPU placement and the renderer.
//!
//! Placement writes transforms into per-(layer, region) GPU buffers. After a
//! readback they are merged with transforms persisted from earlier cycles,
//! grouped per (region, mesh) and handed to the renderer. Persisting matters
//! because a region is pushed as a whole: instancers that were not dirty this
//! cycle still own instances there.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::core::types::Mat4;
use crate::gpu::{BufferHandle, GpuBackend};
use crate::layer::{LayerCollection, LayerId};
use crate::region::{RegionCoord, RegionDependencyManager};

/// An instance buffer written this cycle and not yet read back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingInstances {
    pub layer: LayerId,
    pub region: RegionCoord,
    pub mesh_id: u32,
    pub buffer: BufferHandle,
}

#[derive(Clone, Debug)]
struct PlacedInstances {
    mesh_id: u32,
    transforms: Vec<Mat4>,
}

/// What to send to the renderer after a readback.
#[derive(Debug, Default)]
pub struct InstancePushPlan {
    /// Aggregated transforms per (region, mesh)
    pub transforms: BTreeMap<(RegionCoord, u32), Vec<Mat4>>,
    /// Renderer instances to drop before pushing, including meshes no longer used
    pub clears: BTreeSet<(RegionCoord, u32)>,
    /// (layer, region) pairs that lost their instances; their buffers can go
    pub orphaned: Vec<(LayerId, RegionCoord)>,
}

impl InstancePushPlan {
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty() && self.clears.is_empty() && self.orphaned.is_empty()
    }

    pub fn instance_count(&self) -> usize {
        self.transforms.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Default)]
pub struct InstanceTracker {
    pending: Vec<PendingInstances>,
    /// Read back this cycle, not merged yet
    fresh: Vec<(PendingInstances, Vec<Mat4>)>,
    persisted: HashMap<(LayerId, RegionCoord), PlacedInstances>,
    /// Regions holding instances of each layer as of the last push
    layer_regions: HashMap<LayerId, HashSet<RegionCoord>>,
    /// Mesh ids pushed to each region by the last push
    region_meshes: HashMap<RegionCoord, HashSet<u32>>,
}

impl InstanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue buffers written by this cycle's placement tasks.
    pub fn track(&mut self, pending: impl IntoIterator<Item = PendingInstances>) {
        self.pending.extend(pending);
    }

    pub fn pending(&self) -> &[PendingInstances] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || !self.fresh.is_empty()
    }

    /// Pending buffers, or instances left behind by moved or deleted layers.
    pub fn needs_push(&self, collection: &LayerCollection, deps: &RegionDependencyManager) -> bool {
        self.has_pending()
            || self.layer_regions.iter().any(|(id, previous)| {
                let current = current_regions(*id, collection, deps);
                previous.iter().any(|coord| !current.contains(coord))
            })
    }

    /// Copy pending buffers to the CPU. Failed reads are logged and skipped.
    pub fn readback(&mut self, backend: &dyn GpuBackend) -> usize {
        let mut read = 0;
        for pending in std::mem::take(&mut self.pending) {
            match backend.read_transforms(pending.buffer) {
                Ok(transforms) => {
                    log::trace!(
                        "Read {} instance(s) of {} in region {}",
                        transforms.len(),
                        pending.layer,
                        pending.region
                    );
                    self.fresh.push((pending, transforms));
                    read += 1;
                }
                Err(e) => log::warn!(
                    "Instance readback of {} in region {} failed: {}",
                    pending.layer,
                    pending.region,
                    e
                ),
            }
        }
        read
    }

    /// Merge fresh readbacks into the persisted set and build the push plan.
    pub fn aggregate(&mut self, collection: &LayerCollection, deps: &RegionDependencyManager) -> InstancePushPlan {
        let mut plan = InstancePushPlan::default();
        let mut affected: BTreeSet<RegionCoord> = BTreeSet::new();

        for (pending, transforms) in self.fresh.drain(..) {
            affected.insert(pending.region);
            self.persisted.insert(
                (pending.layer, pending.region),
                PlacedInstances {
                    mesh_id: pending.mesh_id,
                    transforms,
                },
            );
        }

        let tracked: HashSet<LayerId> = self
            .layer_regions
            .keys()
            .copied()
            .chain(self.persisted.keys().map(|(id, _)| *id))
            .collect();
        for id in tracked {
            let current = current_regions(id, collection, deps);
            let stale: Vec<RegionCoord> = self
                .persisted
                .keys()
                .filter(|(layer, coord)| *layer == id && !current.contains(coord))
                .map(|(_, coord)| *coord)
                .collect();
            for coord in stale {
                log::debug!("Instances of {} left region {}", id, coord);
                self.persisted.remove(&(id, coord));
                plan.orphaned.push((id, coord));
                affected.insert(coord);
            }
            if let Some(previous) = self.layer_regions.get(&id) {
                affected.extend(previous.iter().filter(|coord| !current.contains(*coord)));
            }
        }
        plan.orphaned.sort();

        self.layer_regions.clear();
        for (id, coord) in self.persisted.keys() {
            self.layer_regions.entry(*id).or_default().insert(*coord);
        }

        for coord in affected {
            let mut meshes: HashSet<u32> = HashSet::new();
            for ((_, region), placed) in &self.persisted {
                if *region != coord {
                    continue;
                }
                meshes.insert(placed.mesh_id);
                plan.transforms
                    .entry((coord, placed.mesh_id))
                    .or_default()
                    .extend_from_slice(&placed.transforms);
            }

            let previous = self.region_meshes.remove(&coord).unwrap_or_default();
            for mesh_id in previous.union(&meshes) {
                plan.clears.insert((coord, *mesh_id));
            }
            if !meshes.is_empty() {
                self.region_meshes.insert(coord, meshes);
            }
        }

        plan
    }

    /// Forget layers that are no longer instancers in the scene. Returns their
    /// (layer, region) pairs so the caller can free the buffers.
    pub fn untrack_missing(&mut self, collection: &LayerCollection) -> Vec<(LayerId, RegionCoord)> {
        let missing = |id: LayerId| !collection.get(id).is_some_and(|l| l.is_instancer());

        let mut released: Vec<(LayerId, RegionCoord)> = self
            .persisted
            .keys()
            .filter(|(id, _)| missing(*id))
            .copied()
            .collect();
        for key in &released {
            self.persisted.remove(key);
        }
        for (id, regions) in self.layer_regions.iter().filter(|(id, _)| missing(**id)) {
            released.extend(regions.iter().map(|coord| (*id, *coord)));
        }
        self.layer_regions.retain(|id, _| !missing(*id));

        released.sort();
        released.dedup();
        if !released.is_empty() {
            log::debug!("Untracked {} instance buffer(s) of removed layers", released.len());
        }
        released
    }

    /// Drop pending and unmerged readbacks.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
        self.fresh.clear();
    }

    /// Persisted transforms of one (layer, region).
    pub fn persisted(&self, layer: LayerId, region: RegionCoord) -> Option<&[Mat4]> {
        self.persisted.get(&(layer, region)).map(|p| p.transforms.as_slice())
    }

    pub fn tracked_layer_count(&self) -> usize {
        self.layer_regions.len()
    }
}

/// Active regions an instancer currently occupies; empty once it left the
/// scene. A region that lost its terrain drops out even if the layer still
/// overlaps it.
fn current_regions(
    id: LayerId,
    collection: &LayerCollection,
    deps: &RegionDependencyManager,
) -> HashSet<RegionCoord> {
    if !collection.get(id).is_some_and(|l| l.is_instancer()) {
        return HashSet::new();
    }
    deps.regions_for_layer(id)
        .into_iter()
        .filter(|coord| deps.is_active(*coord))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Vec2, Vec3};
    use crate::gpu::{BufferDesc, BufferKind, MemoryBackend};
    use crate::layer::{FeatureCaps, Layer, LayerSource, Scene};

    struct Fixture {
        scene: Scene,
        /// Height layer under regions (0, 0) and (1, 0)
        ground: LayerId,
        collection: LayerCollection,
        deps: RegionDependencyManager,
        backend: MemoryBackend,
    }

    impl Fixture {
        fn new() -> Self {
            let mut scene = Scene::new();
            let ground = scene.add(Layer::height(
                "ground",
                Vec2::new(1024.0, 512.0),
                Vec2::new(2048.0, 1024.0),
            ));
            Self {
                scene,
                ground,
                collection: LayerCollection::new(),
                deps: RegionDependencyManager::new(1024.0, 16),
                backend: MemoryBackend::new(),
            }
        }

        fn sync(&mut self) {
            self.deps.update(self.scene.layers_mut());
            self.collection.refresh(self.scene.layers());
        }

        fn placed(&mut self, layer: LayerId, region: RegionCoord, mesh_id: u32, count: usize) -> PendingInstances {
            let buffer = self
                .backend
                .create_buffer(&BufferDesc::new("instances", BufferKind::Instances, 64, 1))
                .unwrap();
            let origin = Vec3::new(region.x as f32 * 1024.0 + 10.0, 0.0, region.z as f32 * 1024.0 + 10.0);
            let transforms: Vec<Mat4> = (0..count)
                .map(|i| Mat4::from_translation(origin + Vec3::X * i as f32))
                .collect();
            self.backend.write_transforms(buffer, &transforms).unwrap();
            PendingInstances { layer, region, mesh_id, buffer }
        }
    }

    fn trees(center: Vec2, mesh_id: u32) -> Layer {
        Layer::feature("trees", FeatureCaps::instancer(1, mesh_id), center, Vec2::splat(200.0))
    }

    #[test]
    fn test_aggregates_per_region_and_mesh() {
        let mut f = Fixture::new();
        let a = f.scene.add(trees(Vec2::splat(500.0), 1));
        let b = f.scene.add(trees(Vec2::splat(520.0), 1));
        f.sync();
        let coord = RegionCoord::new(0, 0);

        let mut tracker = InstanceTracker::new();
        let pending = [f.placed(a, coord, 1, 3), f.placed(b, coord, 1, 2)];
        tracker.track(pending);
        assert!(tracker.needs_push(&f.collection, &f.deps));
        assert_eq!(tracker.readback(&f.backend), 2);

        let plan = tracker.aggregate(&f.collection, &f.deps);
        assert_eq!(plan.transforms[&(coord, 1)].len(), 5);
        assert!(plan.clears.contains(&(coord, 1)));
        assert!(plan.orphaned.is_empty());
        assert!(!tracker.needs_push(&f.collection, &f.deps));
    }

    #[test]
    fn test_clean_layer_instances_are_merged() {
        let mut f = Fixture::new();
        let a = f.scene.add(trees(Vec2::splat(500.0), 1));
        let b = f.scene.add(trees(Vec2::splat(520.0), 2));
        f.sync();
        let coord = RegionCoord::new(0, 0);
        let mut tracker = InstanceTracker::new();

        let pending = [f.placed(a, coord, 1, 3), f.placed(b, coord, 2, 4)];
        tracker.track(pending);
        tracker.readback(&f.backend);
        tracker.aggregate(&f.collection, &f.deps);

        // Only `a` is re-placed; `b` must still be pushed for the region
        let pending = f.placed(a, coord, 1, 1);
        tracker.track([pending]);
        tracker.readback(&f.backend);
        let plan = tracker.aggregate(&f.collection, &f.deps);
        assert_eq!(plan.transforms[&(coord, 1)].len(), 1);
        assert_eq!(plan.transforms[&(coord, 2)].len(), 4);
    }

    #[test]
    fn test_moved_layer_clears_old_region() {
        let mut f = Fixture::new();
        let id = f.scene.add(trees(Vec2::splat(500.0), 9));
        f.sync();
        let old = RegionCoord::new(0, 0);
        let new = RegionCoord::new(1, 0);
        let mut tracker = InstanceTracker::new();
        let pending = f.placed(id, old, 9, 2);
        tracker.track([pending]);
        tracker.readback(&f.backend);
        tracker.aggregate(&f.collection, &f.deps);

        f.scene.get_mut(id).unwrap().translate(Vec2::new(1024.0, 0.0));
        f.sync();
        assert!(tracker.needs_push(&f.collection, &f.deps));

        let pending = f.placed(id, new, 9, 2);
        tracker.track([pending]);
        tracker.readback(&f.backend);
        let plan = tracker.aggregate(&f.collection, &f.deps);
        assert_eq!(plan.orphaned, vec![(id, old)]);
        assert!(plan.clears.contains(&(old, 9)), "old mesh cleared even though nothing replaces it");
        assert!(!plan.transforms.contains_key(&(old, 9)));
        assert_eq!(plan.transforms[&(new, 9)].len(), 2);
    }

    #[test]
    fn test_region_losing_terrain_orphans_instances() {
        let mut f = Fixture::new();
        let id = f.scene.add(trees(Vec2::splat(500.0), 4));
        f.sync();
        let coord = RegionCoord::new(0, 0);
        let mut tracker = InstanceTracker::new();
        let pending = f.placed(id, coord, 4, 3);
        tracker.track([pending]);
        tracker.readback(&f.backend);
        tracker.aggregate(&f.collection, &f.deps);
        assert!(!tracker.needs_push(&f.collection, &f.deps));

        // Trees stay put, but the region under them is no longer active
        f.scene.remove(f.ground);
        f.sync();
        assert!(tracker.needs_push(&f.collection, &f.deps));

        let plan = tracker.aggregate(&f.collection, &f.deps);
        assert_eq!(plan.orphaned, vec![(id, coord)]);
        assert!(plan.clears.contains(&(coord, 4)));
        assert_eq!(plan.instance_count(), 0);
        assert!(tracker.persisted(id, coord).is_none());
    }

    #[test]
    fn test_changed_mesh_id_clears_previous_mesh() {
        let mut f = Fixture::new();
        let id = f.scene.add(trees(Vec2::splat(500.0), 1));
        f.sync();
        let coord = RegionCoord::new(0, 0);
        let mut tracker = InstanceTracker::new();
        let pending = f.placed(id, coord, 1, 2);
        tracker.track([pending]);
        tracker.readback(&f.backend);
        tracker.aggregate(&f.collection, &f.deps);

        let pending = f.placed(id, coord, 2, 2);
        tracker.track([pending]);
        tracker.readback(&f.backend);
        let plan = tracker.aggregate(&f.collection, &f.deps);
        assert!(plan.clears.contains(&(coord, 1)));
        assert!(plan.clears.contains(&(coord, 2)));
        assert!(!plan.transforms.contains_key(&(coord, 1)));
    }

    #[test]
    fn test_untrack_missing_layers() {
        let mut f = Fixture::new();
        let id = f.scene.add(trees(Vec2::splat(500.0), 1));
        f.sync();
        let coord = RegionCoord::new(0, 0);
        let mut tracker = InstanceTracker::new();
        let pending = f.placed(id, coord, 1, 2);
        tracker.track([pending]);
        tracker.readback(&f.backend);
        tracker.aggregate(&f.collection, &f.deps);
        assert_eq!(tracker.tracked_layer_count(), 1);

        f.scene.remove(id);
        f.sync();
        assert_eq!(tracker.untrack_missing(&f.collection), vec![(id, coord)]);
        assert_eq!(tracker.tracked_layer_count(), 0);
        assert!(tracker.persisted(id, coord).is_none());
    }

    #[test]
    fn test_failed_readback_is_skipped() {
        let mut f = Fixture::new();
        let id = f.scene.add(trees(Vec2::splat(500.0), 1));
        f.sync();
        let mut tracker = InstanceTracker::new();
        let mut pending = f.placed(id, RegionCoord::new(0, 0), 1, 2);
        f.backend.free_buffer(pending.buffer);
        pending.buffer = BufferHandle(u64::MAX);
        tracker.track([pending]);

        assert_eq!(tracker.readback(&f.backend), 0);
        assert!(!tracker.has_pending());
    }
}
