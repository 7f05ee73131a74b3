//! Cross-layer dirty propagation.
//!
//! Layers are visited in a fixed order: heights, textures, then features by
//! descending priority. Every affects-edge points forward in that order, so a
//! single sweep reaches the transitive closure.

use std::collections::HashSet;

use super::{Layer, LayerCollection, LayerId, LayerKind, LayerTier};
use crate::region::{regions_for_bounds, RegionCoord};

/// World bounds intersection test. Symmetric.
pub fn layers_overlap(a: &Layer, b: &Layer) -> bool {
    a.bounds().intersects(&b.bounds())
}

/// Whether a change in `src` invalidates `tgt`. Not symmetric.
pub fn affects(src: &Layer, tgt: &Layer) -> bool {
    match (src.tier(), &tgt.kind) {
        (LayerTier::Height, LayerKind::Texture) => true,
        (LayerTier::Height, LayerKind::Feature(caps)) => caps.modifies_height,
        (LayerTier::Texture, LayerKind::Feature(caps)) => caps.modifies_texture,
        (LayerTier::Feature, LayerKind::Feature(caps)) => src.priority() > caps.priority,
        _ => false,
    }
}

/// Enlarge `dirty` with every layer reachable through overlapping affects-edges.
pub fn propagate_dirty_state(
    collection: &LayerCollection,
    dirty: &HashSet<LayerId>,
) -> HashSet<LayerId> {
    let order = collection.processing_order();
    let mut result = dirty.clone();

    for (i, src) in order.iter().enumerate() {
        if !result.contains(&src.id) {
            continue;
        }
        for tgt in &order[i + 1..] {
            if result.contains(&tgt.id) {
                continue;
            }
            if layers_overlap(src, tgt) && affects(src, tgt) {
                log::trace!("'{}' dirties '{}'", src.name, tgt.name);
                result.insert(tgt.id);
            }
        }
    }

    result
}

/// Force-dirty layers that depend on the position of a moved layer.
///
/// Mask content of the targets is unchanged, but what they sample underneath
/// moved: height-sampling textures, lower-priority features that write the same
/// channels, and height/texture dependent features over a moved base layer.
pub fn propagate_position_changes(
    collection: &LayerCollection,
    moved: &HashSet<LayerId>,
    dirty: &HashSet<LayerId>,
) -> HashSet<LayerId> {
    let mut result = dirty.clone();
    result.extend(moved.iter().copied().filter(|id| collection.contains(*id)));

    for src in collection.layers().iter().filter(|l| moved.contains(&l.id)) {
        for tgt in collection.layers() {
            if tgt.id == src.id || !layers_overlap(src, tgt) {
                continue;
            }
            if moved_layer_invalidates(src, tgt) {
                log::trace!("moved '{}' dirties '{}'", src.name, tgt.name);
                result.insert(tgt.id);
            }
        }
    }

    result
}

fn moved_layer_invalidates(src: &Layer, tgt: &Layer) -> bool {
    let src_writes_height = src.tier() == LayerTier::Height || src.is_height_feature();

    match (&src.kind, &tgt.kind) {
        (_, LayerKind::Texture) => src_writes_height && tgt.requires_height(),
        (LayerKind::Feature(s), LayerKind::Feature(t)) => {
            t.priority <= s.priority
                && ((s.modifies_height && t.modifies_height)
                    || (s.modifies_texture && t.modifies_texture))
        }
        (LayerKind::Height, LayerKind::Feature(t)) => t.modifies_height || t.is_instancer,
        (LayerKind::Texture, LayerKind::Feature(t)) => t.modifies_texture,
        _ => false,
    }
}

/// Regions touched by this update: everything under a dirty layer plus the
/// boundary-dirty regions. Inactive regions are included; callers filter
/// against the active set.
pub fn affected_regions(
    collection: &LayerCollection,
    dirty: &HashSet<LayerId>,
    boundary_dirty: &HashSet<RegionCoord>,
    region_size: f32,
) -> HashSet<RegionCoord> {
    let mut regions = boundary_dirty.clone();
    for layer in collection.layers().iter().filter(|l| dirty.contains(&l.id)) {
        regions.extend(regions_for_bounds(&layer.bounds(), region_size));
    }
    regions
}
