//! Host terrain renderer sink.
//!
//! The pipeline only calls into the renderer with fully composited,
//! readback-complete CPU data.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::core::error::Error;
use crate::core::types::{Mat4, Result, Vec2};
use crate::region::{world_to_region, RegionCoord};

/// Region heightmap in CPU memory, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightImage {
    pub resolution: u32,
    pub data: Vec<f32>,
}

/// Region control map in CPU memory, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlImage {
    pub resolution: u32,
    pub data: Vec<u32>,
}

/// Receiver of finished region and instance data.
pub trait TerrainRenderer {
    /// Fully initialized and accepting writes.
    fn is_ready(&self) -> bool;
    /// A previous push is still being consumed.
    fn has_pending_work(&self) -> bool;
    fn add_region(&mut self, coord: RegionCoord) -> Result<()>;
    fn push_region(&mut self, coord: RegionCoord, height: &HeightImage, control: &ControlImage) -> Result<()>;
    fn remove_region_layer(&mut self, coord: RegionCoord) -> Result<()>;
    fn clear_instances_for_mesh(&mut self, coord: RegionCoord, mesh_id: u32);
    fn add_instance_transforms(&mut self, mesh_id: u32, transforms: &[Mat4]);
}

/// Renderer that records every call. Useful for headless hosts and tests.
#[derive(Debug)]
pub struct RecordingRenderer {
    /// Used to attribute instance transforms to regions
    pub region_size: f32,
    pub ready: bool,
    pub pending_work: bool,
    /// Regions whose writes are rejected
    pub reject: HashSet<RegionCoord>,
    pub regions: BTreeSet<RegionCoord>,
    pub pushed: Vec<RegionCoord>,
    pub removed: Vec<RegionCoord>,
    pub cleared: Vec<(RegionCoord, u32)>,
    pub instances: HashMap<u32, Vec<Mat4>>,
}

impl RecordingRenderer {
    pub fn new(region_size: f32) -> Self {
        Self {
            region_size,
            ready: true,
            pending_work: false,
            reject: HashSet::new(),
            regions: BTreeSet::new(),
            pushed: Vec::new(),
            removed: Vec::new(),
            cleared: Vec::new(),
            instances: HashMap::new(),
        }
    }

    pub fn instance_count(&self, mesh_id: u32) -> usize {
        self.instances.get(&mesh_id).map_or(0, Vec::len)
    }

    /// Instances of `mesh_id` whose translation lies in `coord`.
    pub fn instances_in(&self, coord: RegionCoord, mesh_id: u32) -> usize {
        self.instances.get(&mesh_id).map_or(0, |list| {
            list.iter()
                .filter(|t| world_to_region(Vec2::new(t.w_axis.x, t.w_axis.z), self.region_size) == coord)
                .count()
        })
    }

    pub fn clear_log(&mut self) {
        self.pushed.clear();
        self.removed.clear();
        self.cleared.clear();
    }
}

impl Default for RecordingRenderer {
    fn default() -> Self {
        Self::new(1024.0)
    }
}

impl TerrainRenderer for RecordingRenderer {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn has_pending_work(&self) -> bool {
        self.pending_work
    }

    fn add_region(&mut self, coord: RegionCoord) -> Result<()> {
        if self.reject.contains(&coord) {
            return Err(Error::Renderer(format!("region {coord} rejected")));
        }
        self.regions.insert(coord);
        Ok(())
    }

    fn push_region(&mut self, coord: RegionCoord, height: &HeightImage, control: &ControlImage) -> Result<()> {
        if self.reject.contains(&coord) {
            return Err(Error::Renderer(format!("region {coord} rejected")));
        }
        if height.resolution != control.resolution {
            return Err(Error::Renderer(format!(
                "region {coord}: height {} and control {} resolutions differ",
                height.resolution, control.resolution
            )));
        }
        self.pushed.push(coord);
        Ok(())
    }

    fn remove_region_layer(&mut self, coord: RegionCoord) -> Result<()> {
        self.regions.remove(&coord);
        self.removed.push(coord);
        Ok(())
    }

    fn clear_instances_for_mesh(&mut self, coord: RegionCoord, mesh_id: u32) {
        self.cleared.push((coord, mesh_id));
        let region_size = self.region_size;
        if let Some(list) = self.instances.get_mut(&mesh_id) {
            list.retain(|t| {
                let p = t.w_axis;
                world_to_region(Vec2::new(p.x, p.z), region_size) != coord
            });
        }
    }

    fn add_instance_transforms(&mut self, mesh_id: u32, transforms: &[Mat4]) {
        self.instances.entry(mesh_id).or_default().extend_from_slice(transforms);
    }
}
