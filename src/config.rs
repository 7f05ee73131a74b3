//! Pipeline configuration.
//!
//! Passed explicitly into every component constructor. Persisted as pretty
//! JSON next to the host project when it needs to survive sessions.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

/// Shortest allowed interaction debounce window, in seconds.
pub const MIN_INTERACTION_THRESHOLD: f32 = 0.1;
/// Shortest allowed poll interval, in seconds (about one frame at 60 Hz).
pub const MIN_UPDATE_INTERVAL: f32 = 0.016;

/// User-facing settings of the terrain layer pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// World units along one region edge
    pub region_size: f32,
    /// Pixels along one region edge
    pub region_resolution: u32,
    /// Height multiplier shared by every kernel and the height query
    pub world_scale: f32,
    /// Host terrain accepts region coordinates with |x|, |z| below this
    pub region_limit: i32,
    /// Seconds without changes before a full update fires
    pub interaction_threshold: f32,
    /// Seconds between update polls
    pub update_interval: f32,
    /// Push recomposited regions to the renderer automatically
    pub auto_push: bool,
    /// Smooth control-map blend edges after feature application
    pub blend_smoothing: bool,
    pub blend_smoothing_passes: u32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            region_size: 1024.0,
            region_resolution: 256,
            world_scale: 1.0,
            region_limit: 16,
            interaction_threshold: 0.5,
            update_interval: 0.1,
            auto_push: true,
            blend_smoothing: false,
            blend_smoothing_passes: 1,
        }
    }
}

impl TerrainConfig {
    /// Reject settings the pipeline cannot start with.
    pub fn validate(&self) -> Result<()> {
        if !(self.region_size > 0.0 && self.region_size.is_finite()) {
            return Err(Error::Config(format!("invalid region size {}", self.region_size)));
        }
        if self.region_resolution < 2 {
            return Err(Error::Config(format!(
                "region resolution {} is below 2 pixels",
                self.region_resolution
            )));
        }
        if !(self.world_scale > 0.0 && self.world_scale.is_finite()) {
            return Err(Error::Config(format!("invalid world scale {}", self.world_scale)));
        }
        if self.region_limit <= 0 {
            return Err(Error::Config(format!("invalid region limit {}", self.region_limit)));
        }
        Ok(())
    }

    /// Interaction threshold clamped to its minimum.
    pub fn effective_interaction_threshold(&self) -> f32 {
        self.interaction_threshold.max(MIN_INTERACTION_THRESHOLD)
    }

    /// Update interval clamped to its minimum.
    pub fn effective_update_interval(&self) -> f32 {
        self.update_interval.max(MIN_UPDATE_INTERVAL)
    }

    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(TerrainConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_region_size() {
        let config = TerrainConfig { region_size: 0.0, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_clamped_timings() {
        let config = TerrainConfig {
            interaction_threshold: 0.01,
            update_interval: 0.0,
            ..Default::default()
        };
        assert_eq!(config.effective_interaction_threshold(), MIN_INTERACTION_THRESHOLD);
        assert_eq!(config.effective_update_interval(), MIN_UPDATE_INTERVAL);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("terrain.json");
        let config = TerrainConfig {
            region_size: 512.0,
            blend_smoothing: true,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(TerrainConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TerrainConfig = serde_json::from_str(r#"{ "region_size": 256.0 }"#).unwrap();
        assert_eq!(config.region_size, 256.0);
        assert_eq!(config.region_resolution, 256);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "region_resolution": 0 }"#).unwrap();
        assert!(matches!(TerrainConfig::load(&path), Err(Error::Config(_))));
    }
}
