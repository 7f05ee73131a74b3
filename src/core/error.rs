//! Error types for terralayer

use thiserror::Error;

use crate::region::RegionCoord;

/// Main error type for the terrain layer pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration; the pipeline refuses to start
    #[error("Configuration error: {0}")]
    Config(String),

    /// GPU resource creation or readback failed
    #[error("GPU error: {0}")]
    Gpu(String),

    /// The host terrain renderer rejected a write
    #[error("Renderer error: {0}")]
    Renderer(String),

    #[error("Layer '{layer}': {message}")]
    Layer { layer: String, message: String },

    #[error("Region {coord}: {message}")]
    Region { coord: RegionCoord, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a per-layer error.
    pub fn layer(layer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Layer {
            layer: layer.into(),
            message: message.into(),
        }
    }

    /// Build a per-region error.
    pub fn region(coord: RegionCoord, message: impl Into<String>) -> Self {
        Self::Region {
            coord,
            message: message.into(),
        }
    }
}
