//! Terralayer - region and layer dependency tracking with a scheduled,
//! GPU-task based update pipeline for procedural terrain layers

pub mod core;
pub mod math;
pub mod region;
pub mod layer;
pub mod gpu;
pub mod config;
pub mod scheduler;
pub mod pipeline;
pub mod instancing;
pub mod renderer;
pub mod height_query;
pub mod manager;

pub use crate::config::TerrainConfig;
pub use crate::core::error::Error;
pub use crate::manager::{HostContext, TerrainLayerManager, UpdatePhase, UpdateStats};
