//! Configuration for the tile streaming system.
//!
//! Provides runtime-configurable settings that persist to disk as RON files.
//! Supports CLI overrides via clap, hot-reload detection, startup validation,
//! and forward/backward compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    DebugConfig, LoaderConfig, PoolConfig, StreamConfig, SurfaceConfig, TerrainConfig,
};
pub use error::ConfigError;
