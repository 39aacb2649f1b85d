//! Command-line argument parsing for the tile streaming demo.

use std::path::PathBuf;

use clap::Parser;

use crate::StreamConfig;

/// Tile streaming command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "terrella", about = "Planetary surface tile streaming")]
pub struct CliArgs {
    /// Quads per tile edge.
    #[arg(long)]
    pub grid_resolution: Option<u32>,

    /// Deepest quadtree level refinement may reach.
    #[arg(long)]
    pub max_level: Option<u8>,

    /// Refinement bias (higher = finer tiles at a given distance).
    #[arg(long)]
    pub resolution_bias: Option<f64>,

    /// Tile builds started per second.
    #[arg(long)]
    pub load_frequency: Option<f64>,

    /// Maximum number of queued load requests.
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Terrain noise seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl StreamConfig {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(grid) = args.grid_resolution {
            self.surface.grid_resolution = grid;
        }
        if let Some(level) = args.max_level {
            self.surface.max_level = level;
        }
        if let Some(bias) = args.resolution_bias {
            self.surface.resolution_bias = bias;
        }
        if let Some(hz) = args.load_frequency {
            self.loader.load_frequency_hz = hz;
        }
        if let Some(capacity) = args.queue_capacity {
            self.loader.queue_capacity = capacity;
        }
        if let Some(seed) = args.seed {
            self.terrain.seed = seed;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
