//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};
use terrella_geom::{MAX_GRID_RESOLUTION, MAX_LEVEL};

use crate::error::ConfigError;

/// Top-level streaming configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Planet surface and refinement settings.
    pub surface: SurfaceConfig,
    /// Background tile loader settings.
    pub loader: LoaderConfig,
    /// GPU buffer pool settings.
    pub pool: PoolConfig,
    /// Procedural terrain settings.
    pub terrain: TerrainConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Planet surface and refinement configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Planet radius in meters.
    pub radius_m: f64,
    /// Quads per tile edge (excluding the skirt ring).
    pub grid_resolution: u32,
    /// Deepest quadtree level refinement may reach.
    pub max_level: u8,
    /// Added to the distance-derived target level; higher = finer tiles.
    pub resolution_bias: f64,
}

/// Background tile loader configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Worker wake-ups per second; one tile build starts per wake-up.
    pub load_frequency_hz: f64,
    /// Maximum number of queued load requests.
    pub queue_capacity: usize,
    /// How long shutdown waits for an in-flight build before detaching (ms).
    pub shutdown_grace_ms: u64,
}

/// GPU buffer pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of distinct buffer size classes kept alive.
    pub max_size_classes: usize,
}

/// Procedural terrain configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    /// Noise seed; equal seeds produce bitwise-equal planets.
    pub seed: u64,
    /// Number of fBm octaves.
    pub octaves: u32,
    /// Frequency multiplier between octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between octaves.
    pub persistence: f64,
    /// Peak-to-trough scale of the first octave in meters.
    pub amplitude_m: f64,
    /// Frequency of the first octave over the unit sphere.
    pub base_frequency: f64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            radius_m: 6.371e6,
            grid_resolution: 32,
            max_level: 10,
            resolution_bias: 2.0,
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            load_frequency_hz: 20.0,
            queue_capacity: 32,
            shutdown_grace_ms: 1000,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size_classes: 16,
        }
    }
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 6,
            lacunarity: 2.0,
            persistence: 0.5,
            amplitude_m: 8000.0,
            base_frequency: 2.0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Load / Save / Reload ---

impl StreamConfig {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: StreamConfig = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = StreamConfig::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: StreamConfig = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

// --- Validation ---

impl StreamConfig {
    /// Reject settings the streaming system cannot run with.
    ///
    /// Called once at startup after CLI overrides are applied; a default
    /// config always passes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.surface;
        if !(s.radius_m.is_finite() && s.radius_m > 0.0) {
            return Err(ConfigError::Validation(format!(
                "surface.radius_m must be positive (got {})",
                s.radius_m
            )));
        }
        if s.grid_resolution == 0 || s.grid_resolution > MAX_GRID_RESOLUTION {
            return Err(ConfigError::Validation(format!(
                "surface.grid_resolution must be in 1..={MAX_GRID_RESOLUTION} (got {})",
                s.grid_resolution
            )));
        }
        if s.max_level > MAX_LEVEL {
            return Err(ConfigError::Validation(format!(
                "surface.max_level must be at most {MAX_LEVEL} (got {})",
                s.max_level
            )));
        }
        if !s.resolution_bias.is_finite() {
            return Err(ConfigError::Validation(format!(
                "surface.resolution_bias must be finite (got {})",
                s.resolution_bias
            )));
        }

        let l = &self.loader;
        if !(l.load_frequency_hz.is_finite() && l.load_frequency_hz > 0.0) {
            return Err(ConfigError::Validation(format!(
                "loader.load_frequency_hz must be positive (got {})",
                l.load_frequency_hz
            )));
        }
        if l.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "loader.queue_capacity must be at least 1".to_string(),
            ));
        }

        if self.pool.max_size_classes == 0 {
            return Err(ConfigError::Validation(
                "pool.max_size_classes must be at least 1".to_string(),
            ));
        }

        let t = &self.terrain;
        if t.octaves == 0 {
            return Err(ConfigError::Validation(
                "terrain.octaves must be at least 1".to_string(),
            ));
        }
        if !(t.lacunarity.is_finite() && t.lacunarity > 0.0) {
            return Err(ConfigError::Validation(format!(
                "terrain.lacunarity must be positive (got {})",
                t.lacunarity
            )));
        }
        if !(t.persistence.is_finite() && t.persistence > 0.0) {
            return Err(ConfigError::Validation(format!(
                "terrain.persistence must be positive (got {})",
                t.persistence
            )));
        }
        if !(t.amplitude_m.is_finite() && t.amplitude_m >= 0.0) {
            return Err(ConfigError::Validation(format!(
                "terrain.amplitude_m must be non-negative (got {})",
                t.amplitude_m
            )));
        }
        if !(t.base_frequency.is_finite() && t.base_frequency > 0.0) {
            return Err(ConfigError::Validation(format!(
                "terrain.base_frequency must be positive (got {})",
                t.base_frequency
            )));
        }

        Ok(())
    }
}
