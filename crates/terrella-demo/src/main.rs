//! Demo binary that streams a procedural planet's surface tiles headlessly.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p terrella-demo` to stream a camera approach and retreat.
//! Run with `cargo run -p terrella-demo -- --seed 7 --max-level 12` to override settings.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use glam::{DMat4, DVec3};
use terrella_config::{CliArgs, StreamConfig};
use terrella_geom::ElevationSource;
use terrella_render::{BufferPool, RenderError, TileGpu, TileTexture, init_tile_gpu_blocking};
use terrella_surface::{
    LoaderSettings, SurfaceSettings, TileLoader, TileManager, TraverseStats, ViewParams,
};
use terrella_terrain::{FbmElevation, FbmParams};
use tracing::{error, info};

/// Frames spent descending from space to low altitude.
const APPROACH_FRAMES: u32 = 240;
/// Frames spent climbing back out, exercising prune and buffer reuse.
const RETREAT_FRAMES: u32 = 120;
/// Wall-clock pause per frame, giving the loader worker time to build.
const FRAME_MS: u64 = 15;
/// Camera distance at the start and end of the flight, planet radii.
const FAR_RADII: f64 = 10.0;
/// Closest approach, planet radii.
const NEAR_RADII: f64 = 1.05;
/// Hemisphere base texture edge length in texels.
const TEX_SIZE: u32 = 256;

fn main() {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args.config.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .expect("Failed to resolve config directory")
            .join("terrella")
    });

    // Load or create config, then apply CLI overrides
    let mut config = StreamConfig::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        StreamConfig::default()
    });
    config.apply_cli_overrides(&args);

    if let Err(e) = config.validate() {
        eprintln!("{e}");
        std::process::exit(2);
    }

    // Initialize logging with config and debug settings
    let log_dir = config_dir.join("logs");
    terrella_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let gpu = match init_tile_gpu_blocking() {
        Ok(gpu) => Arc::new(gpu),
        Err(e) => {
            error!("GPU initialization failed: {e}");
            std::process::exit(1);
        }
    };

    run_stream_demo(gpu, &config);
}

/// Fly a camera in from deep space, over the surface, and back out,
/// logging streaming statistics along the way.
fn run_stream_demo(gpu: Arc<TileGpu>, config: &StreamConfig) {
    let elevation: Arc<dyn ElevationSource> = Arc::new(FbmElevation::new(FbmParams {
        seed: config.terrain.seed,
        octaves: config.terrain.octaves,
        lacunarity: config.terrain.lacunarity,
        persistence: config.terrain.persistence,
        amplitude_m: config.terrain.amplitude_m,
        base_frequency: config.terrain.base_frequency,
    }));

    let loader = Arc::new(TileLoader::new(&LoaderSettings {
        load_frequency_hz: config.loader.load_frequency_hz,
        queue_capacity: config.loader.queue_capacity,
        shutdown_grace: Duration::from_millis(config.loader.shutdown_grace_ms),
    }));

    let settings = SurfaceSettings {
        radius_m: config.surface.radius_m,
        grid_resolution: config.surface.grid_resolution,
        max_level: config.surface.max_level,
        resolution_bias: config.surface.resolution_bias,
        base_elevation_m: 0.0,
    };
    let radius = settings.radius_m;

    let mut manager = TileManager::new(
        Arc::clone(&gpu),
        Arc::clone(&loader),
        BufferPool::new(config.pool.max_size_classes),
        settings,
        Some(elevation),
    );

    match hemisphere_textures(&gpu) {
        Ok((west, east)) => {
            manager.set_root_textures(Arc::new(west), Arc::new(east));
        }
        Err(e) => {
            // Tiles render with unbound textures; the flight still works.
            error!("hemisphere texture upload failed: {e}");
        }
    }

    info!("Starting approach: {FAR_RADII} -> {NEAR_RADII} radii over {APPROACH_FRAMES} frames");
    let descended = fly(&mut manager, radius, APPROACH_FRAMES, distance_at);
    if descended {
        info!("Starting retreat: {NEAR_RADII} -> {FAR_RADII} radii over {RETREAT_FRAMES} frames");
        fly(&mut manager, radius, RETREAT_FRAMES, |t| distance_at(1.0 - t));
    }

    let pool = manager.pool_stats();
    info!(
        "Buffer pool over the flight: {} created, {} reused, {} returned, {} released",
        pool.created, pool.reused, pool.returned, pool.released
    );
    info!("Pending builds at teardown: {}", loader.pending_count());

    drop(manager);
    loader.shutdown();
    info!("Streaming demo completed");
}

/// Step the camera through `frames` positions and traverse once per step.
/// Returns false if a traversal failed and the flight was abandoned.
fn fly<F>(manager: &mut TileManager, radius: f64, frames: u32, distance: F) -> bool
where
    F: Fn(f64) -> f64,
{
    let mut max_level_seen = 0u8;
    for frame in 0..frames {
        let t = f64::from(frame) / f64::from(frames.saturating_sub(1).max(1));
        let view = flight_view(radius, distance(t), t);
        manager.set_view_parameters(view);

        let mut frame_max = 0u8;
        let stats = match manager.traverse_and_render(|tile| {
            frame_max = frame_max.max(tile.id().level);
        }) {
            Ok(stats) => stats,
            Err(e) => {
                error!("traversal failed on frame {frame}: {e}");
                return false;
            }
        };
        max_level_seen = max_level_seen.max(frame_max);

        if frame % 30 == 0 || frame + 1 == frames {
            log_frame(manager, frame, &view, radius, &stats, frame_max);
        }
        std::thread::sleep(Duration::from_millis(FRAME_MS));
    }
    info!("Flight leg done, finest level rendered: {max_level_seen}");
    true
}

fn log_frame(
    manager: &TileManager,
    frame: u32,
    view: &ViewParams,
    radius: f64,
    stats: &TraverseStats,
    frame_max: u8,
) {
    let altitude_km = (view.camera_distance - 1.0) * radius / 1000.0;
    info!(
        "frame {frame}: altitude {altitude_km:.0} km, {} visited, {} rendered (max level {frame_max}), {} submitted, {} uploads, {} pending",
        stats.visited,
        stats.rendered,
        stats.submitted,
        stats.uploads,
        manager.loader().pending_count()
    );
}

/// Camera distance schedule: exponential glide between the far and near
/// distances so each frame shrinks the altitude by the same factor.
fn distance_at(t: f64) -> f64 {
    FAR_RADII * (NEAR_RADII / FAR_RADII).powf(t)
}

/// Camera drifting east over the mid northern latitudes while descending.
fn flight_view(radius: f64, distance_radii: f64, t: f64) -> ViewParams {
    let lat = 20f64.to_radians();
    let lng = (-90.0 + 25.0 * t).to_radians();
    let dir = DVec3::new(lat.cos() * lng.cos(), lat.sin(), lat.cos() * lng.sin());
    let eye = dir * (distance_radii * radius);

    let proj = DMat4::perspective_rh(
        60f64.to_radians(),
        16.0 / 9.0,
        1.0e-3 * radius,
        1.0e2 * radius,
    );
    let look = DMat4::look_at_rh(eye, DVec3::ZERO, DVec3::Y);
    let sun = DVec3::new(1.0, 0.4, 0.2);
    ViewParams::from_camera(proj * look, eye, sun, radius)
}

/// Build the two hemisphere base textures: latitude-banded colors with a
/// faint longitude modulation so seams and uv orientation are visible.
fn hemisphere_textures(gpu: &TileGpu) -> Result<(TileTexture, TileTexture), RenderError> {
    let west = hemisphere_texture(gpu, false)?;
    let east = hemisphere_texture(gpu, true)?;
    Ok((west, east))
}

fn hemisphere_texture(gpu: &TileGpu, east: bool) -> Result<TileTexture, RenderError> {
    let mut pixels = Vec::with_capacity((TEX_SIZE * TEX_SIZE * 4) as usize);
    for y in 0..TEX_SIZE {
        // v = 0 is the north edge of the hemisphere
        let lat = (0.5 - (f64::from(y) + 0.5) / f64::from(TEX_SIZE)) * std::f64::consts::PI;
        let band = lat.abs() / std::f64::consts::FRAC_PI_2;
        for x in 0..TEX_SIZE {
            let ripple = (f64::from(x) * 0.2).sin() * 12.0;
            let (r, g, b) = if band > 0.8 {
                (226.0, 231.0 + ripple * 0.2, 238.0)
            } else if band > 0.35 {
                (58.0 + ripple, 108.0 + ripple, 52.0)
            } else {
                (168.0 + ripple, 150.0 + ripple, 92.0)
            };
            // Shift the east hemisphere warmer so the two are tellable apart
            let r = if east { r + 14.0 } else { r };
            pixels.extend_from_slice(&[r as u8, g as u8, b as u8, 255]);
        }
    }
    TileTexture::from_rgba8(gpu, TEX_SIZE, TEX_SIZE, &pixels)
}
