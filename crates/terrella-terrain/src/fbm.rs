//! Procedural elevation from multi-octave simplex noise.
//!
//! Samples fractal Brownian motion (fBm) on the unit sphere, so elevation
//! is seamless everywhere, and quantizes to the metre-resolution `i16`
//! samples the mesh builders consume.
//!
//! Node positions come from a level-global lattice index rather than from
//! per-tile bounds: two tiles sharing an edge then evaluate bit-identical
//! latitudes and longitudes for the shared nodes, and the date line wraps
//! through the same indices, so quantization can never disagree across a
//! seam.

use std::f64::consts::PI;

use glam::DVec3;
use noise::{NoiseFn, Simplex};
use terrella_geom::{ElevationPatch, ElevationSource, TileId};

/// Shape of the fBm composite, typically mapped from the `[terrain]`
/// config section.
#[derive(Clone, Debug)]
pub struct FbmParams {
    /// World seed for deterministic generation.
    pub seed: u64,
    /// Number of noise octaves to composite. More octaves add finer
    /// detail at additional sampling cost.
    pub octaves: u32,
    /// Frequency multiplier between successive octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between successive octaves.
    pub persistence: f64,
    /// Amplitude of the first octave, metres.
    pub amplitude_m: f64,
    /// Frequency of the first octave over the unit sphere. 2.0 puts the
    /// broadest features at roughly continental scale.
    pub base_frequency: f64,
}

impl Default for FbmParams {
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

/// Elevation source backed by fBm over simplex noise.
pub struct FbmElevation {
    noise: Simplex,
    params: FbmParams,
}

impl FbmElevation {
    /// Create a sampler for the given parameters.
    #[must_use]
    pub fn new(params: FbmParams) -> Self {
        let noise = Simplex::new(params.seed as u32);
        Self { noise, params }
    }

    /// Sample the composite at a point on the unit sphere, metres.
    #[must_use]
    pub fn sample_dir(&self, dir: DVec3) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = self.params.amplitude_m;
        for _ in 0..self.params.octaves {
            let p = dir * frequency;
            total += self.noise.get([p.x, p.y, p.z]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }
        total
    }

    /// Theoretical bound on `|sample_dir|`: the geometric sum of the
    /// octave amplitudes.
    #[must_use]
    pub fn max_amplitude(&self) -> f64 {
        let mut sum = 0.0;
        let mut amplitude = self.params.amplitude_m;
        for _ in 0..self.params.octaves {
            sum += amplitude;
            amplitude *= self.params.persistence;
        }
        sum
    }
}

impl ElevationSource for FbmElevation {
    fn elevation_patch(&self, id: TileId, grid: u32) -> Option<ElevationPatch> {
        let g = i64::from(grid);
        let lat_steps = i64::from(TileId::rows(id.level)) * g;
        let lng_steps = i64::from(TileId::cols(id.level)) * g;
        // Global indices of this tile's node (0, 0): latitude counted up
        // from the south pole, longitude east from the date line.
        let lat_base = (i64::from(TileId::rows(id.level)) - 1 - i64::from(id.row)) * g;
        let lng_base = i64::from(id.col) * g;

        Some(ElevationPatch::from_fn(grid, |i, j| {
            let lat = -PI / 2.0 + PI * (lat_base + i) as f64 / lat_steps as f64;
            let lng = -PI + 2.0 * PI * (lng_base + j).rem_euclid(lng_steps) as f64 / lng_steps as f64;
            let (slat, clat) = lat.sin_cos();
            let (slng, clng) = lng.sin_cos();
            let dir = DVec3::new(clat * clng, slat, clat * slng);
            quantize(self.sample_dir(dir))
        }))
    }
}

/// Fixed-elevation source: every node of every tile at the same height.
/// Useful for flat worlds and tests.
#[derive(Clone, Copy, Debug)]
pub struct ConstantElevation(pub i16);

impl ElevationSource for ConstantElevation {
    fn elevation_patch(&self, _id: TileId, grid: u32) -> Option<ElevationPatch> {
        let value = self.0;
        Some(ElevationPatch::from_fn(grid, |_, _| value))
    }
}

fn quantize(metres: f64) -> i16 {
    metres
        .round()
        .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}
