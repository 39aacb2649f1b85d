//! Elevation sample patches and their providers.

use crate::{GeometryError, TileId};

/// Sample row stride for a grid: the `(grid+1)` lattice nodes plus a
/// one-sample skirt on each side.
#[must_use]
pub fn sample_stride(grid: u32) -> usize {
    grid as usize + 3
}

/// Total sample count for a grid, `(grid+3)²`.
#[must_use]
pub fn sample_count(grid: u32) -> usize {
    sample_stride(grid) * sample_stride(grid)
}

/// Elevation samples for one tile, in metres, on the skirted lattice.
///
/// Node coordinates run `-1..=grid+1` on both axes; the `-1` and `grid+1`
/// border (the skirt) feeds gradient normals and seam interpolation at the
/// patch boundary without neighbor lookups. Row index grows northward,
/// column index eastward, matching the mesh vertex order.
#[derive(Clone, Debug)]
pub struct ElevationPatch {
    grid: u32,
    samples: Vec<i16>,
}

impl ElevationPatch {
    /// Wrap a raw sample buffer, validating its size against `grid`.
    pub fn new(grid: u32, samples: Vec<i16>) -> Result<Self, GeometryError> {
        let expected = sample_count(grid);
        if samples.len() != expected {
            return Err(GeometryError::ElevationSize {
                grid,
                expected,
                got: samples.len(),
            });
        }
        Ok(Self { grid, samples })
    }

    /// An all-zero patch (flat reference sphere).
    #[must_use]
    pub fn zeros(grid: u32) -> Self {
        Self {
            grid,
            samples: vec![0; sample_count(grid)],
        }
    }

    /// Build a patch by evaluating `f` at every node, skirt included.
    ///
    /// `f` receives node coordinates in `-1..=grid+1` (row, then column).
    #[must_use]
    pub fn from_fn(grid: u32, mut f: impl FnMut(i64, i64) -> i16) -> Self {
        let stride = sample_stride(grid) as i64;
        let mut samples = Vec::with_capacity(sample_count(grid));
        for i in -1..stride - 1 {
            for j in -1..stride - 1 {
                samples.push(f(i, j));
            }
        }
        Self { grid, samples }
    }

    /// Grid resolution this patch was sized for.
    #[must_use]
    pub fn grid(&self) -> u32 {
        self.grid
    }

    /// Sample at node `(i, j)`, both in `-1..=grid+1`.
    ///
    /// # Panics
    ///
    /// Panics if the node lies outside the skirted lattice.
    #[must_use]
    pub fn node(&self, i: i64, j: i64) -> i16 {
        let stride = sample_stride(self.grid) as i64;
        debug_assert!((-1..stride - 1).contains(&i) && (-1..stride - 1).contains(&j));
        self.samples[((i + 1) * stride + (j + 1)) as usize]
    }

    /// The raw row-major buffer, skirt included.
    #[must_use]
    pub fn raw(&self) -> &[i16] {
        &self.samples
    }

    /// Mean elevation over the addressable `(grid+1)²` interior nodes,
    /// metres.
    #[must_use]
    pub fn interior_mean(&self) -> f64 {
        let g = i64::from(self.grid);
        let mut sum = 0.0;
        for i in 0..=g {
            for j in 0..=g {
                sum += f64::from(self.node(i, j));
            }
        }
        sum / ((g + 1) * (g + 1)) as f64
    }
}

/// Supplies elevation data for tiles.
///
/// Implementations are shared with the loader worker; `None` means no data
/// for that tile, and the patch builds undisplaced.
pub trait ElevationSource: Send + Sync {
    /// Sample the skirted lattice for `id` at `grid` resolution.
    fn elevation_patch(&self, id: TileId, grid: u32) -> Option<ElevationPatch>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_count_includes_skirt() {
        assert_eq!(sample_stride(1), 4);
        assert_eq!(sample_count(1), 16);
        assert_eq!(sample_count(32), 35 * 35);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let err = ElevationPatch::new(4, vec![0; 10]).unwrap_err();
        match err {
            GeometryError::ElevationSize { grid, expected, got } => {
                assert_eq!(grid, 4);
                assert_eq!(expected, 49);
                assert_eq!(got, 10);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_node_indexing_covers_skirt() {
        let g = 2;
        let patch = ElevationPatch::from_fn(g, |i, j| (i * 10 + j) as i16);
        assert_eq!(patch.node(-1, -1), -11);
        assert_eq!(patch.node(0, 0), 0);
        assert_eq!(patch.node(3, 3), 33);
        assert_eq!(patch.raw().len(), sample_count(g));
    }

    #[test]
    fn test_interior_mean_ignores_skirt() {
        // interior all 100, skirt all -32000
        let g = 3;
        let patch = ElevationPatch::from_fn(g, |i, j| {
            let interior = (0..=i64::from(g)).contains(&i) && (0..=i64::from(g)).contains(&j);
            if interior { 100 } else { -32000 }
        });
        assert!((patch.interior_mean() - 100.0).abs() < 1e-9);
    }
}
