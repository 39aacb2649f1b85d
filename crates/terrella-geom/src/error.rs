//! Error type for mesh construction.

use thiserror::Error;

/// Failures of the patch-mesh builders.
///
/// The first two variants are contract violations checked at the call
/// boundary; [`GeometryError::Cancelled`] signals an interrupted build and
/// is not a failure of the tile itself.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// Grid resolution outside `1..=MAX_GRID_RESOLUTION`.
    #[error("grid resolution {0} out of range (1..={max})", max = crate::MAX_GRID_RESOLUTION)]
    InvalidResolution(u32),

    /// Elevation buffer does not match the `(grid+3)²` skirted lattice.
    #[error("elevation buffer has {got} samples, expected {expected} for grid {grid}")]
    ElevationSize {
        /// Grid resolution the buffer was checked against.
        grid: u32,
        /// Required sample count, `(grid+3)²`.
        expected: usize,
        /// Actual sample count supplied.
        got: usize,
    },

    /// Build interrupted at a checkpoint (loader shutdown).
    #[error("mesh build interrupted")]
    Cancelled,
}
