//! Planetary tile lattice and patch-mesh construction.
//!
//! Pure geometry: tile addressing on the lat/lon quadtree lattice, curved
//! quad-patch and root-hemisphere mesh builders with elevation displacement,
//! oriented bounding boxes, and edge restitching across LOD boundaries.
//! No GPU types, no threads; everything here is deterministic and testable
//! on its own.

mod elevation;
mod error;
mod hemisphere;
mod obb;
mod quadpatch;
mod range;
mod seam;
mod tile_id;
mod vertex;

pub use elevation::{ElevationPatch, ElevationSource, sample_count, sample_stride};
pub use error::GeometryError;
pub use hemisphere::{HemisphereParams, build_hemisphere, build_hemisphere_cancelable};
pub use obb::Obb;
pub use quadpatch::{
    DETAIL_UV_SCALE, PatchGeometry, QuadPatchParams, build_quadpatch, build_quadpatch_cancelable,
};
pub use range::TexCoordRange;
pub use seam::{PatchEdge, restore_edge, stitch_edge};
pub use tile_id::{LatLonBounds, MAX_LEVEL, TileId};
pub use vertex::PatchVertex;

/// Largest supported mesh grid resolution.
///
/// Bounded so the addressable `(grid+1)²` lattice vertices stay within u16
/// index range.
pub const MAX_GRID_RESOLUTION: u32 = 254;
