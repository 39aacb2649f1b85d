//! Procedural elevation sources for the streaming surface.
//!
//! Implements [`terrella_geom::ElevationSource`] over seamless sphere-space
//! noise, quantized to the `i16` metre samples the mesh builders expect.

mod fbm;

pub use fbm::{ConstantElevation, FbmElevation, FbmParams};
