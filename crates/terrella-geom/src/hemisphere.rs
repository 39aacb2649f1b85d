//! Root-tile mesh construction. Each level-0 tile covers half the globe
//! in longitude and the full pole-to-pole latitude range.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::DVec3;

use crate::quadpatch::PatchGeometry;
use crate::{GeometryError, MAX_GRID_RESOLUTION, Obb, PatchVertex, TileId};

/// Texture resolution assumed for the half-texel uv inset.
const TEX_RES: f32 = 512.0;

/// Inputs for [`build_hemisphere`].
#[derive(Clone, Debug)]
pub struct HemisphereParams {
    /// Root tile to build; the column selects the longitude range.
    pub id: TileId,
    /// Rings and ring subdivisions.
    pub grid: u32,
    /// Planet radius, metres.
    pub radius: f64,
    /// Uniform elevation offset folded into the radius, metres.
    pub base_elevation: f64,
}

/// Build an uninterruptible root mesh. See [`build_hemisphere_cancelable`].
pub fn build_hemisphere(params: &HemisphereParams) -> Result<PatchGeometry, GeometryError> {
    build_hemisphere_cancelable(params, &AtomicBool::new(false))
}

/// Build a root-tile mesh: `grid` rings of `grid + 1` vertices between the
/// poles, capped by two pole vertices.
///
/// Root tiles carry no elevation displacement, no origin shift and no edge
/// backups; both uv sets are identical and inset half a texel so bilinear
/// sampling never wraps across the seam meridian.
///
/// # Panics
///
/// Panics if `params.id` is not a root tile.
pub fn build_hemisphere_cancelable(
    params: &HemisphereParams,
    cancel: &AtomicBool,
) -> Result<PatchGeometry, GeometryError> {
    assert_eq!(params.id.level, 0, "hemisphere mesh is only for root tiles");
    let g = params.grid;
    if g == 0 || g > MAX_GRID_RESOLUTION {
        return Err(GeometryError::InvalidResolution(g));
    }

    let gi = g as usize;
    let radius = params.radius + params.base_elevation;
    let ring_len = gi + 1;
    let grid_vertex_count = gi * ring_len + 2;
    // rings sit strictly between the poles; the caps are index fans
    let colat_step = PI / f64::from(g + 1);
    let lng_step = PI / f64::from(g);
    // eastern root rotates the longitude range from [-pi, 0] to [0, pi]
    let lng_offset = if params.id.col == 1 { 0.0 } else { -PI };

    let du = 0.5 / TEX_RES;
    let ua = (1.0 - 2.0 * du) / g as f32;

    let mut vertices = Vec::with_capacity(grid_vertex_count);
    for y in 0..gi {
        let colat = colat_step * (y + 1) as f64;
        let (scol, ccol) = colat.sin_cos();
        let tv = (colat / PI) as f32;
        for x in 0..ring_len {
            let lng = lng_step * x as f64 + lng_offset;
            let (slng, clng) = lng.sin_cos();
            let nml = DVec3::new(scol * clng, ccol, scol * slng);
            let uv = [ua * x as f32 + du, tv];
            vertices.push(PatchVertex {
                position: (nml * radius).as_vec3().to_array(),
                normal: nml.as_vec3().to_array(),
                uv,
                uv_detail: uv,
            });
        }
    }
    for (ny, tv) in [(1.0, 0.0), (-1.0, 1.0)] {
        vertices.push(PatchVertex {
            position: [0.0, (ny * radius) as f32, 0.0],
            normal: [0.0, ny as f32, 0.0],
            uv: [0.5, tv],
            uv_detail: [0.5, tv],
        });
    }

    if cancel.load(Ordering::Relaxed) {
        return Err(GeometryError::Cancelled);
    }

    let north = (gi * ring_len) as u16;
    let south = north + 1;
    let stride = ring_len as u16;
    let mut indices: Vec<u16> = Vec::with_capacity(6 * gi * gi);
    for y in 0..gi - 1 {
        let base0 = y as u16 * stride;
        let base1 = base0 + stride;
        for x in 0..g as u16 {
            indices.extend_from_slice(&[
                base0 + x,
                base0 + x + 1,
                base1 + x,
                base0 + x + 1,
                base1 + x + 1,
                base1 + x,
            ]);
        }
    }
    let last_ring = (gi - 1) as u16 * stride;
    for x in 0..g as u16 {
        indices.extend_from_slice(&[south, last_ring + x, last_ring + x + 1]);
    }
    for x in 0..g as u16 {
        indices.extend_from_slice(&[north, x + 1, x]);
    }

    if cancel.load(Ordering::Relaxed) {
        return Err(GeometryError::Cancelled);
    }

    let mut lo = DVec3::splat(f64::INFINITY);
    let mut hi = DVec3::splat(f64::NEG_INFINITY);
    for v in &vertices {
        let p = DVec3::new(v.position[0].into(), v.position[1].into(), v.position[2].into());
        lo = lo.min(p);
        hi = hi.max(p);
    }

    Ok(PatchGeometry {
        vertices,
        indices,
        grid: g,
        grid_vertex_count: grid_vertex_count as u32,
        bounds: Obb::axis_aligned(lo, hi),
        mean_elevation: params.base_elevation,
        origin_shift: DVec3::ZERO,
    })
}
