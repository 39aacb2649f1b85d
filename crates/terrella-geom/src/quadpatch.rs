//! Curved quadrilateral patch construction for levels ≥ 1.

use std::f64::consts::{PI, TAU};
use std::sync::atomic::{AtomicBool, Ordering};

use glam::DVec3;

use crate::elevation::{ElevationPatch, sample_count};
use crate::{GeometryError, MAX_GRID_RESOLUTION, Obb, PatchVertex, TexCoordRange, TileId};

/// Multiplier applied to the secondary uv set for detail texturing.
pub const DETAIL_UV_SCALE: f32 = 4.0;

/// Inputs for [`build_quadpatch`].
#[derive(Clone, Debug)]
pub struct QuadPatchParams {
    /// Tile to build. Level 0 uses the hemisphere builder instead.
    pub id: TileId,
    /// Cells per patch edge.
    pub grid: u32,
    /// Planet radius, metres.
    pub radius: f64,
    /// Uniform elevation offset applied to every vertex, metres.
    pub base_elevation: f64,
    /// Subrange of the bound texture the primary uv set maps into.
    pub tex_range: TexCoordRange,
    /// Translate vertices to an edge-local origin for f32 precision.
    pub shift_origin: bool,
}

/// A built patch mesh plus the metadata the streaming layer needs.
///
/// The vertex buffer has three regions:
/// `[0, grid_vertex_count)` is the addressable `(grid+1)²` lattice (the
/// only part indices reference or uploads send), followed by `grid+1`
/// pristine copies of the adaptable longitude edge, then `grid+1` copies
/// of the adaptable latitude edge. The copies are the restore source for
/// seam restitching.
#[derive(Clone, Debug)]
pub struct PatchGeometry {
    /// Lattice vertices followed by the two edge-backup runs.
    pub vertices: Vec<PatchVertex>,
    /// Triangle list into the addressable region.
    pub indices: Vec<u16>,
    /// Cells per edge this mesh was built at.
    pub grid: u32,
    /// Number of vertices addressed by `indices`.
    pub grid_vertex_count: u32,
    /// Bounding volume, mesh-local frame.
    pub bounds: Obb,
    /// Mean surface elevation over the patch, metres (base included).
    pub mean_elevation: f64,
    /// Translation applied to vertex positions (mesh-local frame).
    pub origin_shift: DVec3,
}

impl PatchGeometry {
    /// The vertices referenced by `indices` (edge backups excluded).
    #[must_use]
    pub fn addressable_vertices(&self) -> &[PatchVertex] {
        &self.vertices[..self.grid_vertex_count as usize]
    }

    /// Number of triangles.
    #[must_use]
    pub fn triangle_count(&self) -> u32 {
        self.indices.len() as u32 / 3
    }
}

/// Build an uninterruptible quad patch. See [`build_quadpatch_cancelable`].
pub fn build_quadpatch(
    params: &QuadPatchParams,
    elevation: Option<&ElevationPatch>,
) -> Result<PatchGeometry, GeometryError> {
    build_quadpatch_cancelable(params, elevation, &AtomicBool::new(false))
}

/// Build a curved quad patch over the tile's lat/lon bounds.
///
/// Vertices are generated in a longitude-local frame (western edge at
/// longitude 0) south to north, west to east, displaced radially by the
/// elevation samples. With elevation present, per-vertex normals come from
/// central differences over the skirted lattice and each cell's diagonal
/// follows the smaller second-difference error. `cancel` is observed after
/// vertex and after index generation; a set flag aborts with
/// [`GeometryError::Cancelled`].
pub fn build_quadpatch_cancelable(
    params: &QuadPatchParams,
    elevation: Option<&ElevationPatch>,
    cancel: &AtomicBool,
) -> Result<PatchGeometry, GeometryError> {
    let g = params.grid;
    if g == 0 || g > MAX_GRID_RESOLUTION {
        return Err(GeometryError::InvalidResolution(g));
    }
    if let Some(patch) = elevation {
        if patch.grid() != g {
            return Err(GeometryError::ElevationSize {
                grid: g,
                expected: sample_count(g),
                got: patch.raw().len(),
            });
        }
    }

    let id = params.id;
    let bounds = id.bounds();
    let radius = params.radius;
    let gi = g as usize;
    let gf = f64::from(g);
    // local longitude frame: this tile spans 0..lng_span, rotated into
    // place by `TileId::local_to_planet`
    let lng_span = bounds.lng_span();

    let (slat0, clat0) = bounds.lat_min.sin_cos();
    let (slat1, clat1) = bounds.lat_max.sin_cos();
    let (slng1, clng1) = lng_span.sin_cos();

    // bounding-box frame: x along the southern-edge parallel, y toward the
    // midpoint of the northern edge, origin at the southern edge midpoint
    let ex = DVec3::new(clng1 - 1.0, 0.0, slng1).normalize();
    let ey = DVec3::new(
        0.5 * (1.0 + clng1) * (clat1 - clat0),
        slat1 - slat0,
        0.5 * slng1 * (clat1 - clat0),
    )
    .normalize();
    let ez = ey.cross(ex);
    let mut box_origin = DVec3::new(
        radius * clat0 * 0.5 * (clng1 + 1.0),
        radius * slat0,
        radius * clat0 * 0.5 * slng1,
    );

    // local origin on the equator-facing edge arc, for f32 precision
    let origin_shift = if params.shift_origin {
        let (s, c) = if id.is_north() {
            (slat0, clat0)
        } else {
            (slat1, clat1)
        };
        DVec3::new(c * radius, s * radius, 0.0)
    } else {
        DVec3::ZERO
    };

    let grid_vertex_count = (gi + 1) * (gi + 1);
    let mut vertices = Vec::with_capacity(grid_vertex_count + 2 * (gi + 1));
    let mut lo = DVec3::ZERO;
    let mut hi = DVec3::ZERO;

    for i in 0..=gi {
        let lat = bounds.lat_min + bounds.lat_span() * i as f64 / gf;
        let (slat, clat) = lat.sin_cos();
        for j in 0..=gi {
            let lng = lng_span * j as f64 / gf;
            let (slng, clng) = lng.sin_cos();

            let mut eradius = radius + params.base_elevation;
            if let Some(patch) = elevation {
                eradius += f64::from(patch.node(i as i64, j as i64));
            }
            let nml = DVec3::new(clat * clng, slat, clat * slng);
            let pos = nml * eradius;

            let rel = pos - box_origin;
            let tp = DVec3::new(ex.dot(rel), ey.dot(rel), ez.dot(rel));
            if i == 0 && j == 0 {
                lo = tp;
                hi = tp;
            } else {
                lo = lo.min(tp);
                hi = hi.max(tp);
            }

            let u = j as f32 / g as f32;
            let v = (g - i as u32) as f32 / g as f32; // northern edge maps to v_min
            let (tu, tv) = params.tex_range.map(u, v);
            vertices.push(PatchVertex {
                position: (pos - origin_shift).as_vec3().to_array(),
                normal: nml.as_vec3().to_array(),
                uv: [tu, tv],
                uv_detail: [u * DETAIL_UV_SCALE, v * DETAIL_UV_SCALE],
            });
        }
    }

    if cancel.load(Ordering::Relaxed) {
        return Err(GeometryError::Cancelled);
    }

    let mut indices: Vec<u16> = Vec::with_capacity(6 * gi * gi);
    let stride = (gi + 1) as u16;
    if let Some(patch) = elevation {
        // orient each cell's diagonal along the smaller second-difference
        // error so ridges and valleys keep their crease
        let e = |r: i64, c: i64| i32::from(patch.node(r, c));
        for i in 0..gi {
            let base0 = i as u16 * stride;
            let base1 = base0 + stride;
            for j in 0..gi {
                let (ii, jj) = (i as i64, j as i64);
                let err_anti = (2 * e(ii, jj + 1) - e(ii + 1, jj) - e(ii - 1, jj + 2)).abs()
                    + (2 * e(ii + 1, jj) - e(ii, jj + 1) - e(ii + 2, jj - 1)).abs();
                let err_main = (2 * e(ii, jj) - e(ii + 1, jj + 1) - e(ii - 1, jj - 1)).abs()
                    + (2 * e(ii + 1, jj + 1) - e(ii, jj) - e(ii + 2, jj + 2)).abs();
                let j16 = j as u16;
                if err_anti < err_main {
                    indices.extend_from_slice(&[
                        base0 + j16,
                        base1 + j16,
                        base0 + j16 + 1,
                        base0 + j16 + 1,
                        base1 + j16,
                        base1 + j16 + 1,
                    ]);
                } else {
                    indices.extend_from_slice(&[
                        base0 + j16,
                        base1 + j16 + 1,
                        base0 + j16 + 1,
                        base1 + j16 + 1,
                        base0 + j16,
                        base1 + j16,
                    ]);
                }
            }
        }
    } else {
        for i in 0..gi {
            let base0 = i as u16 * stride;
            let base1 = base0 + stride;
            for j in 0..gi {
                let j16 = j as u16;
                indices.extend_from_slice(&[
                    base0 + j16,
                    base1 + j16,
                    base0 + j16 + 1,
                    base1 + j16 + 1,
                    base0 + j16 + 1,
                    base1 + j16,
                ]);
            }
        }
    }

    if cancel.load(Ordering::Relaxed) {
        return Err(GeometryError::Cancelled);
    }

    // elevation gradients replace the radial normals
    if let Some(patch) = elevation {
        let rows = f64::from(TileId::rows(id.level));
        let cols = f64::from(TileId::cols(id.level));
        let dy = radius * PI / (rows * gf);
        let e = |r: i64, c: i64| f64::from(patch.node(r, c));
        let mut n = 0;
        for i in 0..=gi {
            let lat = bounds.lat_min + bounds.lat_span() * i as f64 / gf;
            let (slat, clat) = lat.sin_cos();
            let dz = radius * TAU * clat / (cols * gf);
            for j in 0..=gi {
                let lng = lng_span * j as f64 / gf;
                let (slng, clng) = lng.sin_cos();
                let (ii, jj) = (i as i64, j as i64);
                let nml = DVec3::new(
                    2.0 * dy * dz,
                    dz * (e(ii - 1, jj) - e(ii + 1, jj)),
                    dy * (e(ii, jj - 1) - e(ii, jj + 1)),
                )
                .normalize();
                // rotate into place: latitude, then longitude
                let nx1 = nml.x * clat - nml.y * slat;
                let ny1 = nml.x * slat + nml.y * clat;
                let nz1 = nml.z;
                vertices[n].normal = [
                    (nx1 * clng - nz1 * slng) as f32,
                    ny1 as f32,
                    (nx1 * slng + nz1 * clng) as f32,
                ];
                n += 1;
            }
        }
    }

    // pristine copies of the adaptable edges, the restore source for
    // seam restitching
    let lng_col = if id.is_east_child() { gi } else { 0 };
    for i in 0..=gi {
        let v = vertices[i * (gi + 1) + lng_col];
        vertices.push(v);
    }
    let lat_row = if id.is_south_child() { 0 } else { gi };
    for j in 0..=gi {
        let v = vertices[lat_row * (gi + 1) + j];
        vertices.push(v);
    }

    box_origin -= origin_shift;
    let mean_elevation =
        params.base_elevation + elevation.map_or(0.0, ElevationPatch::interior_mean);

    Ok(PatchGeometry {
        vertices,
        indices,
        grid: g,
        grid_vertex_count: grid_vertex_count as u32,
        bounds: Obb::from_frame(ex, ey, ez, box_origin, lo, hi),
        mean_elevation,
        origin_shift,
    })
}
