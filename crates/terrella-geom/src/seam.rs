//! Edge restitching against coarser neighbors.
//!
//! Quad patches keep pristine copies of their two adaptable edges (the
//! ones not shared with quadtree siblings). When the neighbor across an
//! edge renders at a coarser level, the shared edge is rewritten so this
//! tile's edge vertices lie on the neighbor's coarser polyline, closing
//! the crack the resolution mismatch would open.

use glam::Vec3;

use crate::quadpatch::PatchGeometry;
use crate::{PatchVertex, TileId};

/// One of the two adaptable edges of a quad patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchEdge {
    /// The west or east edge, whichever faces away from the sibling.
    Longitude,
    /// The south or north edge, whichever faces away from the sibling.
    Latitude,
}

/// Rewrite an adaptable edge for a neighbor `coarser_by` levels coarser.
///
/// Anchor vertices every `2^coarser_by` steps take their pristine backup
/// values; vertices between anchors are interpolated from the two
/// surrounding anchors (normals renormalized). `coarser_by = 0` restores
/// the pristine edge. The run length clamps to the edge, so an oversized
/// `coarser_by` collapses the edge to a single straight run and a grid
/// not divisible by the step ends on a short run.
///
/// Returns false without touching the mesh when it carries no edge
/// backups (root meshes).
pub fn stitch_edge(
    geom: &mut PatchGeometry,
    id: TileId,
    edge: PatchEdge,
    coarser_by: u32,
) -> bool {
    let g = geom.grid as usize;
    let n = geom.grid_vertex_count as usize;
    if geom.vertices.len() < n + 2 * (g + 1) {
        return false;
    }

    let stride = g + 1;
    let (first, lattice_step, backup_start) = match edge {
        PatchEdge::Longitude => {
            let col = if id.is_east_child() { g } else { 0 };
            (col, stride, n)
        }
        PatchEdge::Latitude => {
            let row = if id.is_south_child() { 0 } else { g };
            (row * stride, 1, n + stride)
        }
    };
    let lattice = |k: usize| first + k * lattice_step;

    let step = match 1usize.checked_shl(coarser_by) {
        Some(s) => s.min(g),
        None => g,
    };

    let mut a = 0;
    while a < g {
        let b = (a + step).min(g);
        let va = geom.vertices[backup_start + a];
        let vb = geom.vertices[backup_start + b];
        geom.vertices[lattice(a)] = va;
        for k in a + 1..b {
            let t = (k - a) as f32 / (b - a) as f32;
            geom.vertices[lattice(k)] = lerp_vertex(&va, &vb, t);
        }
        a = b;
    }
    geom.vertices[lattice(g)] = geom.vertices[backup_start + g];
    true
}

/// Restore an adaptable edge to its as-built vertices.
pub fn restore_edge(geom: &mut PatchGeometry, id: TileId, edge: PatchEdge) -> bool {
    stitch_edge(geom, id, edge, 0)
}

fn lerp_vertex(a: &PatchVertex, b: &PatchVertex, t: f32) -> PatchVertex {
    let position = Vec3::from_array(a.position).lerp(Vec3::from_array(b.position), t);
    let normal = Vec3::from_array(a.normal)
        .lerp(Vec3::from_array(b.normal), t)
        .normalize_or_zero();
    let lerp2 = |a: [f32; 2], b: [f32; 2]| [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t];
    PatchVertex {
        position: position.to_array(),
        normal: normal.to_array(),
        uv: lerp2(a.uv, b.uv),
        uv_detail: lerp2(a.uv_detail, b.uv_detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hemisphere::{HemisphereParams, build_hemisphere};
    use crate::quadpatch::{QuadPatchParams, build_quadpatch};
    use crate::range::TexCoordRange;

    // row 1 and col 3 are odd, so the adaptable edges are east and south
    const ID: TileId = TileId { level: 2, row: 1, col: 3 };

    fn patch(grid: u32) -> PatchGeometry {
        build_quadpatch(
            &QuadPatchParams {
                id: ID,
                grid,
                radius: 1000.0,
                base_elevation: 0.0,
                tex_range: TexCoordRange::FULL,
                shift_origin: false,
            },
            None,
        )
        .unwrap()
    }

    fn expect_lerp(a: &PatchVertex, b: &PatchVertex, t: f32, got: &PatchVertex) {
        let want = lerp_vertex(a, b, t);
        for k in 0..3 {
            assert!((got.position[k] - want.position[k]).abs() < 1e-6);
            assert!((got.normal[k] - want.normal[k]).abs() < 1e-6);
        }
        assert!((got.uv[0] - want.uv[0]).abs() < 1e-6);
        assert!((got.uv[1] - want.uv[1]).abs() < 1e-6);
    }

    #[test]
    fn test_restore_recovers_scribbled_edge() {
        let pristine = patch(4);
        let mut geom = pristine.clone();
        for i in 0..=4 {
            geom.vertices[i * 5 + 4].position = [9e9, 9e9, 9e9];
        }
        assert!(restore_edge(&mut geom, ID, PatchEdge::Longitude));
        for (a, b) in geom.vertices.iter().zip(&pristine.vertices) {
            assert_eq!(a.position, b.position);
        }
    }

    #[test]
    fn test_stitch_level_zero_difference_is_identity() {
        let pristine = patch(4);
        let mut geom = pristine.clone();
        assert!(stitch_edge(&mut geom, ID, PatchEdge::Latitude, 0));
        for (a, b) in geom.vertices.iter().zip(&pristine.vertices) {
            assert_eq!(a.position, b.position);
            assert_eq!(a.normal, b.normal);
        }
    }

    #[test]
    fn test_stitch_one_level_interpolates_odd_vertices() {
        let mut geom = patch(4);
        let n = geom.grid_vertex_count as usize;
        let backups: Vec<PatchVertex> = geom.vertices[n..n + 5].to_vec();
        assert!(stitch_edge(&mut geom, ID, PatchEdge::Longitude, 1));

        // east edge, lattice index i*5 + 4
        for anchor in [0, 2, 4] {
            assert_eq!(geom.vertices[anchor * 5 + 4].position, backups[anchor].position);
        }
        expect_lerp(&backups[0], &backups[2], 0.5, &geom.vertices[5 + 4]);
        expect_lerp(&backups[2], &backups[4], 0.5, &geom.vertices[3 * 5 + 4]);
        let n1 = Vec3::from_array(geom.vertices[5 + 4].normal);
        assert!((n1.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_short_last_run_on_non_divisible_grid() {
        let mut geom = patch(6);
        let n = geom.grid_vertex_count as usize;
        let backups: Vec<PatchVertex> = geom.vertices[n + 7..n + 14].to_vec();
        assert!(stitch_edge(&mut geom, ID, PatchEdge::Latitude, 2));

        // south edge of a 6-cell grid with step 4: runs [0,4] and [4,6]
        for anchor in [0, 4, 6] {
            assert_eq!(geom.vertices[anchor].position, backups[anchor].position);
        }
        expect_lerp(&backups[0], &backups[4], 0.25, &geom.vertices[1]);
        expect_lerp(&backups[0], &backups[4], 0.75, &geom.vertices[3]);
        expect_lerp(&backups[4], &backups[6], 0.5, &geom.vertices[5]);
    }

    #[test]
    fn test_oversized_difference_clamps_to_one_run() {
        let mut geom = patch(4);
        let n = geom.grid_vertex_count as usize;
        let backups: Vec<PatchVertex> = geom.vertices[n..n + 5].to_vec();
        assert!(stitch_edge(&mut geom, ID, PatchEdge::Longitude, 30));
        expect_lerp(&backups[0], &backups[4], 0.5, &geom.vertices[2 * 5 + 4]);
    }

    #[test]
    fn test_interior_vertices_untouched() {
        let pristine = patch(4);
        let mut geom = pristine.clone();
        stitch_edge(&mut geom, ID, PatchEdge::Longitude, 1);
        stitch_edge(&mut geom, ID, PatchEdge::Latitude, 1);
        for i in 1..4usize {
            for j in 1..4usize {
                assert_eq!(
                    geom.vertices[i * 5 + j].position,
                    pristine.vertices[i * 5 + j].position
                );
            }
        }
    }

    #[test]
    fn test_root_mesh_has_no_adaptable_edges() {
        let mut geom = build_hemisphere(&HemisphereParams {
            id: TileId::new(0, 0, 0),
            grid: 8,
            radius: 1000.0,
            base_elevation: 0.0,
        })
        .unwrap();
        let before = geom.vertices.clone();
        assert!(!stitch_edge(&mut geom, TileId::new(0, 0, 0), PatchEdge::Longitude, 1));
        for (a, b) in geom.vertices.iter().zip(&before) {
            assert_eq!(a.position, b.position);
        }
    }
}
