//! Oriented bounding boxes for tile visibility tests.

use glam::{DMat4, DVec3, DVec4};

/// An oriented bounding box, stored as its eight corners in the mesh-local
/// frame.
///
/// Built in a tile-centre-aligned tangent frame so it stays tight for
/// patches far from the sphere's poles, then expanded back to corners.
/// Corner order: x fastest, then y, then z (min before max on each axis).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Obb {
    /// The eight corners.
    pub corners: [DVec3; 8],
}

impl Obb {
    /// Build from a frame (`ex`, `ey`, `ez` axes through `origin`) and the
    /// min/max extents accumulated in that frame.
    #[must_use]
    pub fn from_frame(
        ex: DVec3,
        ey: DVec3,
        ez: DVec3,
        origin: DVec3,
        lo: DVec3,
        hi: DVec3,
    ) -> Self {
        let corner = |x: f64, y: f64, z: f64| ex * x + ey * y + ez * z + origin;
        Obb {
            corners: [
                corner(lo.x, lo.y, lo.z),
                corner(hi.x, lo.y, lo.z),
                corner(lo.x, hi.y, lo.z),
                corner(hi.x, hi.y, lo.z),
                corner(lo.x, lo.y, hi.z),
                corner(hi.x, lo.y, hi.z),
                corner(lo.x, hi.y, hi.z),
                corner(hi.x, hi.y, hi.z),
            ],
        }
    }

    /// Axis-aligned box from min/max corners.
    #[must_use]
    pub fn axis_aligned(lo: DVec3, hi: DVec3) -> Self {
        Self::from_frame(DVec3::X, DVec3::Y, DVec3::Z, DVec3::ZERO, lo, hi)
    }

    /// Conservative visibility: true if any corner satisfies all six clip
    /// half-spaces under `local_to_clip` (wgpu depth range, `0 ≤ z ≤ w`).
    ///
    /// Over-inclusive for boxes straddling the frustum edge; never misses a
    /// box containing a visible corner.
    #[must_use]
    pub fn any_corner_in_clip(&self, local_to_clip: &DMat4) -> bool {
        self.corners.iter().any(|c| {
            let v: DVec4 = *local_to_clip * c.extend(1.0);
            v.x >= -v.w
                && v.x <= v.w
                && v.y >= -v.w
                && v.y <= v.w
                && v.z >= 0.0
                && v.z <= v.w
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Obb {
        Obb::axis_aligned(DVec3::splat(-0.5), DVec3::splat(0.5))
    }

    #[test]
    fn test_frame_reconstructs_corners() {
        // rotate the frame 90° about y: ex→-z, ez→x
        let obb = Obb::from_frame(
            -DVec3::Z,
            DVec3::Y,
            DVec3::X,
            DVec3::new(10.0, 0.0, 0.0),
            DVec3::ZERO,
            DVec3::new(1.0, 2.0, 3.0),
        );
        assert!((obb.corners[0] - DVec3::new(10.0, 0.0, 0.0)).length() < 1e-12);
        assert!((obb.corners[7] - DVec3::new(13.0, 2.0, -1.0)).length() < 1e-12);
    }

    #[test]
    fn test_box_ahead_of_camera_visible() {
        let proj = DMat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let view = DMat4::from_translation(DVec3::new(0.0, 0.0, -5.0));
        assert!(unit_box().any_corner_in_clip(&(proj * view)));
    }

    #[test]
    fn test_box_behind_camera_culled() {
        let proj = DMat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let view = DMat4::from_translation(DVec3::new(0.0, 0.0, 5.0));
        assert!(!unit_box().any_corner_in_clip(&(proj * view)));
    }

    #[test]
    fn test_box_far_off_axis_culled() {
        let proj = DMat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let view = DMat4::from_translation(DVec3::new(50.0, 0.0, -5.0));
        assert!(!unit_box().any_corner_in_clip(&(proj * view)));
    }

    #[test]
    fn test_straddling_box_kept() {
        // half in front, half behind the near plane: a corner is inside
        let proj = DMat4::perspective_rh(1.0, 1.0, 0.5, 100.0);
        let view = DMat4::from_translation(DVec3::new(0.0, 0.0, -0.7));
        assert!(unit_box().any_corner_in_clip(&(proj * view)));
    }
}
