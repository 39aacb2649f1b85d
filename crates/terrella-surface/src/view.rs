//! Per-frame view parameters, resolved into the planet's local frame once
//! so the traversal never touches world-space numbers.

use glam::{DMat4, DVec3};

/// Camera and lighting state for one traversal pass.
///
/// Everything is expressed in the planet frame: `camera_dir` is the unit
/// direction from the planet centre to the camera, `camera_distance` the
/// camera's distance from the centre in planet radii. Keeping the distance
/// in radii makes the refinement maths scale-free.
#[derive(Clone, Copy, Debug)]
pub struct ViewParams {
    /// Planet-local to clip space, for visibility tests.
    pub planet_to_clip: DMat4,
    /// Unit direction from the planet centre to the camera.
    pub camera_dir: DVec3,
    /// Camera distance from the planet centre, in planet radii.
    pub camera_distance: f64,
    /// Unit direction toward the sun, planet frame.
    pub sun_dir: DVec3,
    /// Whether the renderer applies distance fog this frame.
    pub fog: bool,
    /// Whether an atmospheric tint is layered over the surface.
    pub tint: bool,
}

impl ViewParams {
    /// Resolve view parameters from a camera position in planet-local
    /// metres. A camera exactly at the centre is treated as hovering over
    /// longitude 0 on the equator rather than producing NaNs.
    #[must_use]
    pub fn from_camera(
        planet_to_clip: DMat4,
        camera_pos: DVec3,
        sun_dir: DVec3,
        radius: f64,
    ) -> Self {
        let distance = camera_pos.length();
        let camera_dir = if distance > 0.0 {
            camera_pos / distance
        } else {
            DVec3::X
        };
        Self {
            planet_to_clip,
            camera_dir,
            camera_distance: distance / radius,
            sun_dir: sun_dir.normalize_or(DVec3::X),
            fog: false,
            tint: false,
        }
    }

    /// Camera position in planet-local metres.
    #[must_use]
    pub fn camera_pos(&self, radius: f64) -> DVec3 {
        self.camera_dir * (self.camera_distance * radius)
    }
}
