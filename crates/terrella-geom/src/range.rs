//! Texture-coordinate sub-rectangles for shared parent textures.

/// A sub-rectangle of a texture, in normalized coordinates.
///
/// Tiles without their own texture sample a quadrant of an ancestor's;
/// the quadrant chain composes by repeated halving. `v` grows southward
/// (patch meshes flip v so the northern edge maps to `v_min`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TexCoordRange {
    /// Western edge.
    pub u_min: f32,
    /// Eastern edge.
    pub u_max: f32,
    /// Northern edge.
    pub v_min: f32,
    /// Southern edge.
    pub v_max: f32,
}

impl TexCoordRange {
    /// The whole texture.
    pub const FULL: TexCoordRange = TexCoordRange {
        u_min: 0.0,
        u_max: 1.0,
        v_min: 0.0,
        v_max: 1.0,
    };

    /// The half-sized quadrant a child tile samples from this range.
    ///
    /// `east`/`south` are the child's quadrant parities within its parent.
    #[must_use]
    pub fn quadrant(&self, east: bool, south: bool) -> TexCoordRange {
        let u_mid = 0.5 * (self.u_min + self.u_max);
        let v_mid = 0.5 * (self.v_min + self.v_max);
        TexCoordRange {
            u_min: if east { u_mid } else { self.u_min },
            u_max: if east { self.u_max } else { u_mid },
            v_min: if south { v_mid } else { self.v_min },
            v_max: if south { self.v_max } else { v_mid },
        }
    }

    /// Map normalized patch coordinates into this range.
    #[must_use]
    pub fn map(&self, u: f32, v: f32) -> (f32, f32) {
        (
            u * (self.u_max - self.u_min) + self.u_min,
            v * (self.v_max - self.v_min) + self.v_min,
        )
    }
}

impl Default for TexCoordRange {
    fn default() -> Self {
        Self::FULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadrants_partition_full_range() {
        let nw = TexCoordRange::FULL.quadrant(false, false);
        let se = TexCoordRange::FULL.quadrant(true, true);
        assert_eq!(nw, TexCoordRange { u_min: 0.0, u_max: 0.5, v_min: 0.0, v_max: 0.5 });
        assert_eq!(se, TexCoordRange { u_min: 0.5, u_max: 1.0, v_min: 0.5, v_max: 1.0 });
    }

    #[test]
    fn test_quadrant_composition_quarters() {
        // two eastern/southern halvings reach the last quarter on both axes
        let r = TexCoordRange::FULL.quadrant(true, true).quadrant(true, true);
        assert!((r.u_min - 0.75).abs() < 1e-6);
        assert!((r.u_max - 1.0).abs() < 1e-6);
        assert!((r.v_min - 0.75).abs() < 1e-6);
        assert!((r.v_max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_map_into_subrange() {
        let r = TexCoordRange { u_min: 0.25, u_max: 0.5, v_min: 0.5, v_max: 1.0 };
        let (u, v) = r.map(0.0, 0.0);
        assert!((u - 0.25).abs() < 1e-6 && (v - 0.5).abs() < 1e-6);
        let (u, v) = r.map(1.0, 0.5);
        assert!((u - 0.5).abs() < 1e-6 && (v - 0.75).abs() < 1e-6);
    }
}
