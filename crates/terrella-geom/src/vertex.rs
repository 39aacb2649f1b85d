//! GPU-uploadable patch vertex.

/// A single patch-mesh vertex, 40 bytes.
///
/// Layout:
///   - `[0..12]`  position `[f32; 3]` — mesh-local frame (longitude 0 at
///     the tile's western edge, minus any origin shift)
///   - `[12..24]` normal `[f32; 3]` — unit, mesh-local frame
///   - `[24..32]` uv `[f32; 2]` — mapped into the tile's texture subrange
///   - `[32..40]` uv_detail `[f32; 2]` — unmapped, scaled for detail tiling
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PatchVertex {
    /// Position in the mesh-local frame.
    pub position: [f32; 3],
    /// Unit surface normal in the mesh-local frame.
    pub normal: [f32; 3],
    /// Primary texture coordinates, mapped into the bound subrange.
    pub uv: [f32; 2],
    /// Secondary coordinates for tiling detail textures.
    pub uv_detail: [f32; 2],
}

static_assertions::assert_eq_size!(PatchVertex, [u8; 40]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_pod_castable() {
        let v = PatchVertex {
            position: [1.0, 2.0, 3.0],
            normal: [0.0, 1.0, 0.0],
            uv: [0.5, 0.25],
            uv_detail: [2.0, 1.0],
        };
        let bytes: &[u8] = bytemuck::bytes_of(&v);
        assert_eq!(bytes.len(), 40);
        let back: &PatchVertex = bytemuck::from_bytes(bytes);
        assert_eq!(*back, v);
    }
}
