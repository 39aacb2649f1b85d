//! wgpu vertex layout for [`PatchVertex`].

use terrella_geom::PatchVertex;

/// Vertex buffer layout matching [`PatchVertex`]: position, normal,
/// primary uv, detail uv.
#[must_use]
pub fn patch_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    use wgpu::{VertexAttribute, VertexFormat};

    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<PatchVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: VertexFormat::Float32x3,
            },
            VertexAttribute {
                offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                shader_location: 1,
                format: VertexFormat::Float32x3,
            },
            VertexAttribute {
                offset: (std::mem::size_of::<[f32; 3]>() * 2) as wgpu::BufferAddress,
                shader_location: 2,
                format: VertexFormat::Float32x2,
            },
            VertexAttribute {
                offset: (std::mem::size_of::<[f32; 3]>() * 2 + std::mem::size_of::<[f32; 2]>())
                    as wgpu::BufferAddress,
                shader_location: 3,
                format: VertexFormat::Float32x2,
            },
        ],
    }
}
