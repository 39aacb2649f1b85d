//! GPU-resident tile mesh: pooled buffer handles plus draw metadata.

use terrella_geom::PatchGeometry;

use crate::error::RenderError;
use crate::gpu::TileGpu;
use crate::pool::{BufferPool, PooledBuffer};

/// A tile mesh uploaded to the GPU.
///
/// Buffers are leased from the [`BufferPool`] and must be handed back via
/// [`GpuMesh::into_buffers`] when the tile is pruned, so churned tiles
/// recycle storage instead of thrashing the allocator.
pub struct GpuMesh {
    vertex_buffer: PooledBuffer,
    index_buffer: PooledBuffer,
    /// Number of addressable vertices uploaded.
    pub vertex_count: u32,
    /// Number of indices to draw.
    pub index_count: u32,
}

impl GpuMesh {
    /// Lease buffers for `geometry` and upload its addressable vertices
    /// and indices.
    ///
    /// Edge-backup vertices never reach the GPU; they only feed CPU-side
    /// restitching, which re-uploads through [`GpuMesh::rewrite_vertices`].
    pub fn upload(
        gpu: &TileGpu,
        pool: &mut BufferPool,
        geometry: &PatchGeometry,
    ) -> Result<Self, RenderError> {
        let vertex_buffer = pool.lease_vertex_buffer(gpu, geometry.grid_vertex_count)?;
        let index_buffer = match pool.lease_index_buffer(gpu, geometry.triangle_count()) {
            Ok(buffer) => buffer,
            Err(err) => {
                pool.return_buffer(vertex_buffer);
                return Err(err);
            }
        };

        gpu.write_vertices(&vertex_buffer.buffer, geometry.addressable_vertices());
        gpu.write_indices(&index_buffer.buffer, &geometry.indices);

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: geometry.grid_vertex_count,
            index_count: geometry.indices.len() as u32,
        })
    }

    /// Re-upload the addressable vertices after CPU-side edge restitching.
    /// Indices and buffer leases are untouched.
    pub fn rewrite_vertices(&self, gpu: &TileGpu, geometry: &PatchGeometry) {
        gpu.write_vertices(&self.vertex_buffer.buffer, geometry.addressable_vertices());
    }

    /// Bind this mesh's buffers to a render pass.
    pub fn bind<'a>(&'a self, render_pass: &mut wgpu::RenderPass<'a>) {
        render_pass.set_vertex_buffer(0, self.vertex_buffer.buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.buffer.slice(..), wgpu::IndexFormat::Uint16);
    }

    /// Issue an indexed draw call for this mesh.
    pub fn draw(&self, render_pass: &mut wgpu::RenderPass) {
        render_pass.draw_indexed(0..self.index_count, 0, 0..1);
    }

    /// Tear the mesh down into its pooled buffers for return.
    #[must_use]
    pub fn into_buffers(self) -> (PooledBuffer, PooledBuffer) {
        (self.vertex_buffer, self.index_buffer)
    }
}
