//! GPU-side storage for streamed tiles: headless device setup, pooled
//! vertex/index buffers, uploaded meshes, and surface textures.

pub mod error;
pub mod gpu;
pub mod mesh;
pub mod pool;
pub mod texture;
pub mod vertex_layout;

pub use error::RenderError;
pub use gpu::{TileGpu, init_tile_gpu_blocking};
pub use mesh::GpuMesh;
pub use pool::{BufferKind, BufferPool, PoolStats, PooledBuffer};
pub use texture::TileTexture;
pub use vertex_layout::patch_vertex_layout;
