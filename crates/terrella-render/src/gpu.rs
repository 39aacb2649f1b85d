//! Headless GPU device initialization and raw buffer operations.
//!
//! [`TileGpu`] owns the wgpu device and queue used for tile geometry.
//! Presentation (surface, swapchain) belongs to the embedding renderer;
//! tile streaming only needs buffer and texture storage plus queued
//! writes, so the device is requested without a compatible surface.

use bytemuck::Pod;

use crate::error::RenderError;

/// Bytes per index entry (u16 indices throughout).
const INDEX_SIZE: u64 = std::mem::size_of::<u16>() as u64;

/// Owns the GPU device and queue for tile buffer management.
pub struct TileGpu {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl TileGpu {
    /// Initialize the GPU asynchronously, preferring a high-performance
    /// adapter.
    pub async fn new() -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = match instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
        {
            Ok(adapter) => adapter,
            Err(_) => return Err(RenderError::NoAdapter),
        };

        let info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("terrella-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self { device, queue })
    }

    /// Create an empty vertex buffer sized for `vertex_count` vertices of
    /// `V`, reporting device allocation failure instead of panicking.
    pub fn create_vertex_buffer<V: Pod>(
        &self,
        vertex_count: u32,
    ) -> Result<wgpu::Buffer, RenderError> {
        let size = u64::from(vertex_count) * std::mem::size_of::<V>() as u64;
        self.create_buffer_checked(
            "tile_vertex_buffer",
            size,
            wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        )
    }

    /// Create an empty index buffer sized for `triangle_count` triangles
    /// of u16 indices.
    pub fn create_index_buffer(&self, triangle_count: u32) -> Result<wgpu::Buffer, RenderError> {
        // round up so queue writes (4-byte granularity) always fit
        let size = (u64::from(triangle_count) * 3 * INDEX_SIZE).next_multiple_of(4);
        self.create_buffer_checked(
            "tile_index_buffer",
            size,
            wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
        )
    }

    /// Upload vertex data into an existing buffer.
    pub fn write_vertices<V: Pod>(&self, buffer: &wgpu::Buffer, vertices: &[V]) {
        self.queue.write_buffer(buffer, 0, bytemuck::cast_slice(vertices));
    }

    /// Upload index data into an existing buffer.
    ///
    /// An odd index count is padded with one trailing index so the write
    /// length meets the queue's 4-byte granularity; the padding is never
    /// addressed by a draw call.
    pub fn write_indices(&self, buffer: &wgpu::Buffer, indices: &[u16]) {
        if indices.len() % 2 == 0 {
            self.queue.write_buffer(buffer, 0, bytemuck::cast_slice(indices));
        } else {
            let mut padded = Vec::with_capacity(indices.len() + 1);
            padded.extend_from_slice(indices);
            padded.push(0);
            self.queue.write_buffer(buffer, 0, bytemuck::cast_slice(&padded));
        }
    }

    /// Flush queued writes to the device.
    pub fn flush(&self) {
        self.queue.submit(std::iter::empty());
    }

    fn create_buffer_checked(
        &self,
        label: &'static str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> Result<wgpu::Buffer, RenderError> {
        let error_scope = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });
        if let Some(source) = pollster::block_on(error_scope.pop()) {
            log::error!("buffer allocation failed ({label}, {size} bytes): {source}");
            return Err(RenderError::Allocation { label, source });
        }
        Ok(buffer)
    }
}

/// Initialize the GPU synchronously using `pollster`.
pub fn init_tile_gpu_blocking() -> Result<TileGpu, RenderError> {
    pollster::block_on(TileGpu::new())
}
