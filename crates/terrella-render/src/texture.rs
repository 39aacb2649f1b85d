//! Tile surface textures.
//!
//! One [`TileTexture`] per self-textured tile; descendants sample a
//! sub-rectangle of an ancestor's texture until their own arrives, so
//! these are shared behind `Arc` by the streaming layer.

use crate::error::RenderError;
use crate::gpu::TileGpu;

/// An uploaded rgba8 surface texture with its default view.
#[derive(Debug)]
pub struct TileTexture {
    /// The underlying GPU texture.
    pub texture: wgpu::Texture,
    /// Default view, ready to bind.
    pub view: wgpu::TextureView,
    /// Width and height in texels.
    pub dimensions: (u32, u32),
}

impl TileTexture {
    /// Create and upload an sRGB rgba8 texture.
    ///
    /// `pixels` must hold exactly `width * height * 4` bytes.
    pub fn from_rgba8(
        gpu: &TileGpu,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Self, RenderError> {
        let expected = (width as usize) * (height as usize) * 4;
        if pixels.len() != expected {
            return Err(RenderError::TextureData {
                expected,
                got: pixels.len(),
                width,
                height,
            });
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let error_scope = gpu.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tile_texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        if let Some(source) = pollster::block_on(error_scope.pop()) {
            log::error!("texture allocation failed ({width}x{height}): {source}");
            return Err(RenderError::Allocation {
                label: "tile_texture",
                source,
            });
        }

        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self {
            texture,
            view,
            dimensions: (width, height),
        })
    }
}
