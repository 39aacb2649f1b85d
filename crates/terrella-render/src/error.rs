//! Error types for GPU initialization and resource creation.

/// Failures of device setup and buffer/texture allocation.
///
/// Allocation failures are recoverable at the streaming layer: the tile
/// stays geometry-less and is retried on a later frame.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// The device reported an error while creating a resource.
    #[error("GPU allocation failed for {label}: {source}")]
    Allocation {
        /// Resource label that failed to allocate.
        label: &'static str,
        /// Device-reported cause.
        source: wgpu::Error,
    },

    /// Pixel data does not match the texture dimensions.
    #[error("texture data is {got} bytes, expected {expected} for {width}x{height} rgba8")]
    TextureData {
        /// Required byte count for the dimensions.
        expected: usize,
        /// Actual byte count supplied.
        got: usize,
        /// Texture width in texels.
        width: u32,
        /// Texture height in texels.
        height: u32,
    },
}
