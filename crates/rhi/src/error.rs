//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
///
/// Every variant here is fatal from the engine's point of view: it unwinds
/// to the process entry point, which logs it and exits non-zero. The only
/// recoverable Vulkan conditions (out-of-date / suboptimal swapchain) are
/// classified at the acquire/present call sites before an error is built.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// No queue family combination supports both graphics and presentation
    #[error("No queue family combination supports graphics and presentation")]
    NoQueueFamily,

    /// A requested instance layer is not installed
    #[error("Requested layer not available: {0}")]
    MissingLayer(String),

    /// A required instance extension is not supported
    #[error("Required instance extension not supported: {0}")]
    MissingExtension(String),

    /// An image layout transition with no barrier mapping was requested
    #[error("Unsupported image layout transition: {old:?} -> {new:?}")]
    UnsupportedTransition {
        /// Layout the image is currently in.
        old: vk::ImageLayout,
        /// Layout that was requested.
        new: vk::ImageLayout,
    },

    /// The texture format cannot be blitted with linear filtering
    #[error("Format {0:?} does not support linear-filtered blits")]
    UnsupportedBlitFormat(vk::Format),

    /// None of the candidate formats support the required features
    #[error("No supported format among candidates")]
    NoSupportedFormat,

    /// Shader module error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or argument error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// IO error (shader blob reads)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
