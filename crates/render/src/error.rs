//! Error types for renderer construction and the frame loop.

use thiserror::Error;

use ember_assets::AssetError;
use ember_rhi::RhiError;

/// Errors surfaced by the renderer.
///
/// Most of the work happens in the lower layers, so this is mainly a
/// funnel for their error types plus the window-handle failures that
/// occur before any Vulkan object exists.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A Vulkan operation failed.
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Loading a model or texture from disk failed.
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Window or surface plumbing failed.
    #[error(transparent)]
    Platform(#[from] ember_core::Error),

    /// The windowing system refused to hand out a raw display handle.
    #[error("Window handle unavailable: {0}")]
    WindowHandle(String),
}

/// Convenience alias for renderer results.
pub type RenderResult<T> = Result<T, RenderError>;
