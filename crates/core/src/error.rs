//! Error types shared across the engine.

use thiserror::Error;

/// Main error type for engine-level failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using the engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;
