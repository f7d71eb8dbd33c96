//! Error types for asset loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for asset loading operations.
#[derive(Error, Debug)]
pub enum AssetError {
    /// Failed to load an OBJ file.
    #[error("Failed to load OBJ model '{path}': {message}")]
    ObjLoad {
        /// Path to the file that failed to load.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Failed to parse OBJ data from memory.
    #[error("Failed to parse OBJ data: {0}")]
    ObjParse(String),

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for asset operations.
pub type AssetResult<T> = Result<T, AssetError>;
