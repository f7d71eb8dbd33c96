//! Asset loading.
//!
//! This crate handles loading of external assets:
//! - Wavefront OBJ mesh loading
//! - Image decoding to RGBA8 texel data

mod error;

pub mod model;
pub mod texture;

pub use error::{AssetError, AssetResult};
pub use model::MeshData;
pub use texture::TextureData;
