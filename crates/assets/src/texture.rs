//! Texture pixel data loading and decoding.

use std::path::Path;

use tracing::debug;

use crate::error::AssetResult;

/// Decoded texture pixels, ready for GPU upload.
///
/// Pixels are stored tightly packed RGBA8, row-major, top-left origin.
/// Source images in other color formats are expanded during decode.
#[derive(Debug, Clone)]
pub struct TextureData {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl TextureData {
    /// Loads and decodes an image file to RGBA8.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or decoded.
    pub fn load(path: &Path) -> AssetResult<Self> {
        debug!("Loading texture from {:?}", path);
        let image = image::open(path)?.into_rgba8();
        Ok(Self::from_rgba_image(image))
    }

    /// Decodes an in-memory encoded image (PNG or JPEG) to RGBA8.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be decoded.
    pub fn from_encoded_bytes(bytes: &[u8]) -> AssetResult<Self> {
        let image = image::load_from_memory(bytes)?.into_rgba8();
        Ok(Self::from_rgba_image(image))
    }

    fn from_rgba_image(image: image::RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            pixels: image.into_raw(),
            width,
            height,
        }
    }

    /// Returns the RGBA8 pixel data.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the texture width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the texture height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }
}
