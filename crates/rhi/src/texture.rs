//! Sampled textures.
//!
//! A [`Texture`] bundles a mip-mapped sampled image with the sampler used
//! to read it, which is exactly the pair a combined image sampler
//! descriptor wants.

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::RhiResult;
use crate::image::Image;
use crate::sampler::Sampler;
use crate::upload::Uploader;

/// A sampled, mip-mapped 2D texture with its sampler.
pub struct Texture {
    image: Image,
    sampler: Sampler,
}

impl Texture {
    /// Uploads RGBA8 pixels into a new texture with a full mip chain and
    /// an anisotropic sampler.
    ///
    /// # Arguments
    ///
    /// * `uploader` - Records the staging copy and mip generation
    /// * `device` - The logical device
    /// * `pixels` - Tightly packed RGBA8 data, `width * height * 4` bytes
    /// * `width` - Width in pixels
    /// * `height` - Height in pixels
    /// * `max_anisotropy` - Device limit for the sampler
    ///
    /// # Errors
    ///
    /// Returns an error if the upload or sampler creation fails.
    pub fn from_rgba8(
        uploader: &Uploader,
        device: Arc<Device>,
        pixels: &[u8],
        width: u32,
        height: u32,
        max_anisotropy: f32,
    ) -> RhiResult<Self> {
        let image = uploader.upload_texture_rgba8(pixels, width, height)?;
        let sampler = Sampler::new_anisotropic(device, max_anisotropy)?;

        Ok(Self { image, sampler })
    }

    /// Returns the underlying image.
    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Returns the image view covering all mip levels.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    /// Returns the sampler handle.
    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    /// Returns the number of mip levels.
    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels()
    }

    /// Returns the descriptor info for binding this texture as a combined
    /// image sampler.
    ///
    /// The upload path leaves the image in `SHADER_READ_ONLY_OPTIMAL`,
    /// which is the layout reported here.
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler.handle(),
            image_view: self.image.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_is_send_sync() {
        // Compile-time check that Texture is Send + Sync
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Texture>();
    }
}
