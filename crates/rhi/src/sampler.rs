//! Texture sampler management.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan sampler wrapper.
///
/// Samplers are independent of any particular image; one sampler can serve
/// every texture that wants the same filtering.
pub struct Sampler {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan sampler handle.
    sampler: vk::Sampler,
}

impl Sampler {
    /// Creates a trilinear sampler with anisotropic filtering.
    ///
    /// Addressing is REPEAT on all axes and the LOD range is left open so
    /// the full mip chain of any bound texture is usable.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `max_anisotropy` - Device limit, from `PhysicalDeviceLimits::max_sampler_anisotropy`
    ///
    /// # Errors
    ///
    /// Returns an error if sampler creation fails.
    pub fn new_anisotropic(device: Arc<Device>, max_anisotropy: f32) -> RhiResult<Self> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .mip_lod_bias(0.0)
            .anisotropy_enable(true)
            .max_anisotropy(max_anisotropy)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false);

        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };

        debug!(
            "Created anisotropic sampler (max anisotropy {:.1})",
            max_anisotropy
        );

        Ok(Self { device, sampler })
    }

    /// Returns the Vulkan sampler handle.
    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
        debug!("Destroyed sampler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_is_send_sync() {
        // Compile-time check that Sampler is Send + Sync
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Sampler>();
    }
}
