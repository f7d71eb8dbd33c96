//! Offscreen attachments sized to the swapchain.
//!
//! The pipeline renders into a multisampled color target and a matching
//! depth target, then resolves the color samples into the swapchain image.
//! Both targets live in GPU-only memory and are rebuilt whenever the
//! swapchain changes size.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use ember_rhi::device::Device;
use ember_rhi::image::{self, Image, ImageDesc};
use ember_rhi::RhiResult;

/// Depth formats in preference order.
///
/// `find_depth_format` takes the first one the physical device supports as
/// a depth/stencil attachment with optimal tiling.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Picks the best supported depth format for attachment use.
///
/// # Errors
///
/// Returns [`ember_rhi::RhiError::NoSupportedFormat`] if none of the
/// candidates qualifies.
pub fn find_depth_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> RhiResult<vk::Format> {
    image::find_supported_format(
        instance,
        physical_device,
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )
}

/// Multisampled color and depth attachments for one swapchain size.
pub struct RenderTargets {
    /// Reference to the logical device, kept for rebuilds.
    device: Arc<Device>,
    /// Multisampled color attachment; resolved into the swapchain image.
    color: Image,
    /// Multisampled depth attachment.
    depth: Image,
    /// Color format, always the swapchain surface format.
    color_format: vk::Format,
    /// Depth format chosen by [`find_depth_format`].
    depth_format: vk::Format,
    /// Sample count shared by both attachments.
    samples: vk::SampleCountFlags,
}

impl RenderTargets {
    /// Creates color and depth targets at the given size.
    ///
    /// `color_format` must match the swapchain format so the resolve is
    /// format-compatible. Both attachments use the same sample count; the
    /// pipeline must be built with that count too.
    ///
    /// # Errors
    ///
    /// Returns an error if image creation or allocation fails.
    pub fn new(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let color = create_color_target(&device, color_format, samples, width, height)?;
        let depth = create_depth_target(&device, depth_format, samples, width, height)?;

        debug!(
            "Created render targets: {}x{}, color {:?}, depth {:?}, samples {:?}",
            width, height, color_format, depth_format, samples
        );

        Ok(Self {
            device,
            color,
            depth,
            color_format,
            depth_format,
            samples,
        })
    }

    /// Replaces both attachments with ones at the new size.
    ///
    /// The caller must ensure the GPU is no longer using the old images,
    /// which swapchain recreation already guarantees by waiting for the
    /// device to go idle.
    ///
    /// # Errors
    ///
    /// Returns an error if image creation or allocation fails.
    pub fn recreate(&mut self, width: u32, height: u32) -> RhiResult<()> {
        self.color = create_color_target(&self.device, self.color_format, self.samples, width, height)?;
        self.depth = create_depth_target(&self.device, self.depth_format, self.samples, width, height)?;

        debug!("Recreated render targets at {}x{}", width, height);

        Ok(())
    }

    /// Returns the multisampled color image handle.
    #[inline]
    pub fn color_image(&self) -> vk::Image {
        self.color.handle()
    }

    /// Returns the multisampled color image view.
    #[inline]
    pub fn color_view(&self) -> vk::ImageView {
        self.color.view()
    }

    /// Returns the depth image handle.
    #[inline]
    pub fn depth_image(&self) -> vk::Image {
        self.depth.handle()
    }

    /// Returns the depth image view.
    #[inline]
    pub fn depth_view(&self) -> vk::ImageView {
        self.depth.view()
    }

    /// Returns the depth format.
    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Returns the sample count shared by both attachments.
    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }
}

/// Describes the multisampled color attachment.
///
/// Transient usage lets the driver back it with tile memory where
/// available; the resolved result is the only thing that leaves the pass.
fn color_target_desc(
    format: vk::Format,
    samples: vk::SampleCountFlags,
    width: u32,
    height: u32,
) -> ImageDesc {
    ImageDesc {
        width,
        height,
        format,
        mip_levels: 1,
        samples,
        usage: vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
        aspect: vk::ImageAspectFlags::COLOR,
    }
}

/// Describes the multisampled depth attachment.
fn depth_target_desc(
    format: vk::Format,
    samples: vk::SampleCountFlags,
    width: u32,
    height: u32,
) -> ImageDesc {
    ImageDesc {
        width,
        height,
        format,
        mip_levels: 1,
        samples,
        usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        aspect: vk::ImageAspectFlags::DEPTH,
    }
}

fn create_color_target(
    device: &Arc<Device>,
    format: vk::Format,
    samples: vk::SampleCountFlags,
    width: u32,
    height: u32,
) -> RhiResult<Image> {
    Image::new(
        device.clone(),
        &color_target_desc(format, samples, width, height),
        "msaa color target",
    )
}

fn create_depth_target(
    device: &Arc<Device>,
    format: vk::Format,
    samples: vk::SampleCountFlags,
    width: u32,
    height: u32,
) -> RhiResult<Image> {
    Image::new(
        device.clone(),
        &depth_target_desc(format, samples, width, height),
        "depth target",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_candidates_prefer_pure_depth() {
        // D32_SFLOAT first: no stencil baggage and universally supported
        assert_eq!(DEPTH_FORMAT_CANDIDATES[0], vk::Format::D32_SFLOAT);
        assert_eq!(DEPTH_FORMAT_CANDIDATES[1], vk::Format::D32_SFLOAT_S8_UINT);
        assert_eq!(DEPTH_FORMAT_CANDIDATES[2], vk::Format::D24_UNORM_S8_UINT);
    }

    #[test]
    fn test_color_target_desc_is_transient() {
        let desc = color_target_desc(
            vk::Format::B8G8R8A8_SRGB,
            vk::SampleCountFlags::TYPE_4,
            1920,
            1080,
        );

        assert!(desc
            .usage
            .contains(vk::ImageUsageFlags::TRANSIENT_ATTACHMENT));
        assert!(desc.usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert_eq!(desc.aspect, vk::ImageAspectFlags::COLOR);
        assert_eq!(desc.mip_levels, 1);
        assert_eq!(desc.samples, vk::SampleCountFlags::TYPE_4);
    }

    #[test]
    fn test_depth_target_desc_matches_samples() {
        let desc = depth_target_desc(
            vk::Format::D32_SFLOAT,
            vk::SampleCountFlags::TYPE_8,
            1280,
            720,
        );

        assert_eq!(
            desc.usage,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        );
        assert_eq!(desc.aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!(desc.samples, vk::SampleCountFlags::TYPE_8);
        assert_eq!((desc.width, desc.height), (1280, 720));
    }
}
