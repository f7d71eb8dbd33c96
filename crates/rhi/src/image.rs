//! GPU image management.
//!
//! This module provides [`Image`], an owned VkImage with gpu-allocator managed
//! memory and a full-range image view. It covers every 2D image the engine
//! needs: sampled textures with mip chains, depth attachments, and
//! multisampled color attachments, differing only in their [`ImageDesc`].
//!
//! Layout transitions are not handled here; they belong to the upload path
//! and the rendering strategies, which know the access patterns.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Description of a 2D image to create.
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: vk::Format,
    /// Number of mip levels (1 for attachments).
    pub mip_levels: u32,
    /// Sample count (TYPE_1 unless this is an MSAA attachment).
    pub samples: vk::SampleCountFlags,
    /// Usage flags.
    pub usage: vk::ImageUsageFlags,
    /// Aspect for the image view (COLOR or DEPTH).
    pub aspect: vk::ImageAspectFlags,
}

impl ImageDesc {
    /// Describes a single-sample color texture with the given mip chain,
    /// usable as a transfer target/source and for sampling.
    pub fn sampled_texture(width: u32, height: u32, format: vk::Format, mip_levels: u32) -> Self {
        Self {
            width,
            height,
            format,
            mip_levels,
            samples: vk::SampleCountFlags::TYPE_1,
            usage: vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }
}

/// Owned Vulkan image with memory and a full-range view.
///
/// # Resource Destruction
///
/// Resources are destroyed in the following order:
/// 1. Image view
/// 2. Image
/// 3. Memory allocation
pub struct Image {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan image handle.
    image: vk::Image,
    /// View covering all mip levels.
    view: vk::ImageView,
    /// GPU memory allocation.
    allocation: Option<Allocation>,
    /// Image format.
    format: vk::Format,
    /// Image dimensions.
    extent: vk::Extent2D,
    /// Number of mip levels.
    mip_levels: u32,
    /// Sample count.
    samples: vk::SampleCountFlags,
}

impl Image {
    /// Creates a new image in device-local memory with a full-range view.
    ///
    /// The image starts in `UNDEFINED` layout with optimal tiling.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `desc` - Image description
    /// * `name` - Allocation name for debugging
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Image creation fails
    /// - Memory allocation fails
    /// - Image view creation fails
    pub fn new(device: Arc<Device>, desc: &ImageDesc, name: &'static str) -> RhiResult<Self> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::InvalidHandle(
                "Image dimensions must be greater than 0".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .samples(desc.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = {
            let mut allocator = device.allocator().lock().unwrap();
            allocator.allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false, // Optimal tiling is not linear
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?
        };

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(desc.aspect)
                    .base_mip_level(0)
                    .level_count(desc.mip_levels)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let view = unsafe { device.handle().create_image_view(&view_info, None)? };

        debug!(
            "Created image '{}': {}x{} ({:?}, {} mips, {:?})",
            name, desc.width, desc.height, desc.format, desc.mip_levels, desc.samples
        );

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            format: desc.format,
            extent: vk::Extent2D {
                width: desc.width,
                height: desc.height,
            },
            mip_levels: desc.mip_levels,
            samples: desc.samples,
        })
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the image view covering all mip levels.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the image extent (width and height).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    /// Returns the height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    /// Returns the number of mip levels.
    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Returns the sample count.
    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        // Destroy resources in correct order:
        // 1. Image view (depends on image)
        // 2. Image (depends on allocation)
        // 3. Allocation (frees memory)
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator().lock().unwrap();
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free image allocation: {:?}", e);
            }
        }

        debug!(
            "Destroyed image: {}x{}",
            self.extent.width, self.extent.height
        );
    }
}

/// Returns the full mip chain length for an image of the given size.
///
/// Each level halves the larger dimension until it reaches 1, so the count
/// is `floor(log2(max(width, height))) + 1`.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    32 - largest.leading_zeros()
}

/// Finds the first format in `candidates` whose optimal-tiling or
/// linear-tiling features include `features`.
///
/// # Errors
///
/// Returns [`RhiError::NoSupportedFormat`] if no candidate qualifies.
pub fn find_supported_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
) -> RhiResult<vk::Format> {
    for &format in candidates {
        let props =
            unsafe { instance.get_physical_device_format_properties(physical_device, format) };

        let supported = match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            _ => props.optimal_tiling_features.contains(features),
        };

        if supported {
            return Ok(format);
        }
    }

    Err(RhiError::NoSupportedFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count_small_images() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(2, 1), 2);
        assert_eq!(mip_level_count(3, 3), 2);
        assert_eq!(mip_level_count(4, 4), 3);
    }

    #[test]
    fn test_mip_level_count_uses_larger_dimension() {
        assert_eq!(mip_level_count(1024, 1), 11);
        assert_eq!(mip_level_count(1, 1024), 11);
        assert_eq!(mip_level_count(800, 600), 10);
        assert_eq!(mip_level_count(1290, 720), 11);
    }

    #[test]
    fn test_mip_level_count_power_of_two() {
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(1024, 1024), 11);
        assert_eq!(mip_level_count(4096, 4096), 13);
    }

    #[test]
    fn test_sampled_texture_desc() {
        let desc = ImageDesc::sampled_texture(512, 512, vk::Format::R8G8B8A8_SRGB, 10);
        assert_eq!(desc.mip_levels, 10);
        assert_eq!(desc.samples, vk::SampleCountFlags::TYPE_1);
        assert!(desc.usage.contains(vk::ImageUsageFlags::SAMPLED));
        // Mip generation blits between levels of the same image
        assert!(desc.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert!(desc.usage.contains(vk::ImageUsageFlags::TRANSFER_DST));
        assert_eq!(desc.aspect, vk::ImageAspectFlags::COLOR);
    }
}
