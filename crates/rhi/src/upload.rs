//! Synchronous resource uploads.
//!
//! [`Uploader`] owns a transient command pool on the graphics queue and
//! records one-shot command buffers that copy data into device-local memory.
//! Every operation submits and then blocks until the queue drains, so the
//! resource is ready the moment the call returns. Uploads happen at load
//! time, not inside the frame loop, so the stall is acceptable.
//!
//! Texture uploads also generate the full mip chain on the GPU by blitting
//! each level down from the previous one.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{self, Image, ImageDesc};
use crate::instance::Instance;

/// Records and submits one-shot transfer work on the graphics queue.
pub struct Uploader {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Instance functions, needed for format capability queries.
    instance: ash::Instance,
    /// Transient pool the one-shot command buffers come from.
    pool: CommandPool,
}

impl Uploader {
    /// Creates an uploader with a transient command pool on the graphics queue.
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new(instance: &Instance, device: Arc<Device>) -> RhiResult<Self> {
        let graphics_family = device.queue_families().graphics_family;
        let pool = CommandPool::new_transient(device.clone(), graphics_family)?;

        debug!(
            "Uploader ready on queue family {}",
            pool.queue_family_index()
        );

        Ok(Self {
            device,
            instance: instance.handle().clone(),
            pool,
        })
    }

    /// Uploads `data` into a new device-local buffer of the given usage.
    ///
    /// The data travels through a temporary staging buffer; the staging
    /// buffer is freed before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation, recording, or submission fails.
    pub fn upload_buffer(&self, usage: BufferUsage, data: &[u8]) -> RhiResult<Buffer> {
        let staging = Buffer::new_with_data(self.device.clone(), BufferUsage::Staging, data)?;
        let buffer = Buffer::new(self.device.clone(), usage, data.len() as vk::DeviceSize)?;

        let cmd = self.begin_one_time()?;
        let region = vk::BufferCopy::default().size(staging.size());
        cmd.copy_buffer(staging.handle(), buffer.handle(), std::slice::from_ref(&region));
        self.submit_and_wait(&cmd)?;

        debug!("Uploaded {} bytes to {} buffer", data.len(), usage.name());

        Ok(buffer)
    }

    /// Uploads RGBA8 pixel data into a new sampled texture and generates
    /// its full mip chain.
    ///
    /// The texture is created as `R8G8B8A8_SRGB` with
    /// `floor(log2(max(width, height))) + 1` mip levels and is left in
    /// `SHADER_READ_ONLY_OPTIMAL` layout, ready for descriptor binding.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `pixels` is not exactly `width * height * 4` bytes
    /// - The format does not support linear-filtered blits
    ///   ([`RhiError::UnsupportedBlitFormat`])
    /// - Resource creation, recording, or submission fails
    pub fn upload_texture_rgba8(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> RhiResult<Image> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RhiError::InvalidHandle(format!(
                "Pixel data is {} bytes, expected {} for {}x{} RGBA8",
                pixels.len(),
                expected,
                width,
                height
            )));
        }

        let format = vk::Format::R8G8B8A8_SRGB;
        let mip_levels = image::mip_level_count(width, height);

        // Mip generation blits with linear filtering; refuse formats that
        // cannot do that instead of producing garbage levels.
        if !self.supports_linear_blit(format) {
            return Err(RhiError::UnsupportedBlitFormat(format));
        }

        let staging = Buffer::new_with_data(self.device.clone(), BufferUsage::Staging, pixels)?;
        let texture = Image::new(
            self.device.clone(),
            &ImageDesc::sampled_texture(width, height, format, mip_levels),
            "texture",
        )?;

        let cmd = self.begin_one_time()?;

        // Every level becomes a transfer destination: level 0 for the buffer
        // copy, the rest for the blit chain.
        self.transition_image_layout(
            &cmd,
            texture.handle(),
            mip_levels,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_offset(vk::Offset3D::default())
            .image_extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            });

        cmd.copy_buffer_to_image(
            staging.handle(),
            texture.handle(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            std::slice::from_ref(&region),
        );

        self.generate_mipmaps(&cmd, texture.handle(), width, height, mip_levels);

        self.submit_and_wait(&cmd)?;

        info!(
            "Uploaded {}x{} texture with {} mip levels",
            width, height, mip_levels
        );

        Ok(texture)
    }

    /// Checks whether `format` supports linear-filtered blits with optimal
    /// tiling.
    fn supports_linear_blit(&self, format: vk::Format) -> bool {
        let props = unsafe {
            self.instance
                .get_physical_device_format_properties(self.device.physical_device(), format)
        };

        props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    }

    /// Records a layout transition covering `mip_levels` levels of `image`.
    ///
    /// Only the transitions the upload path needs are supported; anything
    /// else is a programming error and is reported as
    /// [`RhiError::UnsupportedTransition`].
    fn transition_image_layout(
        &self,
        cmd: &CommandBuffer,
        image: vk::Image,
        mip_levels: u32,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> RhiResult<()> {
        let (src_access, dst_access, src_stage, dst_stage) =
            transition_masks(old_layout, new_layout)?;

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(mip_levels)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);

        cmd.pipeline_barrier(src_stage, dst_stage, std::slice::from_ref(&barrier));

        Ok(())
    }

    /// Fills mip levels 1.. by blitting each level from the previous one,
    /// leaving the whole image in `SHADER_READ_ONLY_OPTIMAL`.
    ///
    /// Expects every level to be in `TRANSFER_DST_OPTIMAL` on entry.
    fn generate_mipmaps(
        &self,
        cmd: &CommandBuffer,
        image: vk::Image,
        width: u32,
        height: u32,
        mip_levels: u32,
    ) {
        let mut barrier = vk::ImageMemoryBarrier::default()
            .image(image)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let mut mip_width = width as i32;
        let mut mip_height = height as i32;

        for level in 1..mip_levels {
            // Source level has its data; make it a blit source
            barrier.subresource_range.base_mip_level = level - 1;
            barrier.old_layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
            barrier.new_layout = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
            barrier.src_access_mask = vk::AccessFlags::TRANSFER_WRITE;
            barrier.dst_access_mask = vk::AccessFlags::TRANSFER_READ;
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                std::slice::from_ref(&barrier),
            );

            let next_width = (mip_width / 2).max(1);
            let next_height = (mip_height / 2).max(1);

            let blit = vk::ImageBlit::default()
                .src_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(level - 1)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .src_offsets([
                    vk::Offset3D::default(),
                    vk::Offset3D {
                        x: mip_width,
                        y: mip_height,
                        z: 1,
                    },
                ])
                .dst_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(level)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .dst_offsets([
                    vk::Offset3D::default(),
                    vk::Offset3D {
                        x: next_width,
                        y: next_height,
                        z: 1,
                    },
                ]);

            cmd.blit_image(
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&blit),
                vk::Filter::LINEAR,
            );

            // Source level is final; hand it to the fragment shader
            barrier.old_layout = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
            barrier.new_layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
            barrier.src_access_mask = vk::AccessFlags::TRANSFER_READ;
            barrier.dst_access_mask = vk::AccessFlags::SHADER_READ;
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                std::slice::from_ref(&barrier),
            );

            mip_width = next_width;
            mip_height = next_height;
        }

        // The last level was only ever a blit destination
        barrier.subresource_range.base_mip_level = mip_levels - 1;
        barrier.old_layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
        barrier.new_layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        barrier.src_access_mask = vk::AccessFlags::TRANSFER_WRITE;
        barrier.dst_access_mask = vk::AccessFlags::SHADER_READ;
        cmd.pipeline_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            std::slice::from_ref(&barrier),
        );
    }

    /// Allocates a one-shot command buffer and starts recording.
    fn begin_one_time(&self) -> RhiResult<CommandBuffer> {
        let cmd = CommandBuffer::new(self.device.clone(), &self.pool)?;
        cmd.begin()?;
        Ok(cmd)
    }

    /// Finishes recording, submits, waits for the queue to drain, and frees
    /// the command buffer.
    fn submit_and_wait(&self, cmd: &CommandBuffer) -> RhiResult<()> {
        cmd.end()?;

        let command_buffers = [cmd.handle()];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        self.device
            .submit_graphics(std::slice::from_ref(&submit), vk::Fence::null())?;

        unsafe {
            self.device
                .handle()
                .queue_wait_idle(self.device.graphics_queue())?;

            self.device
                .handle()
                .free_command_buffers(self.pool.handle(), &command_buffers);
        }

        Ok(())
    }
}

/// Access and stage masks for the layout transitions the upload path
/// supports.
///
/// Returns `(src_access, dst_access, src_stage, dst_stage)`.
fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> RhiResult<(
    vk::AccessFlags,
    vk::AccessFlags,
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
)> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok((
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok((
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ))
        }
        (old, new) => Err(RhiError::UnsupportedTransition { old, new }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_masks_undefined_to_transfer_dst() {
        let (src_access, dst_access, src_stage, dst_stage) = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();

        assert_eq!(src_access, vk::AccessFlags::empty());
        assert_eq!(dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn test_transition_masks_transfer_dst_to_shader_read() {
        let (src_access, dst_access, src_stage, dst_stage) = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();

        assert_eq!(src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_transition_masks_rejects_unknown_pair() {
        let result = transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );

        match result {
            Err(RhiError::UnsupportedTransition { old, new }) => {
                assert_eq!(old, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
                assert_eq!(new, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
            }
            other => panic!("expected UnsupportedTransition, got {:?}", other.map(|_| ())),
        }
    }
}
