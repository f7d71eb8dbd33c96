//! Rendering strategy selection and per-frame attachment wiring.
//!
//! The engine records a frame in one of two ways, decided once at startup:
//!
//! - [`RenderingStrategy::Dynamic`] uses `vkCmdBeginRendering` with
//!   attachment infos built every frame. Nothing tracks image layouts, so
//!   the strategy records explicit barriers before and after the pass.
//! - [`RenderingStrategy::Legacy`] builds a classic render pass with one
//!   subpass and a framebuffer per swapchain image. Layout transitions
//!   ride on the pass's initial/final layouts, so no barriers appear in
//!   the command stream.
//!
//! Both strategies produce identical output: multisampled color and depth
//! attachments, resolved into the acquired swapchain image, which ends the
//! frame in `PRESENT_SRC_KHR`.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use ember_rhi::command::CommandBuffer;
use ember_rhi::device::Device;
use ember_rhi::pipeline::PipelineTarget;
use ember_rhi::swapchain::Swapchain;
use ember_rhi::{RhiError, RhiResult};

use crate::targets::RenderTargets;

/// Clear color for the multisampled color attachment (dark blue-gray).
const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.15, 1.0];

/// Which of the two recording paths the renderer uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyKind {
    /// Dynamic rendering with hand-recorded layout transitions.
    DynamicRendering,
    /// Classic render pass with subpass-managed layouts.
    LegacyRenderPass,
}

impl StrategyKind {
    /// Picks the recording path for a device.
    ///
    /// Dynamic rendering wins whenever the device supports it; the config
    /// override exists to exercise the legacy path on hardware that could
    /// do better.
    pub fn select(supports_dynamic_rendering: bool, force_legacy_pass: bool) -> Self {
        if supports_dynamic_rendering && !force_legacy_pass {
            Self::DynamicRendering
        } else {
            Self::LegacyRenderPass
        }
    }

    /// True if this kind needs the dynamic rendering device feature.
    #[inline]
    pub fn uses_dynamic_rendering(self) -> bool {
        matches!(self, Self::DynamicRendering)
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DynamicRendering => write!(f, "dynamic rendering"),
            Self::LegacyRenderPass => write!(f, "legacy render pass"),
        }
    }
}

/// The chosen recording path and the objects it owns.
pub enum RenderingStrategy {
    /// Dynamic rendering owns nothing; attachment infos are rebuilt from
    /// the current targets every frame.
    Dynamic,
    /// The legacy path owns its render pass and framebuffers.
    Legacy(LegacyPass),
}

impl RenderingStrategy {
    /// Builds the strategy for `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error if render pass or framebuffer creation fails on
    /// the legacy path.
    pub fn new(
        device: Arc<Device>,
        kind: StrategyKind,
        swapchain: &Swapchain,
        targets: &RenderTargets,
    ) -> RhiResult<Self> {
        match kind {
            StrategyKind::DynamicRendering => {
                info!("Rendering with dynamic rendering");
                Ok(Self::Dynamic)
            }
            StrategyKind::LegacyRenderPass => {
                let pass = LegacyPass::new(device, swapchain, targets)?;
                info!(
                    "Rendering with a legacy render pass ({} framebuffer(s))",
                    pass.framebuffers.len()
                );
                Ok(Self::Legacy(pass))
            }
        }
    }

    /// Returns which path this strategy records.
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Dynamic => StrategyKind::DynamicRendering,
            Self::Legacy(_) => StrategyKind::LegacyRenderPass,
        }
    }

    /// The attachment description the graphics pipeline must be built
    /// against.
    pub fn pipeline_target(&self, swapchain: &Swapchain, targets: &RenderTargets) -> PipelineTarget {
        match self {
            Self::Dynamic => PipelineTarget::DynamicRendering {
                color_format: swapchain.format(),
                depth_format: targets.depth_format(),
            },
            Self::Legacy(pass) => PipelineTarget::RenderPass(pass.render_pass),
        }
    }

    /// Records everything up to the first draw: layout transitions where
    /// needed, then the pass or rendering begin with clears.
    pub fn begin_frame(
        &self,
        cmd: &CommandBuffer,
        swapchain: &Swapchain,
        targets: &RenderTargets,
        image_index: u32,
    ) {
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: swapchain.extent(),
        };

        match self {
            Self::Dynamic => {
                // Attachments come out of whatever state the previous frame
                // left them in; UNDEFINED discards that content, which is
                // fine since every attachment is cleared or overwritten.
                let barriers = [
                    attachment_barrier(
                        targets.color_image(),
                        vk::ImageAspectFlags::COLOR,
                        vk::ImageLayout::UNDEFINED,
                        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    ),
                    attachment_barrier(
                        swapchain.image(image_index as usize),
                        vk::ImageAspectFlags::COLOR,
                        vk::ImageLayout::UNDEFINED,
                        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    ),
                    attachment_barrier(
                        targets.depth_image(),
                        vk::ImageAspectFlags::DEPTH,
                        vk::ImageLayout::UNDEFINED,
                        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
                    ),
                ];
                let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);
                cmd.pipeline_barrier2(&dependency);

                // Multisampled color resolves straight into the swapchain
                // image, so the samples themselves never need storing
                let color_attachment = vk::RenderingAttachmentInfo::default()
                    .image_view(targets.color_view())
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .resolve_mode(vk::ResolveModeFlags::AVERAGE)
                    .resolve_image_view(swapchain.image_view(image_index as usize))
                    .resolve_image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .clear_value(clear_color());

                let depth_attachment = vk::RenderingAttachmentInfo::default()
                    .image_view(targets.depth_view())
                    .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .clear_value(clear_depth());

                let rendering_info = vk::RenderingInfo::default()
                    .render_area(render_area)
                    .layer_count(1)
                    .color_attachments(std::slice::from_ref(&color_attachment))
                    .depth_attachment(&depth_attachment);

                cmd.begin_rendering(&rendering_info);
            }
            Self::Legacy(pass) => {
                // Clear values line up with attachment indices 0 and 1; the
                // resolve attachment loads DONT_CARE and needs none
                let clear_values = [clear_color(), clear_depth()];

                let begin_info = vk::RenderPassBeginInfo::default()
                    .render_pass(pass.render_pass)
                    .framebuffer(pass.framebuffers[image_index as usize])
                    .render_area(render_area)
                    .clear_values(&clear_values);

                cmd.begin_render_pass(&begin_info, vk::SubpassContents::INLINE);
            }
        }
    }

    /// Records everything after the last draw and leaves the swapchain
    /// image in `PRESENT_SRC_KHR`.
    pub fn end_frame(&self, cmd: &CommandBuffer, swapchain: &Swapchain, image_index: u32) {
        match self {
            Self::Dynamic => {
                cmd.end_rendering();

                let barrier = attachment_barrier(
                    swapchain.image(image_index as usize),
                    vk::ImageAspectFlags::COLOR,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    vk::ImageLayout::PRESENT_SRC_KHR,
                );
                let dependency = vk::DependencyInfo::default()
                    .image_memory_barriers(std::slice::from_ref(&barrier));
                cmd.pipeline_barrier2(&dependency);
            }
            Self::Legacy(_) => {
                // The pass's final layouts already cover the present
                // transition
                cmd.end_render_pass();
            }
        }
    }

    /// Rebuilds size-dependent objects after a swapchain recreation.
    ///
    /// The dynamic path has none. The legacy path keeps its render pass,
    /// which depends only on formats, and rebuilds the framebuffers
    /// against the new image views.
    ///
    /// # Errors
    ///
    /// Returns an error if framebuffer creation fails.
    pub fn rebuild(&mut self, swapchain: &Swapchain, targets: &RenderTargets) -> RhiResult<()> {
        match self {
            Self::Dynamic => Ok(()),
            Self::Legacy(pass) => pass.rebuild_framebuffers(swapchain, targets),
        }
    }
}

/// Render pass and framebuffers for the legacy path.
pub struct LegacyPass {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Three-attachment pass: multisampled color, depth, resolve.
    render_pass: vk::RenderPass,
    /// One framebuffer per swapchain image.
    framebuffers: Vec<vk::Framebuffer>,
}

impl LegacyPass {
    fn new(device: Arc<Device>, swapchain: &Swapchain, targets: &RenderTargets) -> RhiResult<Self> {
        let render_pass = create_render_pass(
            &device,
            swapchain.format(),
            targets.depth_format(),
            targets.samples(),
        )?;

        let framebuffers = match create_framebuffers(&device, render_pass, swapchain, targets) {
            Ok(framebuffers) => framebuffers,
            Err(e) => {
                unsafe { device.handle().destroy_render_pass(render_pass, None) };
                return Err(e);
            }
        };

        Ok(Self {
            device,
            render_pass,
            framebuffers,
        })
    }

    fn rebuild_framebuffers(
        &mut self,
        swapchain: &Swapchain,
        targets: &RenderTargets,
    ) -> RhiResult<()> {
        self.destroy_framebuffers();
        self.framebuffers = create_framebuffers(&self.device, self.render_pass, swapchain, targets)?;

        debug!("Rebuilt {} framebuffer(s)", self.framebuffers.len());

        Ok(())
    }

    fn destroy_framebuffers(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
        }
    }
}

impl Drop for LegacyPass {
    fn drop(&mut self) {
        self.destroy_framebuffers();
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        debug!("Destroyed legacy render pass");
    }
}

/// Creates the three-attachment render pass.
///
/// Attachment 0 is the multisampled color target, 1 the depth target, 2
/// the single-sample resolve destination (the swapchain image). The
/// resolve attachment's final layout is `PRESENT_SRC_KHR`, so a recorded
/// pass needs no further transitions before present.
fn create_render_pass(
    device: &Arc<Device>,
    color_format: vk::Format,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
) -> RhiResult<vk::RenderPass> {
    let attachments = [
        // Multisampled color, discarded after the resolve
        vk::AttachmentDescription2::default()
            .format(color_format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        // Depth, only needed while the pass runs
        vk::AttachmentDescription2::default()
            .format(depth_format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        // Resolve destination, handed to the presentation engine
        vk::AttachmentDescription2::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::DONT_CARE)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
    ];

    let color_ref = vk::AttachmentReference2::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    let depth_ref = vk::AttachmentReference2::default()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    let resolve_ref = vk::AttachmentReference2::default()
        .attachment(2)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    let subpass = vk::SubpassDescription2::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(std::slice::from_ref(&color_ref))
        .resolve_attachments(std::slice::from_ref(&resolve_ref))
        .depth_stencil_attachment(&depth_ref);

    // Block attachment writes until the acquire semaphore's wait stage,
    // and depth clears until earlier frames release the depth target
    let dependency = vk::SubpassDependency2::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        );

    let create_info = vk::RenderPassCreateInfo2::default()
        .attachments(&attachments)
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(std::slice::from_ref(&dependency));

    let render_pass = unsafe { device.handle().create_render_pass2(&create_info, None)? };

    debug!(
        "Created render pass: color {:?}, depth {:?}, samples {:?}",
        color_format, depth_format, samples
    );

    Ok(render_pass)
}

/// Creates one framebuffer per swapchain image.
///
/// Attachment order matches the render pass: multisampled color, depth,
/// then the swapchain image as resolve destination.
fn create_framebuffers(
    device: &Arc<Device>,
    render_pass: vk::RenderPass,
    swapchain: &Swapchain,
    targets: &RenderTargets,
) -> RhiResult<Vec<vk::Framebuffer>> {
    swapchain
        .image_views()
        .iter()
        .map(|&swapchain_view| {
            let attachments = [targets.color_view(), targets.depth_view(), swapchain_view];

            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(swapchain.width())
                .height(swapchain.height())
                .layers(1);

            unsafe { device.handle().create_framebuffer(&create_info, None) }
                .map_err(RhiError::from)
        })
        .collect()
}

/// Builds a single-mip attachment barrier for the frame loop.
fn attachment_barrier(
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> vk::ImageMemoryBarrier2<'static> {
    let (src_stage, src_access, dst_stage, dst_access) = transition_masks(old_layout, new_layout);

    vk::ImageMemoryBarrier2::default()
        .src_stage_mask(src_stage)
        .src_access_mask(src_access)
        .dst_stage_mask(dst_stage)
        .dst_access_mask(dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect_mask)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        )
}

/// Stage and access masks for the frame-loop layout transitions.
///
/// Unknown pairs fall back to a full barrier, which is always correct but
/// stalls the pipeline; the frame loop only records the three known arms.
fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> (
    vk::PipelineStageFlags2,
    vk::AccessFlags2,
    vk::PipelineStageFlags2,
    vk::AccessFlags2,
) {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL) => (
            vk::PipelineStageFlags2::TOP_OF_PIPE,
            vk::AccessFlags2::empty(),
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        ),
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL) => (
            vk::PipelineStageFlags2::TOP_OF_PIPE,
            vk::AccessFlags2::empty(),
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        (vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR) => (
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            vk::AccessFlags2::empty(),
        ),
        (old, new) => {
            warn!("Unhandled layout transition: {:?} -> {:?}", old, new);
            (
                vk::PipelineStageFlags2::ALL_COMMANDS,
                vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                vk::PipelineStageFlags2::ALL_COMMANDS,
                vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
            )
        }
    }
}

fn clear_color() -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue {
            float32: CLEAR_COLOR,
        },
    }
}

fn clear_depth() -> vk::ClearValue {
    vk::ClearValue {
        depth_stencil: vk::ClearDepthStencilValue {
            depth: 1.0,
            stencil: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_prefers_dynamic_rendering() {
        assert_eq!(
            StrategyKind::select(true, false),
            StrategyKind::DynamicRendering
        );
    }

    #[test]
    fn test_select_without_device_support() {
        assert_eq!(
            StrategyKind::select(false, false),
            StrategyKind::LegacyRenderPass
        );
    }

    #[test]
    fn test_select_honors_force_override() {
        assert_eq!(
            StrategyKind::select(true, true),
            StrategyKind::LegacyRenderPass
        );
        assert_eq!(
            StrategyKind::select(false, true),
            StrategyKind::LegacyRenderPass
        );
    }

    #[test]
    fn test_uses_dynamic_rendering() {
        assert!(StrategyKind::DynamicRendering.uses_dynamic_rendering());
        assert!(!StrategyKind::LegacyRenderPass.uses_dynamic_rendering());
    }

    #[test]
    fn test_transition_masks_color_attachment() {
        let (src_stage, src_access, dst_stage, dst_access) = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );

        assert_eq!(src_stage, vk::PipelineStageFlags2::TOP_OF_PIPE);
        assert_eq!(src_access, vk::AccessFlags2::empty());
        assert_eq!(dst_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(dst_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn test_transition_masks_depth_attachment() {
        let (_, _, dst_stage, dst_access) = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );

        assert!(dst_stage.contains(vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS));
        assert!(dst_access.contains(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }

    #[test]
    fn test_transition_masks_present() {
        let (src_stage, src_access, _, dst_access) = transition_masks(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );

        assert_eq!(src_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(src_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(dst_access, vk::AccessFlags2::empty());
    }

    #[test]
    fn test_transition_masks_unknown_pair_is_full_barrier() {
        let (src_stage, _, dst_stage, _) = transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::GENERAL,
        );

        assert_eq!(src_stage, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert_eq!(dst_stage, vk::PipelineStageFlags2::ALL_COMMANDS);
    }

    #[test]
    fn test_clear_values() {
        // Color and depth clears occupy attachment slots 0 and 1
        let color = clear_color();
        let depth = clear_depth();

        unsafe {
            assert_eq!(color.color.float32, CLEAR_COLOR);
            assert_eq!(depth.depth_stencil.depth, 1.0);
            assert_eq!(depth.depth_stencil.stencil, 0);
        }
    }
}
