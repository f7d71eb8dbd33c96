//! Frame slots and frame-loop synchronization.
//!
//! The renderer keeps [`MAX_FRAMES_IN_FLIGHT`] slots and cycles through
//! them so the CPU can record frame N+1 while the GPU draws frame N. Each
//! slot owns the resources one frame re-records: a command buffer, the
//! fence that says the GPU finished the slot's last submission, and the
//! per-frame uniform buffer with its descriptor set.
//!
//! Semaphores follow a different cadence. Acquire semaphores cannot be
//! indexed by frame slot because `vkAcquireNextImageKHR` can return before
//! an earlier acquire that used the same semaphore has been waited on, so
//! one pool holds an acquire semaphore per swapchain image and a separate
//! counter rotates through it. Render-finished semaphores must likewise be
//! indexed by the image they signal for, to keep presentation of image K
//! from racing with a later frame that reuses the same semaphore.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use ember_rhi::buffer::Buffer;
use ember_rhi::command::{CommandBuffer, CommandPool};
use ember_rhi::device::Device;
use ember_rhi::sync::{Fence, Semaphore};
use ember_rhi::RhiResult;

use crate::MAX_FRAMES_IN_FLIGHT;

/// Resources one in-flight frame records into.
pub struct FrameSlot {
    /// Command buffer, reset and re-recorded every time the slot comes up.
    pub command_buffer: CommandBuffer,
    /// Signaled when the GPU finishes this slot's last submission.
    /// Created signaled so the first wait passes immediately.
    pub in_flight: Fence,
    /// Per-frame transform uniform, persistently mapped.
    pub uniform: Buffer,
    /// Descriptor set binding `uniform` and the scene texture.
    pub descriptor_set: vk::DescriptorSet,
}

impl FrameSlot {
    /// Creates a slot with a freshly allocated command buffer and a
    /// signaled fence.
    ///
    /// The uniform buffer and descriptor set are built by the caller, which
    /// also writes the descriptor bindings before handing them over.
    ///
    /// # Errors
    ///
    /// Returns an error if command buffer allocation or fence creation
    /// fails.
    pub fn new(
        device: Arc<Device>,
        pool: &CommandPool,
        uniform: Buffer,
        descriptor_set: vk::DescriptorSet,
    ) -> RhiResult<Self> {
        let command_buffer = CommandBuffer::new(device.clone(), pool)?;
        let in_flight = Fence::new(device, true)?;

        Ok(Self {
            command_buffer,
            in_flight,
            uniform,
            descriptor_set,
        })
    }
}

/// Frame-slot and acquire-semaphore counters.
///
/// The two wrap independently: the frame index wraps at
/// [`MAX_FRAMES_IN_FLIGHT`], the semaphore index wraps at the swapchain
/// image count, and neither is a multiple of the other in general. Both
/// advance exactly once per completed frame and stay put when a frame is
/// abandoned after a failed acquire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FrameCounters {
    /// Index into the frame slots.
    frame: usize,
    /// Index into the acquire semaphore pool.
    semaphore: usize,
    /// Size of the acquire semaphore pool.
    semaphore_count: usize,
}

impl FrameCounters {
    fn new(semaphore_count: usize) -> Self {
        Self {
            frame: 0,
            semaphore: 0,
            semaphore_count,
        }
    }

    fn advance(&mut self) {
        self.frame = (self.frame + 1) % MAX_FRAMES_IN_FLIGHT;
        self.semaphore = (self.semaphore + 1) % self.semaphore_count;
    }
}

/// Semaphore pools and counters for the frame loop.
pub struct FrameSync {
    /// Acquire semaphores, one per swapchain image, rotated by a counter
    /// of their own.
    present_complete: Vec<Semaphore>,
    /// Render-finished semaphores, indexed by acquired image index.
    render_finished: Vec<Semaphore>,
    /// Rotation state.
    counters: FrameCounters,
}

impl FrameSync {
    /// Creates both semaphore pools sized to the swapchain image count.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: &Arc<Device>, image_count: u32) -> RhiResult<Self> {
        let present_complete = make_semaphores(device, image_count)?;
        let render_finished = make_semaphores(device, image_count)?;

        debug!("Created frame sync for {} swapchain image(s)", image_count);

        Ok(Self {
            present_complete,
            render_finished,
            counters: FrameCounters::new(image_count as usize),
        })
    }

    /// Index of the frame slot to use this frame.
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.counters.frame
    }

    /// The acquire semaphore for this frame's `vkAcquireNextImageKHR`.
    #[inline]
    pub fn acquire_semaphore(&self) -> vk::Semaphore {
        self.present_complete[self.counters.semaphore].handle()
    }

    /// The render-finished semaphore tied to `image_index`.
    #[inline]
    pub fn render_finished_semaphore(&self, image_index: u32) -> vk::Semaphore {
        self.render_finished[image_index as usize].handle()
    }

    /// Advances both counters after a fully submitted and presented frame.
    #[inline]
    pub fn advance(&mut self) {
        self.counters.advance();
    }

    /// Rebuilds the semaphore pools if the swapchain image count changed.
    ///
    /// Recreating a swapchain at a new size usually keeps the image count,
    /// in which case the existing semaphores stay valid and nothing
    /// happens. When the count does change, both pools are rebuilt and the
    /// semaphore counter restarts; the frame counter is untouched because
    /// the frame slots are unaffected.
    ///
    /// The caller must ensure the device is idle first.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn match_image_count(&mut self, device: &Arc<Device>, image_count: u32) -> RhiResult<()> {
        if self.present_complete.len() == image_count as usize {
            return Ok(());
        }

        debug!(
            "Swapchain image count changed {} -> {}, rebuilding semaphore pools",
            self.present_complete.len(),
            image_count
        );

        self.present_complete = make_semaphores(device, image_count)?;
        self.render_finished = make_semaphores(device, image_count)?;
        self.counters.semaphore = 0;
        self.counters.semaphore_count = image_count as usize;

        Ok(())
    }
}

fn make_semaphores(device: &Arc<Device>, count: u32) -> RhiResult<Vec<Semaphore>> {
    (0..count).map(|_| Semaphore::new(device.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let counters = FrameCounters::new(3);
        assert_eq!(counters.frame, 0);
        assert_eq!(counters.semaphore, 0);
    }

    #[test]
    fn test_counters_wrap_independently() {
        // Two frame slots against three images: the pair only realigns
        // after lcm(2, 3) = 6 frames
        let mut counters = FrameCounters::new(3);

        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push((counters.frame, counters.semaphore));
            counters.advance();
        }

        assert_eq!(
            seen,
            vec![(0, 0), (1, 1), (0, 2), (1, 0), (0, 1), (1, 2), (0, 0)]
        );
    }

    #[test]
    fn test_counters_with_matching_sizes() {
        let mut counters = FrameCounters::new(MAX_FRAMES_IN_FLIGHT);
        counters.advance();
        assert_eq!(counters.frame, counters.semaphore);
        counters.advance();
        assert_eq!(counters.frame, 0);
        assert_eq!(counters.semaphore, 0);
    }

    #[test]
    fn test_counters_single_image() {
        let mut counters = FrameCounters::new(1);
        counters.advance();
        assert_eq!(counters.semaphore, 0);
        assert_eq!(counters.frame, 1);
        counters.advance();
        assert_eq!(counters.semaphore, 0);
        assert_eq!(counters.frame, 0);
    }

    #[test]
    fn test_frame_counter_stays_below_limit() {
        let mut counters = FrameCounters::new(4);
        for _ in 0..100 {
            counters.advance();
            assert!(counters.frame < MAX_FRAMES_IN_FLIGHT);
            assert!(counters.semaphore < 4);
        }
    }
}
