//! Per-frame uniform data.
//!
//! One [`TransformUbo`] is written into the current frame slot's uniform
//! buffer at the start of every frame. The shader reads it as a single
//! uniform block at binding 0.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Fixed camera position, looking at the origin.
const EYE: Vec3 = Vec3::new(2.0, 2.0, 2.0);

/// Model rotation speed in degrees per second of wall time.
const SPIN_DEGREES_PER_SEC: f32 = 90.0;

/// Vertical field of view in degrees.
const FOV_Y_DEGREES: f32 = 45.0;

/// Near clip plane distance.
const Z_NEAR: f32 = 0.1;

/// Far clip plane distance.
const Z_FAR: f32 = 10.0;

/// Model, view, and projection matrices for the mesh pipeline.
///
/// # Memory Layout
///
/// `#[repr(C)]` with three column-major `Mat4` fields matches the shader's
/// uniform block exactly:
///
/// - Offset 0: model matrix (64 bytes)
/// - Offset 64: view matrix (64 bytes)
/// - Offset 128: projection matrix (64 bytes)
/// - Total size: 192 bytes, no padding
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct TransformUbo {
    /// Object-to-world transform.
    pub model: Mat4,
    /// World-to-camera transform.
    pub view: Mat4,
    /// Camera-to-clip transform, Y flipped for Vulkan.
    pub proj: Mat4,
}

impl TransformUbo {
    /// Size of the struct in bytes, for buffer creation and descriptor ranges.
    pub const SIZE: vk::DeviceSize = std::mem::size_of::<Self>() as vk::DeviceSize;

    /// Transforms for a model spinning about +Z under a fixed camera.
    ///
    /// The rotation angle comes from elapsed wall time, so the spin rate is
    /// independent of frame rate. The projection takes the current swapchain
    /// dimensions so the aspect ratio tracks window resizes, and flips Y to
    /// map glam's GL-style clip space onto Vulkan's downward-pointing Y axis.
    pub fn spinning(elapsed_secs: f32, width: u32, height: u32) -> Self {
        let angle = (SPIN_DEGREES_PER_SEC * elapsed_secs).to_radians();
        let model = Mat4::from_rotation_z(angle);

        let view = Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Z);

        let aspect = width as f32 / height.max(1) as f32;
        let mut proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR);
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }

    /// Returns the UBO as raw bytes for uniform buffer writes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_ubo_size() {
        // 3 Mat4 (3 * 64) = 192 bytes
        assert_eq!(std::mem::size_of::<TransformUbo>(), 192);
        assert_eq!(TransformUbo::SIZE, 192);
    }

    #[test]
    fn test_transform_ubo_offsets() {
        use std::mem::offset_of;

        assert_eq!(offset_of!(TransformUbo, model), 0);
        assert_eq!(offset_of!(TransformUbo, view), 64);
        assert_eq!(offset_of!(TransformUbo, proj), 128);
    }

    #[test]
    fn test_transform_ubo_alignment() {
        // Mat4 requires 16-byte alignment on the GPU side as well
        assert_eq!(std::mem::align_of::<TransformUbo>(), 16);
    }

    #[test]
    fn test_as_bytes_covers_whole_struct() {
        let ubo = TransformUbo::spinning(1.5, 800, 600);
        assert_eq!(ubo.as_bytes().len(), 192);
    }

    #[test]
    fn test_model_starts_at_identity() {
        let ubo = TransformUbo::spinning(0.0, 800, 600);
        assert!(ubo.model.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn test_model_completes_a_turn_in_four_seconds() {
        // 90 degrees per second, so 4 seconds is a full revolution
        let ubo = TransformUbo::spinning(4.0, 800, 600);
        assert!(ubo.model.abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn test_projection_flips_y() {
        let ubo = TransformUbo::spinning(0.0, 800, 600);
        assert!(ubo.proj.y_axis.y < 0.0);
    }

    #[test]
    fn test_projection_tracks_aspect_ratio() {
        let square = TransformUbo::spinning(0.0, 800, 800);
        let wide = TransformUbo::spinning(0.0, 1600, 800);

        // Doubling the width halves the horizontal scale
        assert!((wide.proj.x_axis.x * 2.0 - square.proj.x_axis.x).abs() < 1e-6);
        assert!((wide.proj.y_axis.y - square.proj.y_axis.y).abs() < 1e-6);
    }

    #[test]
    fn test_zero_height_does_not_panic() {
        let ubo = TransformUbo::spinning(0.0, 800, 0);
        assert!(ubo.proj.x_axis.x.is_finite());
    }

    #[test]
    fn test_view_is_constant_over_time() {
        let early = TransformUbo::spinning(0.0, 800, 600);
        let late = TransformUbo::spinning(10.0, 800, 600);
        assert!(early.view.abs_diff_eq(late.view, 0.0));
    }
}
