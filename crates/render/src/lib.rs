//! High-level rendering orchestration.
//!
//! This crate ties the RHI primitives together into a working renderer:
//! render target management, the dynamic-rendering / legacy render pass
//! split, per-frame resource slots, and the frame loop itself.

pub mod error;
pub mod frame;
pub mod renderer;
pub mod strategy;
pub mod targets;
pub mod ubo;

pub use error::{RenderError, RenderResult};
pub use renderer::Renderer;

/// Number of frames the CPU may record before waiting on the GPU.
///
/// Two keeps the CPU one frame ahead without the latency of a deeper
/// pipeline. Per-frame resources (command buffers, uniform buffers,
/// fences) are arrays of this size.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
