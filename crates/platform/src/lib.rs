//! Platform abstraction layer for the ember engine.
//!
//! This crate provides platform-specific functionality:
//! - Window management via winit
//! - Raw window handles for Vulkan surface creation

mod window;

pub use window::{get_required_extensions, Surface, Window};
