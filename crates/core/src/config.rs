//! Engine configuration.
//!
//! All tunables live in one plain struct so the application crate can
//! construct an engine without threading loose parameters through every
//! layer. `Default` reflects the values the engine was developed against.

use std::path::PathBuf;

/// Startup configuration for the engine.
///
/// There is no config-file or CLI layer; the application fills this in
/// (usually via `Default`) and hands it to the renderer once.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Initial window width in logical pixels.
    pub window_width: u32,
    /// Initial window height in logical pixels.
    pub window_height: u32,
    /// Window title.
    pub window_title: String,
    /// Application name reported to the Vulkan driver.
    pub app_name: String,
    /// Enable the Khronos validation layer and a debug messenger.
    ///
    /// Requesting validation when the layer is not installed is a fatal
    /// error, not a silent downgrade.
    pub enable_validation: bool,
    /// Upper bound on the MSAA sample count. The effective count is the
    /// minimum of this and the device's maximum usable count.
    pub msaa_ceiling: u32,
    /// Force the legacy render-pass path even when dynamic rendering is
    /// available.
    pub force_legacy_pass: bool,
    /// Path to the compiled SPIR-V blob holding both shader stages.
    pub shader_path: PathBuf,
    /// Vertex stage entry point inside the blob.
    pub vertex_entry: String,
    /// Fragment stage entry point inside the blob.
    pub fragment_entry: String,
    /// Path to the OBJ model to render.
    pub model_path: PathBuf,
    /// Path to the texture image for the model.
    pub texture_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_width: 1290,
            window_height: 720,
            window_title: "ember".to_string(),
            app_name: "ember".to_string(),
            enable_validation: cfg!(debug_assertions),
            msaa_ceiling: 8,
            force_legacy_pass: false,
            shader_path: PathBuf::from("shaders/mesh.spv"),
            vertex_entry: "vertMain".to_string(),
            fragment_entry: "fragMain".to_string(),
            model_path: PathBuf::from("assets/models/viking_room.obj"),
            texture_path: PathBuf::from("assets/textures/viking_room.png"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window_size() {
        let config = EngineConfig::default();
        assert_eq!(config.window_width, 1290);
        assert_eq!(config.window_height, 720);
    }

    #[test]
    fn test_default_entry_points() {
        let config = EngineConfig::default();
        assert_eq!(config.vertex_entry, "vertMain");
        assert_eq!(config.fragment_entry, "fragMain");
    }
}
