//! Vulkan instance management.
//!
//! This module handles VkInstance creation, validation layers, and debug messengers.
//!
//! # Overview
//!
//! The [`Instance`] struct provides a safe abstraction over the Vulkan instance,
//! including optional validation layer support for debugging purposes. The
//! caller supplies the surface extensions its windowing backend requires;
//! this module verifies they are actually supported before creating the
//! instance and fails hard when they are not.
//!
//! # Example
//!
//! ```no_run
//! use ember_rhi::instance::Instance;
//!
//! // Surface extensions normally come from the windowing layer.
//! let surface_extensions = [ash::khr::surface::NAME.as_ptr()];
//! let instance = Instance::new("demo", cfg!(debug_assertions), &surface_extensions)
//!     .expect("Failed to create Vulkan instance");
//!
//! let vk_instance = instance.handle();
//! let entry = instance.entry();
//! ```

use std::ffi::{CStr, CString};

use ash::{Entry, vk};
use tracing::{error, info, warn};

use crate::error::{RhiError, RhiResult};

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Minimum Vulkan API version this engine targets.
pub const MIN_API_VERSION: u32 = vk::API_VERSION_1_3;

/// Vulkan instance wrapper with optional validation layer support.
///
/// This struct manages the lifetime of the Vulkan instance and its associated
/// debug utilities. When dropped, it properly cleans up all Vulkan resources.
pub struct Instance {
    /// Vulkan entry point loader
    entry: Entry,
    /// Vulkan instance handle
    instance: ash::Instance,
    /// Debug utils extension loader (only present when validation is enabled)
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    /// Debug messenger handle (only present when validation is enabled)
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates a new Vulkan instance.
    ///
    /// # Arguments
    ///
    /// * `app_name` - Application name reported in `VkApplicationInfo`
    /// * `enable_validation` - If true, enables the validation layer and a debug messenger
    /// * `surface_extensions` - Instance extensions the windowing backend requires
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Validation is requested but the layer is not installed
    /// - A required surface extension is not supported
    /// - Instance creation fails
    /// - Debug messenger setup fails (when validation is enabled)
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        surface_extensions: &[*const i8],
    ) -> RhiResult<Self> {
        let entry = Entry::linked();

        // Requesting validation without the layer installed is a hard error,
        // not a silent downgrade.
        if enable_validation && !Self::is_validation_layer_available(&entry)? {
            return Err(RhiError::MissingLayer(
                VALIDATION_LAYER_NAME.to_string_lossy().into_owned(),
            ));
        }

        Self::check_extension_support(&entry, surface_extensions)?;

        let app_name_c = CString::new(app_name)
            .map_err(|_| RhiError::InvalidHandle("Application name contains NUL".to_string()))?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name_c)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"ember")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(MIN_API_VERSION);

        let mut extensions = surface_extensions.to_vec();
        if enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers = if enable_validation {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(RhiError::from)?
        };

        info!("Vulkan instance created successfully (API version 1.3)");

        // Set up debug messenger if validation is enabled
        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger = Self::setup_debug_messenger(&debug_utils)?;
            info!("Validation layer and debug messenger enabled");
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether validation layers are enabled.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    /// Checks if the Khronos validation layer is available.
    fn is_validation_layer_available(entry: &Entry) -> RhiResult<bool> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };
        Ok(contains_layer(&available_layers, VALIDATION_LAYER_NAME))
    }

    /// Verifies that every required extension is supported by this Vulkan
    /// implementation.
    fn check_extension_support(entry: &Entry, required: &[*const i8]) -> RhiResult<()> {
        let available = unsafe { entry.enumerate_instance_extension_properties(None)? };

        for &ptr in required {
            // SAFETY: required extension names are static NUL-terminated
            // strings provided by ash / the windowing backend.
            let name = unsafe { CStr::from_ptr(ptr) };
            if !contains_extension(&available, name) {
                return Err(RhiError::MissingExtension(
                    name.to_string_lossy().into_owned(),
                ));
            }
        }

        Ok(())
    }

    /// Sets up the debug messenger for validation layer callbacks.
    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> RhiResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(RhiError::from)?
        };

        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            // Destroy debug messenger before instance
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Returns true if `name` appears in the enumerated layer list.
fn contains_layer(available: &[vk::LayerProperties], name: &CStr) -> bool {
    available.iter().any(|layer| {
        let layer_name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        layer_name == name
    })
}

/// Returns true if `name` appears in the enumerated extension list.
fn contains_extension(available: &[vk::ExtensionProperties], name: &CStr) -> bool {
    available.iter().any(|ext| {
        let ext_name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
        ext_name == name
    })
}

/// Debug callback function for validation layer messages.
///
/// This function is called by the Vulkan validation layer when it detects
/// issues with API usage. Messages are logged using the tracing crate.
///
/// # Safety
///
/// This function is called from the Vulkan driver and must follow the
/// Vulkan specification for debug callbacks.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            error!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            info!("[Vulkan {}] {}", type_str, message);
        }
        _ => {
            // VERBOSE level - use info for now
            info!("[Vulkan {} Verbose] {}", type_str, message);
        }
    }

    // Returning VK_FALSE indicates the call should not be aborted
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer_props(name: &CStr) -> vk::LayerProperties {
        let mut props = vk::LayerProperties::default();
        for (dst, src) in props.layer_name.iter_mut().zip(name.to_bytes_with_nul()) {
            *dst = *src as std::ffi::c_char;
        }
        props
    }

    fn extension_props(name: &CStr) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, src) in props.extension_name.iter_mut().zip(name.to_bytes_with_nul()) {
            *dst = *src as std::ffi::c_char;
        }
        props
    }

    #[test]
    fn test_contains_layer_finds_match() {
        let available = [layer_props(c"VK_LAYER_other"), layer_props(VALIDATION_LAYER_NAME)];
        assert!(contains_layer(&available, VALIDATION_LAYER_NAME));
    }

    #[test]
    fn test_contains_layer_rejects_missing() {
        let available = [layer_props(c"VK_LAYER_other")];
        assert!(!contains_layer(&available, VALIDATION_LAYER_NAME));
    }

    #[test]
    fn test_contains_extension_finds_match() {
        let available = [
            extension_props(c"VK_KHR_surface"),
            extension_props(c"VK_KHR_wayland_surface"),
        ];
        assert!(contains_extension(&available, c"VK_KHR_surface"));
        assert!(!contains_extension(&available, c"VK_EXT_debug_utils"));
    }

    #[test]
    fn test_contains_extension_requires_exact_name() {
        // Prefix matches must not count
        let available = [extension_props(c"VK_KHR_surface_extra")];
        assert!(!contains_extension(&available, c"VK_KHR_surface"));
    }
}
