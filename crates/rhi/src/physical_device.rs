//! Physical device (GPU) selection.
//!
//! This module handles GPU enumeration and selection based on capabilities.
//!
//! # Overview
//!
//! The selection process walks the enumerated GPUs in order and picks the
//! first one that satisfies every requirement:
//! 1. API version at least 1.3
//! 2. At least one graphics-capable queue family
//! 3. Every required device extension enumerable
//! 4. Sampler anisotropy supported
//!
//! Dynamic rendering and extended dynamic state are probed at the same time
//! but are not hard requirements; their availability decides which attachment
//! strategy the pipeline uses. Queue family resolution against a concrete
//! surface happens later, at logical device creation, via
//! [`resolve_queue_families`].
//!
//! # Example
//!
//! ```no_run
//! use ember_rhi::instance::Instance;
//! use ember_rhi::physical_device::select_physical_device;
//! use ember_rhi::device::DEVICE_EXTENSIONS;
//!
//! let surface_extensions = [ash::khr::surface::NAME.as_ptr()];
//! let instance = Instance::new("demo", false, &surface_extensions)
//!     .expect("Failed to create instance");
//!
//! let device_info = select_physical_device(instance.handle(), DEVICE_EXTENSIONS)
//!     .expect("Failed to select physical device");
//!
//! println!("Selected GPU: {:?}", device_info.device_name());
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};

/// Queue family assignment for rendering and presentation.
///
/// Resolution guarantees both indices are valid; when no combination exists
/// the resolution fails instead of producing a partial assignment. The two
/// indices may name the same family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the queue family used for graphics commands.
    pub graphics_family: u32,
    /// Index of the queue family used for presentation.
    pub present_family: u32,
}

impl QueueFamilyIndices {
    /// Returns true when one family serves both graphics and presentation.
    #[inline]
    pub fn is_unified(&self) -> bool {
        self.graphics_family == self.present_family
    }

    /// Returns the distinct family indices.
    ///
    /// Used when creating the logical device to avoid requesting duplicate
    /// queues from the same family.
    pub fn unique_families(&self) -> Vec<u32> {
        if self.is_unified() {
            vec![self.graphics_family]
        } else {
            vec![self.graphics_family, self.present_family]
        }
    }
}

/// Information about a physical device (GPU).
///
/// This struct contains all the information needed to create a logical device
/// and perform rendering operations.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Whether dynamic rendering and extended dynamic state are both
    /// supported. Decides the attachment strategy unless overridden.
    pub supports_dynamic_rendering: bool,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Returns the total device local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    /// Returns the highest sample count usable for both color and depth
    /// framebuffer attachments.
    pub fn max_usable_sample_count(&self) -> vk::SampleCountFlags {
        let counts = self.properties.limits.framebuffer_color_sample_counts
            & self.properties.limits.framebuffer_depth_sample_counts;
        highest_sample_count(counts)
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("dynamic_rendering", &self.supports_dynamic_rendering)
            .finish()
    }
}

/// Selects the first physical device that satisfies every requirement.
///
/// Devices are visited in enumeration order; there is no scoring. A device
/// qualifies when it supports Vulkan 1.3, exposes a graphics-capable queue
/// family, enumerates all `required_extensions`, and supports sampler
/// anisotropy.
///
/// # Arguments
///
/// * `instance` - The Vulkan instance
/// * `required_extensions` - Device extensions the engine cannot run without
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no device qualifies. This is a
/// configuration/environment error and is not retried.
pub fn select_physical_device(
    instance: &ash::Instance,
    required_extensions: &[&CStr],
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    for device in devices {
        if let Some(selected) = check_device_suitability(instance, device, required_extensions) {
            let (major, minor, patch) = selected.api_version();
            info!(
                "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, {} MB local, dynamic rendering: {}",
                selected.device_name(),
                selected.device_type_name(),
                major,
                minor,
                patch,
                selected.device_local_memory() / (1024 * 1024),
                selected.supports_dynamic_rendering,
            );
            return Ok(selected);
        }
    }

    warn!("No suitable GPU found with required capabilities");
    Err(RhiError::NoSuitableGpu)
}

/// Checks if a physical device is suitable for rendering.
///
/// Returns `Some(PhysicalDeviceInfo)` if the device meets all requirements,
/// or `None` if it doesn't.
fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    required_extensions: &[&CStr],
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let device_name = unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_str()
            .unwrap_or("Unknown")
    };

    if !meets_api_version(properties.api_version) {
        debug!(
            "GPU '{}' skipped: Vulkan 1.3 not supported (version: {}.{})",
            device_name,
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version)
        );
        return None;
    }

    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    if !has_graphics_family(&queue_families) {
        debug!("GPU '{}' skipped: no graphics queue family", device_name);
        return None;
    }

    let available_extensions =
        unsafe { instance.enumerate_device_extension_properties(device) }.ok()?;
    if let Some(missing) = missing_extension(&available_extensions, required_extensions) {
        debug!(
            "GPU '{}' skipped: missing extension {}",
            device_name,
            missing.to_string_lossy()
        );
        return None;
    }

    if features.sampler_anisotropy == vk::FALSE {
        debug!(
            "GPU '{}' skipped: sampler anisotropy not supported",
            device_name
        );
        return None;
    }

    // Probe the optional features that gate the dynamic-rendering strategy.
    let mut vulkan13 = vk::PhysicalDeviceVulkan13Features::default();
    let mut extended_dynamic_state = vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::default();
    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut vulkan13)
        .push_next(&mut extended_dynamic_state);
    unsafe { instance.get_physical_device_features2(device, &mut features2) };

    let supports_dynamic_rendering = vulkan13.dynamic_rendering == vk::TRUE
        && extended_dynamic_state.extended_dynamic_state == vk::TRUE;

    Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        supports_dynamic_rendering,
    })
}

/// Resolves the graphics and present queue families for a surface.
///
/// Resolution order:
/// 1. The first graphics-capable family, if it can also present.
/// 2. Otherwise, any single family supporting both graphics and present
///    (replacing the graphics family found in step 1).
/// 3. Otherwise, any family that can present, paired with the step-1
///    graphics family.
///
/// # Errors
///
/// Returns [`RhiError::NoQueueFamily`] when no combination exists. The
/// device cannot present to this surface at all in that case; the error is
/// fatal and not retried.
pub fn resolve_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<QueueFamilyIndices> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let present_support = |index: u32| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, index, surface)
            .unwrap_or(false)
    };

    resolve_from(&families, present_support).ok_or(RhiError::NoQueueFamily)
}

/// Pure queue family resolution over enumerated family properties.
///
/// `present_support` reports whether a family index can present to the
/// active surface.
fn resolve_from(
    families: &[vk::QueueFamilyProperties],
    present_support: impl Fn(u32) -> bool,
) -> Option<QueueFamilyIndices> {
    let is_graphics = |family: &vk::QueueFamilyProperties| {
        family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
    };

    // Device selection has already verified a graphics family exists, so a
    // miss here is an internal inconsistency rather than a user error.
    let graphics = families.iter().position(is_graphics);
    debug_assert!(
        graphics.is_some(),
        "device selected without a graphics queue family"
    );
    let graphics = graphics? as u32;

    if present_support(graphics) {
        return Some(QueueFamilyIndices {
            graphics_family: graphics,
            present_family: graphics,
        });
    }

    // The preferred graphics family cannot present. Look for one family
    // doing both before settling for a split pair.
    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if is_graphics(family) && present_support(i) {
            return Some(QueueFamilyIndices {
                graphics_family: i,
                present_family: i,
            });
        }
    }

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count > 0 && present_support(i) {
            return Some(QueueFamilyIndices {
                graphics_family: graphics,
                present_family: i,
            });
        }
    }

    None
}

/// Returns true when any family with available queues supports graphics.
fn has_graphics_family(families: &[vk::QueueFamilyProperties]) -> bool {
    families
        .iter()
        .any(|f| f.queue_count > 0 && f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
}

/// Returns the first required extension absent from `available`, if any.
fn missing_extension<'a>(
    available: &[vk::ExtensionProperties],
    required: &[&'a CStr],
) -> Option<&'a CStr> {
    required.iter().copied().find(|&name| {
        !available.iter().any(|ext| {
            let ext_name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
            ext_name == name
        })
    })
}

/// Returns true when `api_version` satisfies the 1.3 minimum.
fn meets_api_version(api_version: u32) -> bool {
    vk::api_version_major(api_version) > 1
        || (vk::api_version_major(api_version) == 1 && vk::api_version_minor(api_version) >= 3)
}

/// Picks the highest single sample count bit present in `counts`.
pub fn highest_sample_count(counts: vk::SampleCountFlags) -> vk::SampleCountFlags {
    let candidates = [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ];

    for candidate in candidates {
        if counts.contains(candidate) {
            return candidate;
        }
    }

    vk::SampleCountFlags::TYPE_1
}

/// Converts a raw sample count to the corresponding flag, rounding down to
/// the nearest supported power of two.
pub fn sample_count_from_u32(samples: u32) -> vk::SampleCountFlags {
    match samples {
        n if n >= 64 => vk::SampleCountFlags::TYPE_64,
        n if n >= 32 => vk::SampleCountFlags::TYPE_32,
        n if n >= 16 => vk::SampleCountFlags::TYPE_16,
        n if n >= 8 => vk::SampleCountFlags::TYPE_8,
        n if n >= 4 => vk::SampleCountFlags::TYPE_4,
        n if n >= 2 => vk::SampleCountFlags::TYPE_2,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

/// Caps the device's maximum usable sample count by a configured ceiling.
pub fn clamp_sample_count(max_usable: vk::SampleCountFlags, ceiling: u32) -> vk::SampleCountFlags {
    let ceiling = sample_count_from_u32(ceiling);
    if ceiling.as_raw() < max_usable.as_raw() {
        ceiling
    } else {
        max_usable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(queue_count: u32, flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count,
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_prefers_graphics_family_for_present() {
        let families = [
            family(1, vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(1, vk::QueueFlags::TRANSFER),
        ];
        let indices = resolve_from(&families, |_| true).unwrap();
        assert_eq!(indices.graphics_family, 0);
        assert_eq!(indices.present_family, 0);
        assert!(indices.is_unified());
    }

    #[test]
    fn test_resolve_switches_to_combined_family() {
        // Family 0 has graphics but cannot present; family 2 does both.
        // The graphics family must move to the combined one.
        let families = [
            family(1, vk::QueueFlags::GRAPHICS),
            family(1, vk::QueueFlags::TRANSFER),
            family(1, vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let indices = resolve_from(&families, |i| i == 2).unwrap();
        assert_eq!(indices.graphics_family, 2);
        assert_eq!(indices.present_family, 2);
    }

    #[test]
    fn test_resolve_falls_back_to_split_pair() {
        // Only a non-graphics family can present.
        let families = [
            family(1, vk::QueueFlags::GRAPHICS),
            family(1, vk::QueueFlags::COMPUTE),
        ];
        let indices = resolve_from(&families, |i| i == 1).unwrap();
        assert_eq!(indices.graphics_family, 0);
        assert_eq!(indices.present_family, 1);
        assert!(!indices.is_unified());
    }

    #[test]
    fn test_resolve_fails_without_present_support() {
        let families = [
            family(1, vk::QueueFlags::GRAPHICS),
            family(1, vk::QueueFlags::COMPUTE),
        ];
        assert!(resolve_from(&families, |_| false).is_none());
    }

    #[test]
    fn test_unique_families() {
        let unified = QueueFamilyIndices {
            graphics_family: 0,
            present_family: 0,
        };
        assert_eq!(unified.unique_families(), vec![0]);

        let split = QueueFamilyIndices {
            graphics_family: 0,
            present_family: 2,
        };
        assert_eq!(split.unique_families(), vec![0, 2]);
    }

    #[test]
    fn test_has_graphics_family_ignores_empty_families() {
        let families = [family(0, vk::QueueFlags::GRAPHICS)];
        assert!(!has_graphics_family(&families));

        let families = [
            family(1, vk::QueueFlags::TRANSFER),
            family(1, vk::QueueFlags::GRAPHICS),
        ];
        assert!(has_graphics_family(&families));
    }

    #[test]
    fn test_missing_extension_reports_first_gap() {
        fn props(name: &CStr) -> vk::ExtensionProperties {
            let mut p = vk::ExtensionProperties::default();
            for (dst, src) in p.extension_name.iter_mut().zip(name.to_bytes_with_nul()) {
                *dst = *src as std::ffi::c_char;
            }
            p
        }

        let available = [props(c"VK_KHR_swapchain"), props(c"VK_KHR_spirv_1_4")];
        assert!(missing_extension(&available, &[c"VK_KHR_swapchain"]).is_none());

        let gap = missing_extension(&available, &[c"VK_KHR_swapchain", c"VK_KHR_synchronization2"]);
        assert_eq!(gap, Some(c"VK_KHR_synchronization2"));
    }

    #[test]
    fn test_meets_api_version() {
        assert!(meets_api_version(vk::API_VERSION_1_3));
        assert!(meets_api_version(vk::make_api_version(0, 1, 4, 0)));
        assert!(!meets_api_version(vk::API_VERSION_1_2));
        assert!(!meets_api_version(vk::API_VERSION_1_0));
    }

    #[test]
    fn test_highest_sample_count() {
        let counts = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4
            | vk::SampleCountFlags::TYPE_8;
        assert_eq!(highest_sample_count(counts), vk::SampleCountFlags::TYPE_8);

        assert_eq!(
            highest_sample_count(vk::SampleCountFlags::TYPE_1),
            vk::SampleCountFlags::TYPE_1
        );

        assert_eq!(
            highest_sample_count(vk::SampleCountFlags::empty()),
            vk::SampleCountFlags::TYPE_1
        );
    }

    #[test]
    fn test_sample_count_from_u32_rounds_down() {
        assert_eq!(sample_count_from_u32(1), vk::SampleCountFlags::TYPE_1);
        assert_eq!(sample_count_from_u32(2), vk::SampleCountFlags::TYPE_2);
        assert_eq!(sample_count_from_u32(7), vk::SampleCountFlags::TYPE_4);
        assert_eq!(sample_count_from_u32(8), vk::SampleCountFlags::TYPE_8);
        assert_eq!(sample_count_from_u32(128), vk::SampleCountFlags::TYPE_64);
        assert_eq!(sample_count_from_u32(0), vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn test_clamp_sample_count() {
        assert_eq!(
            clamp_sample_count(vk::SampleCountFlags::TYPE_8, 4),
            vk::SampleCountFlags::TYPE_4
        );
        assert_eq!(
            clamp_sample_count(vk::SampleCountFlags::TYPE_2, 8),
            vk::SampleCountFlags::TYPE_2
        );
        assert_eq!(
            clamp_sample_count(vk::SampleCountFlags::TYPE_4, 4),
            vk::SampleCountFlags::TYPE_4
        );
    }
}
