//! Vulkan logical device and queue management.
//!
//! This module handles VkDevice creation, queue retrieval, and gpu-allocator initialization.
//!
//! # Overview
//!
//! The [`Device`] struct provides a safe abstraction over the Vulkan logical device,
//! including:
//! - Queue family resolution for graphics and presentation against a surface
//! - Logical device creation with required extensions and features
//! - Memory allocation via gpu-allocator
//!
//! The requested feature set is fixed and explicit; there is no negotiation.
//! Dynamic rendering and extended dynamic state are enabled only when the
//! engine will actually run the dynamic-rendering strategy.
//!
//! # Example
//!
//! ```no_run
//! use ember_rhi::instance::Instance;
//! use ember_rhi::physical_device::select_physical_device;
//! use ember_rhi::device::{Device, DEVICE_EXTENSIONS};
//! use ash::vk;
//!
//! let surface_extensions = [ash::khr::surface::NAME.as_ptr()];
//! let instance = Instance::new("demo", false, &surface_extensions)
//!     .expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let physical_device_info = select_physical_device(instance.handle(), DEVICE_EXTENSIONS)
//!     .expect("No suitable GPU found");
//!
//! let device = Device::new(
//!     &instance,
//!     &physical_device_info,
//!     surface,
//!     &surface_loader,
//!     physical_device_info.supports_dynamic_rendering,
//! )
//! .expect("Failed to create logical device");
//!
//! let graphics_queue = device.graphics_queue();
//! let present_queue = device.present_queue();
//! ```

use std::ffi::CStr;
use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, info};

use crate::error::RhiResult;
use crate::instance::Instance;
use crate::physical_device::{resolve_queue_families, PhysicalDeviceInfo, QueueFamilyIndices};

/// Required device extensions.
pub const DEVICE_EXTENSIONS: &[&CStr] = &[
    ash::khr::swapchain::NAME,
    ash::khr::spirv_1_4::NAME,
    ash::khr::synchronization2::NAME,
    ash::khr::create_renderpass2::NAME,
];

/// Vulkan logical device wrapper.
///
/// This struct manages the lifetime of the Vulkan logical device and its associated
/// resources including queues and the memory allocator.
///
/// # Thread Safety
///
/// The [`Device`] is designed to be shared across threads using `Arc`. The internal
/// allocator is protected by a `Mutex` for thread-safe memory allocation.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// GPU memory allocator (thread-safe via Mutex).
    allocator: Mutex<Allocator>,
    /// Graphics queue handle.
    graphics_queue: vk::Queue,
    /// Presentation queue handle.
    present_queue: vk::Queue,
    /// Queue family assignment resolved for the active surface.
    queue_families: QueueFamilyIndices,
}

impl Device {
    /// Creates a new logical device.
    ///
    /// Queue families are resolved against `surface` with the fallback order
    /// documented on
    /// [`resolve_queue_families`](crate::physical_device::resolve_queue_families),
    /// then one queue per distinct family is created. The enabled feature set
    /// is sampler anisotropy, synchronization2, and, when
    /// `use_dynamic_rendering` is set, dynamic rendering plus extended
    /// dynamic state.
    ///
    /// It also initializes the gpu-allocator for memory management.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance
    /// * `physical_device_info` - Information about the selected physical device
    /// * `surface` - Surface the present queue must support
    /// * `surface_loader` - The surface extension loader
    /// * `use_dynamic_rendering` - Whether the dynamic-rendering strategy was chosen
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No queue family combination supports graphics and presentation
    /// - Device creation fails
    /// - Allocator initialization fails
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        use_dynamic_rendering: bool,
    ) -> RhiResult<Arc<Self>> {
        let queue_families = resolve_queue_families(
            instance.handle(),
            physical_device_info.device,
            surface,
            surface_loader,
        )?;

        // Create queue create infos for unique queue families
        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .synchronization2(true)
            .dynamic_rendering(use_dynamic_rendering);

        let mut extended_dynamic_state = vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::default()
            .extended_dynamic_state(use_dynamic_rendering);

        // Convert extension names to raw pointers
        let extension_names: Vec<*const i8> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut features_1_3)
            .push_next(&mut extended_dynamic_state);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s), dynamic rendering: {}",
            DEVICE_EXTENSIONS.len(),
            use_dynamic_rendering
        );

        // Retrieve queues
        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics_family, 0) };
        debug!(
            "Graphics queue retrieved from family {}",
            queue_families.graphics_family
        );

        let present_queue = unsafe { device.get_device_queue(queue_families.present_family, 0) };
        debug!(
            "Present queue retrieved from family {}",
            queue_families.present_family
        );

        // Initialize gpu-allocator
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            allocator: Mutex::new(allocator),
            graphics_queue,
            present_queue,
            queue_families,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the presentation queue handle.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Returns the queue family assignment.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Returns a reference to the GPU memory allocator.
    ///
    /// The allocator is protected by a Mutex for thread-safe access.
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Submits work to the graphics queue.
    ///
    /// # Arguments
    ///
    /// * `submits` - Submission batches
    /// * `fence` - Fence to signal on completion (may be null)
    ///
    /// # Errors
    ///
    /// Returns an error if the submission fails.
    pub fn submit_graphics(&self, submits: &[vk::SubmitInfo], fence: vk::Fence) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submits, fence)?
        };
        Ok(())
    }

    /// Waits for the device to become idle.
    ///
    /// This function blocks until all outstanding operations on all queues
    /// have completed. Useful before destroying resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            // Wait for all operations to complete before cleanup
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // Allocator is dropped automatically when the Mutex is dropped
            // The allocator should be empty at this point (all allocations freed)

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: Device is Send+Sync because:
// - ash::Device is Send+Sync
// - vk::PhysicalDevice and vk::Queue are Copy types (handles)
// - Allocator is protected by Mutex
// - QueueFamilyIndices is Copy
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_extensions_defined() {
        // Verify required extensions are defined
        assert_eq!(DEVICE_EXTENSIONS.len(), 4);
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::spirv_1_4::NAME));
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::synchronization2::NAME));
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::create_renderpass2::NAME));
    }

    #[test]
    fn test_device_is_send_sync() {
        // Compile-time check that Device is Send + Sync
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
