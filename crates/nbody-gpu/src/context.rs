//! GPU context management.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result, VkCheck};
use crate::instance::{create_instance, select_physical_device, DebugMessenger};
use crate::memory::GpuAllocator;
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr};
use std::sync::Arc;

/// Queue priorities of the graphics and compute queues.
const QUEUE_PRIORITIES: [f32; 2] = [1.0, 0.0];

/// Main GPU context holding the device and its two queues.
///
/// Both queues come from one family: index 0 is graphics, index 1 is compute.
pub struct GpuContext {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) debug_messenger: Option<DebugMessenger>,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) capabilities: GpuCapabilities,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub(crate) allocator: Mutex<GpuAllocator>,

    pub(crate) queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) compute_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Memory types and heaps of the physical device.
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the compute queue.
    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    /// Family shared by both queues.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Nanoseconds per timestamp tick.
    pub fn timestamp_period(&self) -> f64 {
        f64::from(self.capabilities.timestamp_period)
    }

    /// Whether timestamp queries produce meaningful values.
    pub fn supports_timestamps(&self) -> bool {
        self.capabilities.supports_timestamps()
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.checked("vkDeviceWaitIdle")
    }

    /// Wait for the graphics queue to drain.
    pub fn wait_graphics_idle(&self) -> Result<()> {
        unsafe { self.device.queue_wait_idle(self.graphics_queue) }.checked("vkQueueWaitIdle")
    }

    /// Wait for the compute queue to drain.
    pub fn wait_compute_idle(&self) -> Result<()> {
        unsafe { self.device.queue_wait_idle(self.compute_queue) }.checked("vkQueueWaitIdle")
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Shutdown allocator BEFORE destroying device
            // This frees all VkDeviceMemory allocations
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            if let Some(messenger) = self.debug_messenger.take() {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
    display: Option<RawDisplayHandle>,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "N-body".to_string(),
            enable_validation: cfg!(debug_assertions),
            display: None,
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Request the surface extensions needed by this display.
    pub fn display(mut self, display: RawDisplayHandle) -> Self {
        self.display = Some(display);
        self
    }

    /// Build the GPU context.
    pub fn build(self) -> Result<GpuContext> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let instance =
            unsafe { create_instance(&entry, &self.app_name, self.enable_validation, self.display) }?;

        let debug_messenger = if self.enable_validation {
            Some(unsafe { DebugMessenger::new(&entry, &instance) }?)
        } else {
            None
        };

        let physical_device = unsafe { select_physical_device(&instance) }?;
        let capabilities = unsafe { GpuCapabilities::query(&instance, physical_device) };

        if !capabilities.meets_requirements() {
            return Err(GpuError::NoSuitableQueueFamily);
        }
        let queue_family = capabilities
            .queue_family
            .ok_or(GpuError::NoSuitableQueueFamily)?;

        tracing::info!("Selected GPU: {}", capabilities.summary());
        if !capabilities.supports_timestamps() {
            tracing::warn!(
                "Queue family {queue_family} has no timestamp support; performance meters will read zero"
            );
        }

        let (device, graphics_queue, compute_queue) =
            unsafe { create_device(&instance, physical_device, queue_family, &capabilities)? };
        let device = Arc::new(device);

        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let allocator = unsafe { GpuAllocator::new(&instance, device.clone(), physical_device) }?;

        Ok(GpuContext {
            entry,
            instance,
            debug_messenger,
            physical_device,
            device,
            capabilities,
            memory_properties,
            allocator: Mutex::new(allocator),
            queue_family,
            graphics_queue,
            compute_queue,
        })
    }
}

/// Required device extensions.
fn required_device_extensions() -> Vec<&'static CStr> {
    vec![
        ash::khr::swapchain::NAME,
        #[cfg(target_os = "macos")]
        ash::khr::portability_subset::NAME,
    ]
}

/// Create the logical device with two queues from `queue_family`.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
    capabilities: &GpuCapabilities,
) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(&QUEUE_PRIORITIES)];

    let extensions = required_device_extensions();
    let extension_names: Vec<*const c_char> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    let features = vk::PhysicalDeviceFeatures::default()
        .sampler_anisotropy(capabilities.supports_sampler_anisotropy);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device = instance
        .create_device(physical_device, &device_create_info, None)
        .checked("vkCreateDevice")?;

    let graphics_queue = device.get_device_queue(queue_family, 0);
    let compute_queue = device.get_device_queue(queue_family, 1);

    tracing::debug!(queue_family, "Created graphics and compute queues");

    Ok((device, graphics_queue, compute_queue))
}
