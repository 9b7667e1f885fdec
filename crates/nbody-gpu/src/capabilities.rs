//! GPU capability detection.

use ash::vk;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Queues the engine needs from its single queue family.
pub const REQUIRED_QUEUE_FLAGS: vk::QueueFlags = vk::QueueFlags::from_raw(
    vk::QueueFlags::GRAPHICS.as_raw()
        | vk::QueueFlags::COMPUTE.as_raw()
        | vk::QueueFlags::TRANSFER.as_raw(),
);

/// Number of queues taken from the family (graphics and compute).
pub const REQUIRED_QUEUE_COUNT: u32 = 2;

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,

    /// Device-local memory in MB
    pub device_local_memory_mb: u64,

    /// Nanoseconds per timestamp tick
    pub timestamp_period: f32,
    /// Valid timestamp bits of the chosen queue family (0 = unsupported)
    pub timestamp_valid_bits: u32,

    /// Index of the family providing both queues, if any
    pub queue_family: Option<u32>,

    /// Sampler anisotropy support
    pub supports_sampler_anisotropy: bool,
    /// Maximum compute workgroup size
    pub max_compute_workgroup_size: [u32; 3],
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);
        let features = instance.get_physical_device_features(physical_device);
        let families = instance.get_physical_device_queue_family_properties(physical_device);

        let vendor = GpuVendor::from_vendor_id(properties.vendor_id);
        let device_name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        let queue_family = find_queue_family(&families);
        let timestamp_valid_bits = queue_family
            .map_or(0, |index| families[index as usize].timestamp_valid_bits);

        Self {
            vendor,
            device_name,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            device_local_memory_mb,
            timestamp_period: properties.limits.timestamp_period,
            timestamp_valid_bits,
            queue_family,
            supports_sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            max_compute_workgroup_size: properties.limits.max_compute_work_group_size,
        }
    }

    /// Whether the graphics and compute queues can write timestamps.
    pub fn supports_timestamps(&self) -> bool {
        self.timestamp_valid_bits > 0
    }

    /// Check if the GPU meets minimum requirements for the engine.
    pub fn meets_requirements(&self) -> bool {
        let [x, _, _] = self.max_compute_workgroup_size;
        self.queue_family.is_some() && x >= nbody_core::constants::WORK_GROUP_SIZE[0]
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

/// First queue family that supports graphics, compute and transfer and has two queues.
pub fn find_queue_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    families
        .iter()
        .position(|family| {
            family.queue_flags.contains(REQUIRED_QUEUE_FLAGS)
                && family.queue_count >= REQUIRED_QUEUE_COUNT
        })
        .map(|index| index as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            timestamp_valid_bits: 64,
            ..Default::default()
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn queue_family_needs_all_three_capabilities() {
        let families = [
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 8),
            family(REQUIRED_QUEUE_FLAGS, 16),
        ];
        assert_eq!(find_queue_family(&families), Some(1));
    }

    #[test]
    fn queue_family_needs_two_queues() {
        let families = [family(REQUIRED_QUEUE_FLAGS, 1)];
        assert_eq!(find_queue_family(&families), None);

        let families = [family(REQUIRED_QUEUE_FLAGS, 1), family(REQUIRED_QUEUE_FLAGS, 2)];
        assert_eq!(find_queue_family(&families), Some(1));
    }

    #[test]
    fn no_families_means_no_device() {
        assert_eq!(find_queue_family(&[]), None);
    }
}
