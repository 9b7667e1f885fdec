//! GPU memory management.
//!
//! Every buffer and image is backed by a `gpu-allocator` allocation. Before allocating,
//! the requested property flags are checked against the device memory types with a
//! first-match scan so that an impossible request fails with a precise error instead of an
//! opaque allocator message.

use crate::cleanup::Rollback;
use crate::error::{GpuError, Result, VkCheck};
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// Index of the first memory type allowed by `type_bits` whose flags contain `properties`.
pub fn find_memory_type_index(
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
    memory: &vk::PhysicalDeviceMemoryProperties,
) -> Option<u32> {
    memory
        .memory_types
        .iter()
        .take(memory.memory_type_count as usize)
        .enumerate()
        .find(|(index, memory_type)| {
            type_bits & (1 << index) != 0 && memory_type.property_flags.contains(properties)
        })
        .map(|(index, _)| index as u32)
}

/// Allocator location matching a set of property flags.
pub fn memory_location(properties: vk::MemoryPropertyFlags) -> MemoryLocation {
    if properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
        if properties.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL) {
            MemoryLocation::CpuToGpu
        } else if properties.contains(vk::MemoryPropertyFlags::HOST_CACHED) {
            MemoryLocation::GpuToCpu
        } else {
            MemoryLocation::CpuToGpu
        }
    } else {
        MemoryLocation::GpuOnly
    }
}

/// Creation and destruction counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocationStats {
    pub buffers_created: u64,
    pub buffers_freed: u64,
    pub images_created: u64,
    pub images_freed: u64,
}

impl AllocationStats {
    /// Buffers created and not yet freed.
    pub fn live_buffers(&self) -> u64 {
        self.buffers_created - self.buffers_freed
    }

    /// Images created and not yet freed.
    pub fn live_images(&self) -> u64 {
        self.images_created - self.images_freed
    }
}

/// GPU memory allocator wrapper.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    stats: AllocationStats,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: cfg!(debug_assertions),
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        let memory_properties = instance.get_physical_device_memory_properties(physical_device);

        Ok(Self {
            allocator: Some(allocator),
            device,
            memory_properties,
            stats: AllocationStats::default(),
        })
    }

    /// Creation/free counters since startup.
    pub fn stats(&self) -> AllocationStats {
        self.stats
    }

    fn inner(&mut self) -> Result<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator not initialized".to_string()))
    }

    fn ensure_memory_type(
        &self,
        requirements: &vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<()> {
        find_memory_type_index(requirements.memory_type_bits, properties, &self.memory_properties)
            .map(|_| ())
            .ok_or(GpuError::NoCompatibleMemoryType {
                type_bits: requirements.memory_type_bits,
                properties,
            })
    }

    /// Return an allocation that never got bound.
    fn release(&mut self, allocation: Allocation, name: &str) {
        let freed = self.inner().and_then(|allocator| {
            allocator
                .free(allocation)
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))
        });
        if let Err(err) = freed {
            tracing::warn!(name, %err, "Failed to release unbound allocation");
        }
    }

    /// Allocate a buffer.
    ///
    /// With `initial`, the bytes are copied into the mapped allocation before the buffer is
    /// returned; this requires `HOST_VISIBLE` properties.
    pub fn create_buffer(
        &mut self,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
        size: u64,
        initial: Option<&[u8]>,
        name: &str,
    ) -> Result<GpuBuffer> {
        if initial.is_some() && !properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(GpuError::InvalidState(format!(
                "buffer {name} has initial data but is not host visible"
            )));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .checked("vkCreateBuffer")?;
        let mut rollback = Rollback::new();
        let device = Arc::clone(&self.device);
        rollback.push(move || unsafe { device.destroy_buffer(buffer, None) });

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        self.ensure_memory_type(&requirements, properties)?;

        let allocation = self
            .inner()?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: memory_location(properties),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        let bound = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .checked("vkBindBufferMemory")
        };
        if let Err(err) = bound {
            self.release(allocation, name);
            return Err(err);
        }
        rollback.commit();

        self.stats.buffers_created += 1;
        tracing::debug!(name, size, ?usage, "Created buffer");

        let mut gpu_buffer = GpuBuffer {
            buffer,
            allocation: Some(allocation),
            size,
        };
        if let Some(bytes) = initial {
            if let Err(err) = gpu_buffer.write_bytes(0, bytes) {
                self.free_buffer(&mut gpu_buffer)?;
                return Err(err);
            }
        }

        Ok(gpu_buffer)
    }

    /// Free a buffer allocation.
    pub fn free_buffer(&mut self, buffer: &mut GpuBuffer) -> Result<()> {
        if let Some(allocation) = buffer.allocation.take() {
            self.inner()?
                .free(allocation)
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;
            self.stats.buffers_freed += 1;
        }

        unsafe {
            self.device.destroy_buffer(buffer.buffer, None);
        }
        buffer.buffer = vk::Buffer::null();
        buffer.size = 0;

        Ok(())
    }

    /// Allocate an image in `initial_layout` (UNDEFINED or PREINITIALIZED).
    pub fn create_image(
        &mut self,
        create_info: &vk::ImageCreateInfo,
        properties: vk::MemoryPropertyFlags,
        name: &str,
    ) -> Result<GpuImage> {
        let image = unsafe { self.device.create_image(create_info, None) }
            .checked("vkCreateImage")?;
        let mut rollback = Rollback::new();
        let device = Arc::clone(&self.device);
        rollback.push(move || unsafe { device.destroy_image(image, None) });

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        self.ensure_memory_type(&requirements, properties)?;

        let allocation = self
            .inner()?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: memory_location(properties),
                linear: create_info.tiling == vk::ImageTiling::LINEAR,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        let bound = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .checked("vkBindImageMemory")
        };
        if let Err(err) = bound {
            self.release(allocation, name);
            return Err(err);
        }
        rollback.commit();

        self.stats.images_created += 1;
        tracing::debug!(
            name,
            width = create_info.extent.width,
            height = create_info.extent.height,
            format = ?create_info.format,
            "Created image"
        );

        Ok(GpuImage {
            image,
            allocation: Some(allocation),
            format: create_info.format,
            extent: create_info.extent,
            mip_levels: create_info.mip_levels,
            array_layers: create_info.array_layers,
            layout: create_info.initial_layout,
        })
    }

    /// Free an image allocation.
    pub fn free_image(&mut self, image: &mut GpuImage) -> Result<()> {
        if let Some(allocation) = image.allocation.take() {
            self.inner()?
                .free(allocation)
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;
            self.stats.images_freed += 1;
        }

        unsafe {
            self.device.destroy_image(image.image, None);
        }
        image.image = vk::Image::null();
        image.layout = vk::ImageLayout::UNDEFINED;

        Ok(())
    }
}

impl GpuAllocator {
    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed.
    /// Any remaining allocations will be freed (and logged as leaks).
    pub fn shutdown(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            let AllocationStats {
                buffers_created,
                buffers_freed,
                images_created,
                images_freed,
            } = self.stats;
            tracing::debug!(
                buffers_created,
                buffers_freed,
                images_created,
                images_freed,
                "Shutting down allocator"
            );
            drop(allocator);
        }
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A GPU buffer with its allocation.
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: u64,
}

impl GpuBuffer {
    /// Map the buffer memory for CPU access.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .map(|p| p.as_ptr().cast::<u8>())
    }

    /// Write data to the start of the buffer (must be host-visible).
    pub fn write<T: Pod>(&self, data: &[T]) -> Result<()> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }

    /// Write raw bytes to the buffer at the given offset (must be host-visible).
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let ptr = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| GpuError::InvalidState("Offset overflow".to_string()))?;
        if end > self.size {
            return Err(GpuError::InvalidState(
                "Data range too large for buffer".to_string(),
            ));
        }

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
        }

        Ok(())
    }
}

/// A GPU image with its allocation and tracked layout.
pub struct GpuImage {
    pub image: vk::Image,
    pub allocation: Option<Allocation>,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    /// Layout after the last recorded transition
    pub layout: vk::ImageLayout,
}

impl GpuImage {
    /// Width and height as a 2D extent.
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    /// Range covering every mip level and layer for `aspect`.
    pub fn full_range(&self, aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(aspect)
            .base_mip_level(0)
            .level_count(self.mip_levels)
            .base_array_layer(0)
            .layer_count(self.array_layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
        }
        props
    }

    #[test]
    fn first_matching_type_wins() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL
                | vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        assert_eq!(
            find_memory_type_index(0b111, vk::MemoryPropertyFlags::HOST_VISIBLE, &props),
            Some(1)
        );
        assert_eq!(
            find_memory_type_index(0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL, &props),
            Some(0)
        );
    }

    #[test]
    fn type_bits_exclude_candidates() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        assert_eq!(
            find_memory_type_index(0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL, &props),
            Some(1)
        );
    }

    #[test]
    fn no_compatible_type() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert_eq!(
            find_memory_type_index(0b1, vk::MemoryPropertyFlags::HOST_VISIBLE, &props),
            None
        );
        // types beyond memory_type_count are ignored
        assert_eq!(
            find_memory_type_index(u32::MAX, vk::MemoryPropertyFlags::HOST_CACHED, &props),
            None
        );
    }

    #[test]
    fn location_follows_property_flags() {
        assert_eq!(
            memory_location(vk::MemoryPropertyFlags::DEVICE_LOCAL),
            MemoryLocation::GpuOnly
        );
        assert_eq!(
            memory_location(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            ),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            memory_location(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_CACHED
            ),
            MemoryLocation::GpuToCpu
        );
    }

    #[test]
    fn stats_count_live_resources() {
        let stats = AllocationStats {
            buffers_created: 5,
            buffers_freed: 3,
            images_created: 2,
            images_freed: 2,
        };
        assert_eq!(stats.live_buffers(), 2);
        assert_eq!(stats.live_images(), 0);
    }
}
