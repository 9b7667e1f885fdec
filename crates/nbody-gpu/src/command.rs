//! Command buffer management.

use crate::context::GpuContext;
use crate::error::{Result, VkCheck};
use crate::memory::GpuBuffer;
use ash::vk;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = device
            .create_command_pool(&create_info, None)
            .checked("vkCreateCommandPool")?;

        Ok(Self { pool })
    }

    /// Allocate a single command buffer.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffer(
        &self,
        device: &ash::Device,
        level: vk::CommandBufferLevel,
    ) -> Result<vk::CommandBuffer> {
        let mut buffers = self.allocate_command_buffers(device, level, 1)?;
        buffers
            .pop()
            .ok_or_else(|| crate::GpuError::InvalidState("no command buffer allocated".into()))
    }

    /// Allocate multiple command buffers.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffers(
        &self,
        device: &ash::Device,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(level)
            .command_buffer_count(count);

        device
            .allocate_command_buffers(&alloc_info)
            .checked("vkAllocateCommandBuffers")
    }

    /// Return command buffers to the pool.
    ///
    /// # Safety
    /// None of the buffers may be pending execution.
    pub unsafe fn free_command_buffers(&self, device: &ash::Device, buffers: &[vk::CommandBuffer]) {
        if !buffers.is_empty() {
            device.free_command_buffers(self.pool, buffers);
        }
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    device
        .begin_command_buffer(cmd, &begin_info)
        .checked("vkBeginCommandBuffer")
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device
        .end_command_buffer(cmd)
        .checked("vkEndCommandBuffer")
}

/// Submit one command buffer to a queue.
///
/// # Safety
/// All handles must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
#[track_caller]
pub unsafe fn submit_command_buffers(
    device: &ash::Device,
    queue: vk::Queue,
    command_buffers: &[vk::CommandBuffer],
    wait_semaphores: &[vk::Semaphore],
    wait_stages: &[vk::PipelineStageFlags],
    signal_semaphores: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    let submit_info = vk::SubmitInfo::default()
        .command_buffers(command_buffers)
        .wait_semaphores(wait_semaphores)
        .wait_dst_stage_mask(wait_stages)
        .signal_semaphores(signal_semaphores);

    device
        .queue_submit(queue, &[submit_info], fence)
        .checked("vkQueueSubmit")
}

/// Record, submit and wait for a one-shot command buffer, then free it.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn execute_single_time_commands<F>(
    device: &ash::Device,
    pool: &CommandPool,
    queue: vk::Queue,
    f: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer) -> Result<()>,
{
    let cmd = pool.allocate_command_buffer(device, vk::CommandBufferLevel::PRIMARY)?;

    let result = (|| {
        begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        f(cmd)?;
        end_command_buffer(device, cmd)?;

        let cmd_buffers = [cmd];
        let submit_info = vk::SubmitInfo::default().command_buffers(&cmd_buffers);
        device
            .queue_submit(queue, &[submit_info], vk::Fence::null())
            .checked("vkQueueSubmit")?;
        device.queue_wait_idle(queue).checked("vkQueueWaitIdle")
    })();

    pool.free_command_buffers(device, &[cmd]);
    result
}

/// Copy `data` into a device-local buffer through a temporary staging buffer.
///
/// # Safety
/// `dst` must have been created with `TRANSFER_DST` usage and be at least `data.len()` bytes.
pub unsafe fn upload_to_buffer(
    gpu: &GpuContext,
    pool: &CommandPool,
    queue: vk::Queue,
    dst: &GpuBuffer,
    data: &[u8],
) -> Result<()> {
    let device = gpu.device();
    let mut staging = gpu.allocator().lock().create_buffer(
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        data.len() as u64,
        Some(data),
        "staging",
    )?;

    let result = execute_single_time_commands(device, pool, queue, |cmd| {
        let region = vk::BufferCopy::default().size(data.len() as u64);
        device.cmd_copy_buffer(cmd, staging.buffer, dst.buffer, &[region]);
        Ok(())
    });

    gpu.allocator().lock().free_buffer(&mut staging)?;
    result
}
