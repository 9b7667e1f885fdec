//! Particle buffers and the two integrator command buffers.
//!
//! The compute buffer is integrated in place. After step two the result is copied into
//! the draw buffer, which the scene pass reads as per-instance vertex data, so the render
//! graph never reads a buffer the integrator is writing.

use crate::descriptor_sets::DescriptorSets;
use crate::pipelines::Pipelines;
use ash::vk;
use nbody_core::particle::{buffer_size, dispatch_group_count};
use nbody_core::perf::{COMPUTE_STEP_ONE_QUERIES, COMPUTE_STEP_TWO_QUERIES};
use nbody_core::Particle;
use nbody_gpu::command::{begin_command_buffer, end_command_buffer, upload_to_buffer, CommandPool};
use nbody_gpu::{ComputePipeline, GpuBuffer, GpuContext, Result, TimestampPool};

/// Usage of the buffer the integrator works on.
pub const COMPUTE_BUFFER_USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::from_raw(
    vk::BufferUsageFlags::TRANSFER_SRC.as_raw()
        | vk::BufferUsageFlags::TRANSFER_DST.as_raw()
        | vk::BufferUsageFlags::STORAGE_BUFFER.as_raw(),
);

/// Usage of the buffer the scene pass draws from.
pub const DRAW_BUFFER_USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::from_raw(
    vk::BufferUsageFlags::VERTEX_BUFFER.as_raw() | vk::BufferUsageFlags::TRANSFER_DST.as_raw(),
);

/// Access masks and stages of one buffer barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferHandoff {
    pub access: (vk::AccessFlags, vk::AccessFlags),
    pub stages: (vk::PipelineStageFlags, vk::PipelineStageFlags),
}

impl BufferHandoff {
    /// The same barrier in the opposite direction.
    pub const fn reversed(self) -> Self {
        Self {
            access: (self.access.1, self.access.0),
            stages: (self.stages.1, self.stages.0),
        }
    }
}

/// Compute buffer: integrator writes to copy source.
pub const COMPUTE_TO_TRANSFER: BufferHandoff = BufferHandoff {
    access: (
        vk::AccessFlags::from_raw(
            vk::AccessFlags::SHADER_WRITE.as_raw() | vk::AccessFlags::SHADER_READ.as_raw(),
        ),
        vk::AccessFlags::TRANSFER_READ,
    ),
    stages: (
        vk::PipelineStageFlags::COMPUTE_SHADER,
        vk::PipelineStageFlags::TRANSFER,
    ),
};

/// Draw buffer: vertex input to copy destination.
pub const VERTEX_TO_TRANSFER: BufferHandoff = BufferHandoff {
    access: (
        vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
        vk::AccessFlags::TRANSFER_WRITE,
    ),
    stages: (
        vk::PipelineStageFlags::VERTEX_SHADER,
        vk::PipelineStageFlags::TRANSFER,
    ),
};

/// Device-local compute and draw copies of the particle array.
pub struct ParticleBuffers {
    pub compute: GpuBuffer,
    pub draw: GpuBuffer,
    count: u32,
}

impl ParticleBuffers {
    /// Allocate both buffers and upload `particles` into each.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn create_and_upload(
        gpu: &GpuContext,
        pool: &CommandPool,
        particles: &[Particle],
    ) -> Result<Self> {
        let count = particles.len() as u32;
        let size = buffer_size(count);
        let bytes: &[u8] = bytemuck::cast_slice(particles);

        let (compute, draw) = {
            let mut allocator = gpu.allocator().lock();
            let compute = allocator.create_buffer(
                COMPUTE_BUFFER_USAGE,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                size,
                None,
                "particles_compute",
            )?;
            let draw = allocator.create_buffer(
                DRAW_BUFFER_USAGE,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                size,
                None,
                "particles_draw",
            )?;
            (compute, draw)
        };

        upload_to_buffer(gpu, pool, gpu.graphics_queue(), &compute, bytes)?;
        upload_to_buffer(gpu, pool, gpu.graphics_queue(), &draw, bytes)?;

        tracing::info!(count, bytes = size, "Uploaded particles");
        Ok(Self {
            compute,
            draw,
            count,
        })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// # Safety
    /// No command buffer using the buffers may be pending.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        let mut allocator = gpu.allocator().lock();
        allocator.free_buffer(&mut self.compute)?;
        allocator.free_buffer(&mut self.draw)
    }
}

unsafe fn buffer_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    buffer: &GpuBuffer,
    handoff: BufferHandoff,
) {
    let barrier = vk::BufferMemoryBarrier::default()
        .src_access_mask(handoff.access.0)
        .dst_access_mask(handoff.access.1)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .buffer(buffer.buffer)
        .offset(0)
        .size(buffer.size);
    device.cmd_pipeline_barrier(
        cmd,
        handoff.stages.0,
        handoff.stages.1,
        vk::DependencyFlags::empty(),
        &[],
        &[barrier],
        &[],
    );
}

/// Everything the integrator binds.
pub struct PhysicsInputs<'a> {
    pub pipelines: &'a Pipelines,
    pub sets: &'a DescriptorSets,
    pub particles: &'a ParticleBuffers,
    pub queries: Option<&'a TimestampPool>,
}

unsafe fn dispatch(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    pipeline: &ComputePipeline,
    inputs: &PhysicsInputs<'_>,
) {
    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, pipeline.pipeline);
    device.cmd_bind_descriptor_sets(
        cmd,
        vk::PipelineBindPoint::COMPUTE,
        pipeline.layout,
        0,
        &[inputs.sets.leapfrog],
        &[],
    );
    device.cmd_dispatch(cmd, dispatch_group_count(inputs.particles.count()), 1, 1);
}

unsafe fn begin_timed(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    queries: Option<&TimestampPool>,
    (begin, _): (u32, u32),
) {
    if let Some(pool) = queries {
        pool.cmd_reset(device, cmd, begin, 2);
        pool.cmd_write(device, cmd, vk::PipelineStageFlags::TOP_OF_PIPE, begin);
    }
}

unsafe fn end_timed(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    queries: Option<&TimestampPool>,
    (_, end): (u32, u32),
) {
    if let Some(pool) = queries {
        pool.cmd_write(device, cmd, vk::PipelineStageFlags::BOTTOM_OF_PIPE, end);
    }
}

/// Record step one: the velocity kick from the current accelerations.
///
/// # Safety
/// `cmd` must be in the initial state and every handle must be valid.
pub unsafe fn record_step_one(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    inputs: &PhysicsInputs<'_>,
) -> Result<()> {
    begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)?;
    begin_timed(device, cmd, inputs.queries, COMPUTE_STEP_ONE_QUERIES);
    dispatch(device, cmd, &inputs.pipelines.leapfrog_step_one, inputs);
    end_timed(device, cmd, inputs.queries, COMPUTE_STEP_ONE_QUERIES);
    end_command_buffer(device, cmd)
}

/// Record step two: the position drift followed by the copy into the draw buffer.
///
/// # Safety
/// `cmd` must be in the initial state and every handle must be valid.
pub unsafe fn record_step_two(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    inputs: &PhysicsInputs<'_>,
) -> Result<()> {
    let particles = inputs.particles;

    begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)?;
    begin_timed(device, cmd, inputs.queries, COMPUTE_STEP_TWO_QUERIES);
    dispatch(device, cmd, &inputs.pipelines.leapfrog_step_two, inputs);

    buffer_barrier(device, cmd, &particles.compute, COMPUTE_TO_TRANSFER);
    buffer_barrier(device, cmd, &particles.draw, VERTEX_TO_TRANSFER);

    let region = vk::BufferCopy::default()
        .src_offset(0)
        .dst_offset(0)
        .size(buffer_size(particles.count()));
    device.cmd_copy_buffer(cmd, particles.compute.buffer, particles.draw.buffer, &[region]);

    buffer_barrier(device, cmd, &particles.compute, COMPUTE_TO_TRANSFER.reversed());
    buffer_barrier(device, cmd, &particles.draw, VERTEX_TO_TRANSFER.reversed());

    end_timed(device, cmd, inputs.queries, COMPUTE_STEP_TWO_QUERIES);
    end_command_buffer(device, cmd)
}

/// The two pre-recorded integrator command buffers.
#[derive(Default)]
pub struct PhysicsCommands {
    buffers: Option<[vk::CommandBuffer; 2]>,
}

impl PhysicsCommands {
    /// Free the previous buffers and record both steps.
    ///
    /// # Safety
    /// None of the previous buffers may be pending, and every handle must be valid.
    pub unsafe fn record(
        &mut self,
        device: &ash::Device,
        pool: &CommandPool,
        inputs: &PhysicsInputs<'_>,
    ) -> Result<()> {
        self.free(device, pool);

        let step_one = pool.allocate_command_buffer(device, vk::CommandBufferLevel::PRIMARY)?;
        let step_two = pool.allocate_command_buffer(device, vk::CommandBufferLevel::PRIMARY)?;
        self.buffers = Some([step_one, step_two]);

        record_step_one(device, step_one, inputs)?;
        record_step_two(device, step_two, inputs)?;

        tracing::debug!(
            particles = inputs.particles.count(),
            groups = dispatch_group_count(inputs.particles.count()),
            "Recorded integrator"
        );
        Ok(())
    }

    pub fn step_one(&self) -> Option<vk::CommandBuffer> {
        self.buffers.map(|[one, _]| one)
    }

    pub fn step_two(&self) -> Option<vk::CommandBuffer> {
        self.buffers.map(|[_, two]| two)
    }

    /// # Safety
    /// None of the buffers may be pending.
    pub unsafe fn free(&mut self, device: &ash::Device, pool: &CommandPool) {
        if let Some(buffers) = self.buffers.take() {
            pool.free_command_buffers(device, &buffers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_covers_every_particle() {
        assert_eq!(buffer_size(20_000), 640_000);
        assert_eq!(buffer_size(1), 32);
    }

    #[test]
    fn dispatch_rounds_up() {
        assert_eq!(dispatch_group_count(20_000), 157);
        assert_eq!(dispatch_group_count(128), 1);
        assert_eq!(dispatch_group_count(129), 2);
    }

    #[test]
    fn buffers_return_to_their_owners() {
        let back = COMPUTE_TO_TRANSFER.reversed();
        assert_eq!(back.access.0, vk::AccessFlags::TRANSFER_READ);
        assert!(back.access.1.contains(vk::AccessFlags::SHADER_WRITE));
        assert_eq!(back.stages.1, vk::PipelineStageFlags::COMPUTE_SHADER);

        let back = VERTEX_TO_TRANSFER.reversed();
        assert_eq!(back.access.0, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(back.access.1, vk::AccessFlags::VERTEX_ATTRIBUTE_READ);
        assert_eq!(back.stages.1, vk::PipelineStageFlags::VERTEX_SHADER);
    }

    #[test]
    fn usages_allow_the_copy() {
        assert!(COMPUTE_BUFFER_USAGE.contains(vk::BufferUsageFlags::TRANSFER_SRC));
        assert!(COMPUTE_BUFFER_USAGE.contains(vk::BufferUsageFlags::STORAGE_BUFFER));
        assert!(DRAW_BUFFER_USAGE.contains(vk::BufferUsageFlags::TRANSFER_DST));
        assert!(DRAW_BUFFER_USAGE.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
    }
}
