//! Persistently mapped uniform buffers.

use ash::vk;
use bytemuck::Pod;
use nbody_core::{PerformanceMeterUniforms, SimulationParameters};
use nbody_gpu::{GpuAllocator, GpuBuffer, Result};
use std::mem::size_of;

/// One host-visible uniform buffer per parameter block.
pub struct UniformBuffers {
    /// Camera block of the scene pass
    pub graphics: GpuBuffer,
    /// Integrator block of both compute steps
    pub compute: GpuBuffer,
    pub blur: GpuBuffer,
    pub tone_mapping: GpuBuffer,
    pub performance_graphics: GpuBuffer,
    pub performance_compute: GpuBuffer,
}

fn mapped_block<T: Pod>(allocator: &mut GpuAllocator, value: &T, name: &str) -> Result<GpuBuffer> {
    allocator.create_buffer(
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        size_of::<T>() as u64,
        Some(bytemuck::bytes_of(value)),
        name,
    )
}

impl UniformBuffers {
    /// Allocate every block, initialised from `params` and empty meters.
    pub fn new(allocator: &mut GpuAllocator, params: &SimulationParameters) -> Result<Self> {
        let meter = PerformanceMeterUniforms::default();
        Ok(Self {
            graphics: mapped_block(allocator, &params.graphics, "graphics_uniforms")?,
            compute: mapped_block(allocator, &params.compute, "compute_uniforms")?,
            blur: mapped_block(allocator, &params.blur, "blur_uniforms")?,
            tone_mapping: mapped_block(allocator, &params.tone_mapping, "tone_mapping_uniforms")?,
            performance_graphics: mapped_block(allocator, &meter, "performance_graphics")?,
            performance_compute: mapped_block(allocator, &meter, "performance_compute")?,
        })
    }

    /// Rewrite the parameter blocks from `params`.
    pub fn write_parameters(&self, params: &SimulationParameters) -> Result<()> {
        self.graphics.write(std::slice::from_ref(&params.graphics))?;
        self.compute.write(std::slice::from_ref(&params.compute))?;
        self.blur.write(std::slice::from_ref(&params.blur))?;
        self.tone_mapping.write(std::slice::from_ref(&params.tone_mapping))
    }

    /// Rewrite only the camera block.
    pub fn write_graphics(&self, params: &SimulationParameters) -> Result<()> {
        self.graphics.write(std::slice::from_ref(&params.graphics))
    }

    /// Rewrite both performance-meter bars.
    pub fn write_meters(
        &self,
        graphics: &PerformanceMeterUniforms,
        compute: &PerformanceMeterUniforms,
    ) -> Result<()> {
        self.performance_graphics.write(std::slice::from_ref(graphics))?;
        self.performance_compute.write(std::slice::from_ref(compute))
    }

    /// Free every block.
    pub fn destroy(&mut self, allocator: &mut GpuAllocator) -> Result<()> {
        allocator.free_buffer(&mut self.graphics)?;
        allocator.free_buffer(&mut self.compute)?;
        allocator.free_buffer(&mut self.blur)?;
        allocator.free_buffer(&mut self.tone_mapping)?;
        allocator.free_buffer(&mut self.performance_graphics)?;
        allocator.free_buffer(&mut self.performance_compute)
    }
}
