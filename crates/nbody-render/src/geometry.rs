//! Static vertex data: the fullscreen quad, the particle sprite corners and the
//! performance-meter bars.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use nbody_core::constants::{INSTANCE_BUFFER_BIND_ID, VERTEX_BUFFER_BIND_ID};
use nbody_core::Particle;
use nbody_gpu::command::{upload_to_buffer, CommandPool};
use nbody_gpu::{GpuBuffer, GpuContext, Result};
use std::mem::{offset_of, size_of};

/// Position and texture coordinate of a screen-space quad corner.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
}

/// Texture coordinate of a particle sprite corner.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CornerVertex {
    pub uv: [f32; 2],
}

/// Two triangles over four corners.
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// Vertical extent of the graphics meter bar in clip space.
pub const GRAPHICS_METER_Y: (f32, f32) = (-0.98, -0.95);
/// Vertical extent of the compute meter bar in clip space.
pub const COMPUTE_METER_Y: (f32, f32) = (-0.93, -0.90);

/// A full-width quad between `y0` and `y1`.
pub const fn horizontal_bar((y0, y1): (f32, f32)) -> [QuadVertex; 4] {
    [
        QuadVertex { pos: [1.0, y0], uv: [1.0, 1.0] },
        QuadVertex { pos: [-1.0, y0], uv: [0.0, 1.0] },
        QuadVertex { pos: [-1.0, y1], uv: [0.0, 0.0] },
        QuadVertex { pos: [1.0, y1], uv: [1.0, 0.0] },
    ]
}

pub const FULLSCREEN_QUAD: [QuadVertex; 4] = horizontal_bar((1.0, -1.0));

pub const SPRITE_CORNERS: [CornerVertex; 4] = [
    CornerVertex { uv: [1.0, 1.0] },
    CornerVertex { uv: [0.0, 1.0] },
    CornerVertex { uv: [0.0, 0.0] },
    CornerVertex { uv: [1.0, 0.0] },
];

/// Vertex input of the fullscreen and meter pipelines.
pub fn quad_vertex_input() -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let bindings = vec![vk::VertexInputBindingDescription {
        binding: VERTEX_BUFFER_BIND_ID,
        stride: size_of::<QuadVertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }];
    let attributes = vec![
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: VERTEX_BUFFER_BIND_ID,
            format: vk::Format::R32G32_SFLOAT,
            offset: offset_of!(QuadVertex, pos) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: VERTEX_BUFFER_BIND_ID,
            format: vk::Format::R32G32_SFLOAT,
            offset: offset_of!(QuadVertex, uv) as u32,
        },
    ];
    (bindings, attributes)
}

/// Vertex input of the particle pipeline: particles per instance, sprite corners per vertex.
pub fn particle_vertex_input() -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let bindings = vec![
        vk::VertexInputBindingDescription {
            binding: INSTANCE_BUFFER_BIND_ID,
            stride: Particle::SIZE as u32,
            input_rate: vk::VertexInputRate::INSTANCE,
        },
        vk::VertexInputBindingDescription {
            binding: VERTEX_BUFFER_BIND_ID,
            stride: size_of::<CornerVertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        },
    ];
    let attributes = vec![
        // position and mass
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: INSTANCE_BUFFER_BIND_ID,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: offset_of!(Particle, xyzm) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: INSTANCE_BUFFER_BIND_ID,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: offset_of!(Particle, v) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: VERTEX_BUFFER_BIND_ID,
            format: vk::Format::R32G32_SFLOAT,
            offset: offset_of!(CornerVertex, uv) as u32,
        },
    ];
    (bindings, attributes)
}

/// Device-local copies of the static vertex and index data.
pub struct Geometry {
    pub fullscreen: GpuBuffer,
    pub sprite_corners: GpuBuffer,
    pub graphics_meter: GpuBuffer,
    pub compute_meter: GpuBuffer,
    pub quad_indices: GpuBuffer,
}

unsafe fn device_local<T: Pod>(
    gpu: &GpuContext,
    pool: &CommandPool,
    usage: vk::BufferUsageFlags,
    data: &[T],
    name: &str,
) -> Result<GpuBuffer> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    let buffer = gpu.allocator().lock().create_buffer(
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        bytes.len() as u64,
        None,
        name,
    )?;
    upload_to_buffer(gpu, pool, gpu.graphics_queue(), &buffer, bytes)?;
    Ok(buffer)
}

impl Geometry {
    /// Upload all static geometry through staging buffers.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn upload(gpu: &GpuContext, pool: &CommandPool) -> Result<Self> {
        let vertex = vk::BufferUsageFlags::VERTEX_BUFFER;
        Ok(Self {
            fullscreen: device_local(gpu, pool, vertex, &FULLSCREEN_QUAD, "fullscreen_quad")?,
            sprite_corners: device_local(gpu, pool, vertex, &SPRITE_CORNERS, "sprite_corners")?,
            graphics_meter: device_local(
                gpu,
                pool,
                vertex,
                &horizontal_bar(GRAPHICS_METER_Y),
                "graphics_meter",
            )?,
            compute_meter: device_local(
                gpu,
                pool,
                vertex,
                &horizontal_bar(COMPUTE_METER_Y),
                "compute_meter",
            )?,
            quad_indices: device_local(
                gpu,
                pool,
                vk::BufferUsageFlags::INDEX_BUFFER,
                &QUAD_INDICES,
                "quad_indices",
            )?,
        })
    }

    /// Free every buffer.
    ///
    /// # Safety
    /// No command buffer using the geometry may be pending.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        let mut allocator = gpu.allocator().lock();
        allocator.free_buffer(&mut self.fullscreen)?;
        allocator.free_buffer(&mut self.sprite_corners)?;
        allocator.free_buffer(&mut self.graphics_meter)?;
        allocator.free_buffer(&mut self.compute_meter)?;
        allocator.free_buffer(&mut self.quad_indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn vertex_layouts() {
        assert_eq!(size_of::<QuadVertex>(), 16);
        assert_eq!(offset_of!(QuadVertex, uv), 8);
        assert_eq!(size_of::<CornerVertex>(), 8);
    }

    #[test]
    fn meter_bars_sit_at_the_bottom() {
        let graphics = horizontal_bar(GRAPHICS_METER_Y);
        assert_relative_eq!(graphics[0].pos[1], -0.98);
        assert_relative_eq!(graphics[2].pos[1], -0.95);

        let compute = horizontal_bar(COMPUTE_METER_Y);
        assert_relative_eq!(compute[0].pos[1], -0.93);
        assert_relative_eq!(compute[3].pos[1], -0.90);

        // bars span the full width
        assert_relative_eq!(graphics[0].pos[0], 1.0);
        assert_relative_eq!(graphics[1].pos[0], -1.0);
    }

    #[test]
    fn fullscreen_quad_covers_clip_space() {
        let xs: Vec<f32> = FULLSCREEN_QUAD.iter().map(|v| v.pos[0]).collect();
        let ys: Vec<f32> = FULLSCREEN_QUAD.iter().map(|v| v.pos[1]).collect();
        assert!(xs.contains(&1.0) && xs.contains(&-1.0));
        assert!(ys.contains(&1.0) && ys.contains(&-1.0));
    }

    #[test]
    fn particles_are_read_per_instance() {
        let (bindings, attributes) = particle_vertex_input();
        let instance = bindings
            .iter()
            .find(|b| b.binding == INSTANCE_BUFFER_BIND_ID)
            .unwrap();
        assert_eq!(instance.stride, 32);
        assert_eq!(instance.input_rate, vk::VertexInputRate::INSTANCE);

        let velocity = attributes.iter().find(|a| a.location == 1).unwrap();
        assert_eq!(velocity.offset, 16);
    }

    #[test]
    fn indices_form_two_triangles() {
        assert_eq!(QUAD_INDICES.len(), 6);
        assert!(QUAD_INDICES.iter().all(|&i| i < 4));
    }
}
