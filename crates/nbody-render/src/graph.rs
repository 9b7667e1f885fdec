//! The six-pass HDR frame graph.
//!
//! One primary command buffer is recorded per swapchain image and resubmitted every
//! frame until a resize or relaunch invalidates it:
//!
//! 1. scene: instanced particle sprites into the scene target
//! 2. luminance: bright parts of the scene at half size
//! 3. blur horizontal and 4. blur vertical: separable gaussian
//! 5. combine: bloom over the scene plus the performance meters
//! 6. tone map: combine target into the swapchain image
//!
//! Every HDR target rests in `SHADER_READ_ONLY_OPTIMAL`. A pass moves its output to
//! `COLOR_ATTACHMENT_OPTIMAL` for the duration of the render pass and back afterwards, so
//! the next pass can sample it without further barriers.

use crate::descriptor_sets::DescriptorSets;
use crate::geometry::Geometry;
use crate::pipelines::Pipelines;
use crate::render_pass::{clear_values, RenderPasses};
use crate::targets::{RenderTargets, TargetId};
use ash::vk;
use nbody_core::constants::{INSTANCE_BUFFER_BIND_ID, VERTEX_BUFFER_BIND_ID};
use nbody_core::perf::{GRAPHICS_FRAME_QUERIES, GRAPHICS_QUERY_COUNT};
use nbody_core::{BlurPushConstants, GraphicsStage};
use nbody_gpu::command::{begin_command_buffer, end_command_buffer, CommandPool};
use nbody_gpu::layout::{check_transition, image_barrier};
use nbody_gpu::pipeline::set_viewport_and_scissor;
use nbody_gpu::swapchain::color_subresource_range;
use nbody_gpu::{GpuBuffer, GpuImage, Result, TimestampPool};

/// Where a pass renders to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutput {
    Target(TargetId),
    Swapchain,
}

/// Static description of one pass.
#[derive(Clone, Copy, Debug)]
pub struct PassDesc {
    pub stage: GraphicsStage,
    /// Targets sampled by the pass, in draw order
    pub samples: &'static [TargetId],
    pub output: PassOutput,
    /// The render pass clears a depth attachment as well
    pub with_depth: bool,
}

/// Every pass in recording order.
pub const PASSES: [PassDesc; 6] = [
    PassDesc {
        stage: GraphicsStage::Scene,
        samples: &[],
        output: PassOutput::Target(TargetId::Scene),
        with_depth: true,
    },
    PassDesc {
        stage: GraphicsStage::Luminance,
        samples: &[TargetId::Scene],
        output: PassOutput::Target(TargetId::Luminance),
        with_depth: false,
    },
    PassDesc {
        stage: GraphicsStage::BlurHorizontal,
        samples: &[TargetId::Luminance],
        output: PassOutput::Target(TargetId::BlurA),
        with_depth: false,
    },
    PassDesc {
        stage: GraphicsStage::BlurVertical,
        samples: &[TargetId::BlurA],
        output: PassOutput::Target(TargetId::BlurB),
        with_depth: false,
    },
    PassDesc {
        stage: GraphicsStage::Combine,
        samples: &[TargetId::BlurB, TargetId::Scene],
        output: PassOutput::Target(TargetId::Combine),
        with_depth: false,
    },
    PassDesc {
        stage: GraphicsStage::ToneMap,
        samples: &[TargetId::Combine],
        output: PassOutput::Swapchain,
        with_depth: true,
    },
];

/// Access masks of the barrier opening a pass.
///
/// Paired with [`open_stages`], which names shader stages only; colour attachment writes
/// happen in `COLOR_ATTACHMENT_OUTPUT`, so validation layers report the pairing.
pub const OPEN_ACCESS: (vk::AccessFlags, vk::AccessFlags) = (
    vk::AccessFlags::SHADER_READ,
    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
);
/// Access masks of the barrier closing a pass.
pub const CLOSE_ACCESS: (vk::AccessFlags, vk::AccessFlags) = (
    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
    vk::AccessFlags::SHADER_READ,
);

/// Stages of the barrier opening a pass.
pub const fn open_stages(stage: GraphicsStage) -> (vk::PipelineStageFlags, vk::PipelineStageFlags) {
    let src = match stage {
        // nothing earlier in the buffer touched the scene target
        GraphicsStage::Scene => vk::PipelineStageFlags::TOP_OF_PIPE,
        _ => vk::PipelineStageFlags::FRAGMENT_SHADER,
    };
    (src, vk::PipelineStageFlags::FRAGMENT_SHADER)
}

/// Fragment on both sides; see [`OPEN_ACCESS`] for the attachment write mismatch.
const CLOSE_STAGES: (vk::PipelineStageFlags, vk::PipelineStageFlags) = (
    vk::PipelineStageFlags::FRAGMENT_SHADER,
    vk::PipelineStageFlags::FRAGMENT_SHADER,
);

/// Everything the graph binds apart from the targets.
pub struct GraphInputs<'a> {
    pub passes: &'a RenderPasses,
    pub pipelines: &'a Pipelines,
    pub sets: &'a DescriptorSets,
    pub geometry: &'a Geometry,
    /// Per-instance particle data of the scene pass
    pub draw_buffer: &'a GpuBuffer,
    pub particle_count: u32,
    /// Absent when the queue cannot write timestamps
    pub queries: Option<&'a TimestampPool>,
}

unsafe fn timestamp(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    queries: Option<&TimestampPool>,
    stage: vk::PipelineStageFlags,
    index: u32,
) {
    if let Some(pool) = queries {
        pool.cmd_write(device, cmd, stage, index);
    }
}

unsafe fn transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: &mut GpuImage,
    (old, new): (vk::ImageLayout, vk::ImageLayout),
    access: (vk::AccessFlags, vk::AccessFlags),
    (src_stage, dst_stage): (vk::PipelineStageFlags, vk::PipelineStageFlags),
) -> Result<()> {
    check_transition(image.layout, old)?;
    let barrier = image_barrier(image.image, old, new, access, color_subresource_range());
    device.cmd_pipeline_barrier(
        cmd,
        src_stage,
        dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[barrier],
    );
    image.layout = new;
    Ok(())
}

unsafe fn draw_quad(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    vertices: &GpuBuffer,
    indices: &GpuBuffer,
    instances: u32,
) {
    device.cmd_bind_vertex_buffers(cmd, VERTEX_BUFFER_BIND_ID, &[vertices.buffer], &[0]);
    device.cmd_bind_index_buffer(cmd, indices.buffer, 0, vk::IndexType::UINT32);
    device.cmd_draw_indexed(cmd, 6, instances, 0, 0, 0);
}

unsafe fn bind_set(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    layout: vk::PipelineLayout,
    set: vk::DescriptorSet,
) {
    device.cmd_bind_descriptor_sets(
        cmd,
        vk::PipelineBindPoint::GRAPHICS,
        layout,
        0,
        &[set],
        &[],
    );
}

/// Draw calls of one pass, recorded inside its render pass.
unsafe fn record_draws(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    stage: GraphicsStage,
    inputs: &GraphInputs<'_>,
) {
    let pipelines = inputs.pipelines;
    let sets = inputs.sets;
    let geometry = inputs.geometry;
    let indices = &geometry.quad_indices;
    let bind = |pipeline: vk::Pipeline| {
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
    };

    match stage {
        GraphicsStage::Scene => {
            let pipeline = &pipelines.nbody;
            bind(pipeline.pipeline);
            bind_set(device, cmd, pipeline.layout, sets.nbody);
            device.cmd_bind_vertex_buffers(
                cmd,
                INSTANCE_BUFFER_BIND_ID,
                &[inputs.draw_buffer.buffer],
                &[0],
            );
            draw_quad(device, cmd, &geometry.sprite_corners, indices, inputs.particle_count);
        }
        GraphicsStage::Luminance => {
            let pipeline = &pipelines.luminosity;
            bind(pipeline.pipeline);
            bind_set(device, cmd, pipeline.layout, sets.luminosity);
            draw_quad(device, cmd, &geometry.fullscreen, indices, 1);
        }
        GraphicsStage::BlurHorizontal | GraphicsStage::BlurVertical => {
            let pipeline = &pipelines.blur;
            let (push, set) = if stage == GraphicsStage::BlurHorizontal {
                (BlurPushConstants::HORIZONTAL, sets.blur_alpha)
            } else {
                (BlurPushConstants::VERTICAL, sets.blur_beta)
            };
            bind(pipeline.pipeline);
            device.cmd_push_constants(
                cmd,
                pipeline.layout,
                vk::ShaderStageFlags::FRAGMENT,
                0,
                bytemuck::bytes_of(&push),
            );
            bind_set(device, cmd, pipeline.layout, set);
            draw_quad(device, cmd, &geometry.fullscreen, indices, 1);
        }
        GraphicsStage::Combine => {
            // bloom first, then the scene on top; blending is additive
            let pipeline = &pipelines.normal_texture;
            bind(pipeline.pipeline);
            for set in [sets.normal_texture_blur, sets.normal_texture_scene] {
                bind_set(device, cmd, pipeline.layout, set);
                draw_quad(device, cmd, &geometry.fullscreen, indices, 1);
            }

            let pipeline = &pipelines.performance_meter;
            bind(pipeline.pipeline);
            for (set, bar) in [
                (sets.performance_graphics, &geometry.graphics_meter),
                (sets.performance_compute, &geometry.compute_meter),
            ] {
                bind_set(device, cmd, pipeline.layout, set);
                draw_quad(device, cmd, bar, indices, 1);
            }
        }
        GraphicsStage::ToneMap => {
            let pipeline = &pipelines.tone_mapping;
            bind(pipeline.pipeline);
            bind_set(device, cmd, pipeline.layout, sets.tone_mapping);
            draw_quad(device, cmd, &geometry.fullscreen, indices, 1);
        }
    }
}

/// Record the whole graph for swapchain image `image_index` into `cmd`.
///
/// The tracked layout of every HDR target is checked and is back in
/// `SHADER_READ_ONLY_OPTIMAL` when this returns.
///
/// # Safety
/// `cmd` must be a primary command buffer in the initial state and every handle must be
/// valid.
pub unsafe fn record_graph(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image_index: usize,
    inputs: &GraphInputs<'_>,
    targets: &mut RenderTargets,
) -> Result<()> {
    let swapchain_framebuffer = targets
        .swapchain_framebuffers
        .get(image_index)
        .copied()
        .ok_or_else(|| {
            nbody_gpu::GpuError::InvalidState(format!("no framebuffer for swapchain image {image_index}"))
        })?;
    let full = targets.extents().full;

    begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)?;

    if let Some(pool) = inputs.queries {
        pool.cmd_reset(device, cmd, 0, GRAPHICS_QUERY_COUNT);
    }
    timestamp(
        device,
        cmd,
        inputs.queries,
        vk::PipelineStageFlags::ALL_COMMANDS,
        GRAPHICS_FRAME_QUERIES.0,
    );

    for pass in &PASSES {
        let (begin_query, end_query) = pass.stage.queries();
        timestamp(
            device,
            cmd,
            inputs.queries,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            begin_query,
        );

        let (render_pass, framebuffer, extent) = match pass.output {
            PassOutput::Target(id) => {
                let target = targets.get_mut(id);
                transition(
                    device,
                    cmd,
                    &mut target.image,
                    (
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    ),
                    OPEN_ACCESS,
                    open_stages(pass.stage),
                )?;
                let render_pass = if pass.with_depth {
                    inputs.passes.hdr_color_depth
                } else {
                    inputs.passes.hdr
                };
                (render_pass, target.framebuffer, target.extent())
            }
            PassOutput::Swapchain => (inputs.passes.ldr, swapchain_framebuffer, full),
        };

        let clears = clear_values(pass.with_depth);
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clears);
        device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
        set_viewport_and_scissor(device, cmd, extent);
        record_draws(device, cmd, pass.stage, inputs);
        device.cmd_end_render_pass(cmd);

        if let PassOutput::Target(id) = pass.output {
            transition(
                device,
                cmd,
                &mut targets.get_mut(id).image,
                (
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                ),
                CLOSE_ACCESS,
                CLOSE_STAGES,
            )?;
        }

        timestamp(
            device,
            cmd,
            inputs.queries,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            end_query,
        );
    }

    timestamp(
        device,
        cmd,
        inputs.queries,
        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        GRAPHICS_FRAME_QUERIES.1,
    );

    end_command_buffer(device, cmd)
}

/// Pre-recorded graph command buffers, one per swapchain image.
#[derive(Default)]
pub struct GraphCommands {
    buffers: Vec<vk::CommandBuffer>,
}

impl GraphCommands {
    /// Free the previous buffers and record one per swapchain image.
    ///
    /// # Safety
    /// None of the previous buffers may be pending, and every handle must be valid.
    pub unsafe fn record(
        &mut self,
        device: &ash::Device,
        pool: &CommandPool,
        inputs: &GraphInputs<'_>,
        targets: &mut RenderTargets,
    ) -> Result<()> {
        self.free(device, pool);

        let count = targets.swapchain_framebuffers.len() as u32;
        self.buffers = pool.allocate_command_buffers(device, vk::CommandBufferLevel::PRIMARY, count)?;
        for (index, &cmd) in self.buffers.iter().enumerate() {
            record_graph(device, cmd, index, inputs, targets)?;
        }

        tracing::debug!(
            images = count,
            particles = inputs.particle_count,
            "Recorded frame graph"
        );
        Ok(())
    }

    /// Command buffer of swapchain image `index`.
    pub fn get(&self, index: u32) -> Option<vk::CommandBuffer> {
        self.buffers.get(index as usize).copied()
    }

    /// # Safety
    /// None of the buffers may be pending.
    pub unsafe fn free(&mut self, device: &ash::Device, pool: &CommandPool) {
        if !self.buffers.is_empty() {
            pool.free_command_buffers(device, &self.buffers);
            self.buffers.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn passes_follow_the_stage_order() {
        for (pass, stage) in PASSES.iter().zip(GraphicsStage::ALL) {
            assert_eq!(pass.stage, stage);
        }
    }

    #[test]
    fn queries_are_distinct_pairs() {
        let mut seen: Vec<u32> = PASSES
            .iter()
            .flat_map(|pass| {
                let (begin, end) = pass.stage.queries();
                [begin, end]
            })
            .collect();
        seen.extend([GRAPHICS_FRAME_QUERIES.0, GRAPHICS_FRAME_QUERIES.1]);
        seen.sort_unstable();
        assert_eq!(seen, (0..GRAPHICS_QUERY_COUNT).collect::<Vec<_>>());
    }

    /// Replays the barriers of several frames on plain layouts.
    #[test]
    fn targets_are_sampled_only_at_rest() {
        let rest = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        let mut layouts: HashMap<TargetId, vk::ImageLayout> =
            TargetId::ALL.iter().map(|&id| (id, rest)).collect();
        let mut written_this_frame = Vec::new();

        for _frame in 0..3 {
            written_this_frame.clear();
            for pass in &PASSES {
                for sampled in pass.samples {
                    assert_eq!(layouts[sampled], rest, "{:?} samples {sampled:?}", pass.stage);
                    assert!(
                        written_this_frame.contains(sampled),
                        "{sampled:?} is read before it is written"
                    );
                }
                if let PassOutput::Target(id) = pass.output {
                    assert!(check_transition(layouts[&id], rest).is_ok());
                    layouts.insert(id, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
                    assert!(!pass.samples.contains(&id), "feedback loop in {:?}", pass.stage);
                    assert!(
                        check_transition(layouts[&id], vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                            .is_ok()
                    );
                    layouts.insert(id, rest);
                    written_this_frame.push(id);
                }
            }
        }

        assert!(layouts.values().all(|&layout| layout == rest));
    }

    #[test]
    fn every_target_is_written_once_per_frame() {
        let written: Vec<TargetId> = PASSES
            .iter()
            .filter_map(|pass| match pass.output {
                PassOutput::Target(id) => Some(id),
                PassOutput::Swapchain => None,
            })
            .collect();
        assert_eq!(written, TargetId::ALL);
    }

    #[test]
    fn only_the_last_pass_presents() {
        let last = PASSES[PASSES.len() - 1];
        assert_eq!(last.output, PassOutput::Swapchain);
        assert_eq!(last.samples, &[TargetId::Combine]);
    }

    #[test]
    fn barriers_hand_targets_between_fragment_stages() {
        assert_eq!(
            open_stages(GraphicsStage::Scene).0,
            vk::PipelineStageFlags::TOP_OF_PIPE
        );
        assert_eq!(
            open_stages(GraphicsStage::Luminance),
            CLOSE_STAGES
        );
        assert_eq!(OPEN_ACCESS.0, CLOSE_ACCESS.1);
        assert_eq!(OPEN_ACCESS.1, CLOSE_ACCESS.0);
    }
}
