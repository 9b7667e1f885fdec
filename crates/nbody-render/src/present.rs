//! Swapchain image ownership around the frame graph.
//!
//! Each swapchain image gets two tiny command buffers: one taking the freshly acquired
//! image into `COLOR_ATTACHMENT_OPTIMAL` before the graph renders into it, and one handing
//! it to the presentation engine afterwards.

use ash::vk;
use nbody_gpu::command::{begin_command_buffer, end_command_buffer, CommandPool};
use nbody_gpu::layout::image_barrier;
use nbody_gpu::swapchain::color_subresource_range;
use nbody_gpu::Result;

/// Layouts, access masks and stages of one swapchain barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainBarrier {
    pub layouts: (vk::ImageLayout, vk::ImageLayout),
    pub access: (vk::AccessFlags, vk::AccessFlags),
    pub stages: (vk::PipelineStageFlags, vk::PipelineStageFlags),
}

/// Acquired image to colour attachment; the old contents are discarded.
///
/// `BOTTOM_OF_PIPE` performs no memory access, so the destination access mask is not
/// scoped by these stages. [`PRE_PRESENT`] shares the stage pair.
pub const POST_PRESENT: SwapchainBarrier = SwapchainBarrier {
    layouts: (
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    ),
    access: (
        vk::AccessFlags::empty(),
        vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
    ),
    stages: (
        vk::PipelineStageFlags::ALL_COMMANDS,
        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
    ),
};

/// Rendered image to the presentation engine.
pub const PRE_PRESENT: SwapchainBarrier = SwapchainBarrier {
    layouts: (
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::PRESENT_SRC_KHR,
    ),
    access: (
        vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        vk::AccessFlags::MEMORY_READ,
    ),
    stages: (
        vk::PipelineStageFlags::ALL_COMMANDS,
        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
    ),
};

unsafe fn record_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    barrier: &SwapchainBarrier,
) -> Result<()> {
    begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)?;
    let (old, new) = barrier.layouts;
    let image_barrier = image_barrier(image, old, new, barrier.access, color_subresource_range());
    device.cmd_pipeline_barrier(
        cmd,
        barrier.stages.0,
        barrier.stages.1,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[image_barrier],
    );
    end_command_buffer(device, cmd)
}

/// Post- and pre-present command buffers of every swapchain image.
#[derive(Default)]
pub struct PresentCommands {
    post_present: Vec<vk::CommandBuffer>,
    pre_present: Vec<vk::CommandBuffer>,
}

impl PresentCommands {
    /// Free the previous buffers and record a pair per image in `images`.
    ///
    /// # Safety
    /// None of the previous buffers may be pending, and every handle must be valid.
    pub unsafe fn record(
        &mut self,
        device: &ash::Device,
        pool: &CommandPool,
        images: &[vk::Image],
    ) -> Result<()> {
        self.free(device, pool);

        let count = images.len() as u32;
        self.post_present =
            pool.allocate_command_buffers(device, vk::CommandBufferLevel::PRIMARY, count)?;
        self.pre_present =
            pool.allocate_command_buffers(device, vk::CommandBufferLevel::PRIMARY, count)?;

        for ((&image, &post), &pre) in images
            .iter()
            .zip(&self.post_present)
            .zip(&self.pre_present)
        {
            record_barrier(device, post, image, &POST_PRESENT)?;
            record_barrier(device, pre, image, &PRE_PRESENT)?;
        }
        Ok(())
    }

    /// Buffer preparing image `index` for rendering.
    pub fn post_present(&self, index: u32) -> Option<vk::CommandBuffer> {
        self.post_present.get(index as usize).copied()
    }

    /// Buffer handing image `index` to presentation.
    pub fn pre_present(&self, index: u32) -> Option<vk::CommandBuffer> {
        self.pre_present.get(index as usize).copied()
    }

    /// # Safety
    /// None of the buffers may be pending.
    pub unsafe fn free(&mut self, device: &ash::Device, pool: &CommandPool) {
        pool.free_command_buffers(device, &self.post_present);
        pool.free_command_buffers(device, &self.pre_present);
        self.post_present.clear();
        self.pre_present.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barriers_chain_through_the_attachment_layout() {
        assert_eq!(POST_PRESENT.layouts.1, PRE_PRESENT.layouts.0);
        assert_eq!(PRE_PRESENT.layouts.1, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn acquired_contents_are_discarded() {
        assert_eq!(POST_PRESENT.layouts.0, vk::ImageLayout::UNDEFINED);
        assert!(POST_PRESENT.access.0.is_empty());
    }

    #[test]
    fn presentation_reads_the_rendered_image() {
        assert_eq!(PRE_PRESENT.access.0, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(PRE_PRESENT.access.1, vk::AccessFlags::MEMORY_READ);
    }

    #[test]
    fn both_barriers_share_the_stage_pair() {
        assert_eq!(POST_PRESENT.stages, PRE_PRESENT.stages);
        assert_eq!(POST_PRESENT.stages.1, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    }
}
