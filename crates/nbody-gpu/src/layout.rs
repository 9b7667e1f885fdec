//! Image layout transitions.
//!
//! Access masks are derived from the old and new layouts with a fixed table. Images
//! allocated through [`GpuAllocator`](crate::memory::GpuAllocator) carry their current layout,
//! and [`set_image_layout`] refuses a transition whose source layout does not match it.

use crate::error::{GpuError, Result};
use crate::memory::GpuImage;
use ash::vk;

/// Stage pair used when the caller has no better information.
///
/// `TOP_OF_PIPE` performs no memory access, so the masks from [`access_masks`] are outside
/// both synchronization scopes. Callers that need the write visible pass real stages.
pub const DEFAULT_STAGES: (vk::PipelineStageFlags, vk::PipelineStageFlags) = (
    vk::PipelineStageFlags::TOP_OF_PIPE,
    vk::PipelineStageFlags::TOP_OF_PIPE,
);

/// Source and destination access masks for a layout transition.
pub fn access_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> (vk::AccessFlags, vk::AccessFlags) {
    let mut src = match old {
        vk::ImageLayout::PREINITIALIZED => {
            vk::AccessFlags::HOST_WRITE | vk::AccessFlags::TRANSFER_WRITE
        }
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        }
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => vk::AccessFlags::TRANSFER_READ,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => vk::AccessFlags::TRANSFER_WRITE,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => vk::AccessFlags::SHADER_READ,
        _ => vk::AccessFlags::empty(),
    };

    let mut dst = vk::AccessFlags::empty();
    match new {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            dst = vk::AccessFlags::TRANSFER_WRITE;
        }
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
            src |= vk::AccessFlags::TRANSFER_READ;
            dst = vk::AccessFlags::TRANSFER_READ;
        }
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => {
            src = vk::AccessFlags::TRANSFER_READ;
            dst = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
        }
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => {
            dst |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
            if src.is_empty() {
                src = vk::AccessFlags::HOST_WRITE | vk::AccessFlags::TRANSFER_WRITE;
            }
            dst = vk::AccessFlags::SHADER_READ;
        }
        _ => {}
    }

    (src, dst)
}

/// Build an image memory barrier with explicit access masks.
pub fn image_barrier<'a>(
    image: vk::Image,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    (src_access, dst_access): (vk::AccessFlags, vk::AccessFlags),
    range: vk::ImageSubresourceRange,
) -> vk::ImageMemoryBarrier<'a> {
    vk::ImageMemoryBarrier::default()
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
}

/// Record a transition of an untracked image (e.g. a swapchain image).
///
/// # Safety
/// The command buffer must be recording and the image must be valid.
pub unsafe fn record_layout_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    range: vk::ImageSubresourceRange,
    (src_stage, dst_stage): (vk::PipelineStageFlags, vk::PipelineStageFlags),
) {
    let barrier = image_barrier(image, old, new, access_masks(old, new), range);
    device.cmd_pipeline_barrier(
        cmd,
        src_stage,
        dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[barrier],
    );
}

/// Record a transition of a tracked image and update its layout.
///
/// Fails without recording anything if the image is not currently in `old`.
///
/// # Safety
/// The command buffer must be recording and the image must be valid.
pub unsafe fn set_image_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: &mut GpuImage,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    range: vk::ImageSubresourceRange,
    stages: (vk::PipelineStageFlags, vk::PipelineStageFlags),
) -> Result<()> {
    check_transition(image.layout, old)?;
    record_layout_transition(device, cmd, image.image, old, new, range, stages);
    image.layout = new;
    Ok(())
}

/// Verify that a tracked layout matches the source layout of a transition.
pub fn check_transition(tracked: vk::ImageLayout, old: vk::ImageLayout) -> Result<()> {
    if tracked == old {
        Ok(())
    } else {
        Err(GpuError::InvalidState(format!(
            "image is in {tracked:?}, transition expects {old:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;

    #[test]
    fn undefined_to_depth_attachment() {
        assert_eq!(
            access_masks(L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            (A::empty(), A::DEPTH_STENCIL_ATTACHMENT_WRITE)
        );
    }

    #[test]
    fn upload_transitions() {
        assert_eq!(
            access_masks(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL),
            (A::empty(), A::TRANSFER_WRITE)
        );
        assert_eq!(
            access_masks(L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL),
            (A::TRANSFER_WRITE, A::SHADER_READ)
        );
    }

    #[test]
    fn shader_read_from_nothing_assumes_host_or_transfer_write() {
        assert_eq!(
            access_masks(L::UNDEFINED, L::SHADER_READ_ONLY_OPTIMAL),
            (A::HOST_WRITE | A::TRANSFER_WRITE, A::SHADER_READ)
        );
    }

    #[test]
    fn color_attachment_source_is_overridden() {
        // the source mask becomes TRANSFER_READ regardless of the old layout
        assert_eq!(
            access_masks(L::SHADER_READ_ONLY_OPTIMAL, L::COLOR_ATTACHMENT_OPTIMAL),
            (A::TRANSFER_READ, A::COLOR_ATTACHMENT_WRITE)
        );
        assert_eq!(
            access_masks(L::COLOR_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL),
            (A::COLOR_ATTACHMENT_WRITE, A::SHADER_READ)
        );
    }

    #[test]
    fn transfer_source_adds_read_to_source_mask() {
        assert_eq!(
            access_masks(L::PREINITIALIZED, L::TRANSFER_SRC_OPTIMAL),
            (
                A::HOST_WRITE | A::TRANSFER_WRITE | A::TRANSFER_READ,
                A::TRANSFER_READ
            )
        );
    }

    #[test]
    fn unknown_layouts_have_no_access() {
        assert_eq!(
            access_masks(L::GENERAL, L::PRESENT_SRC_KHR),
            (A::empty(), A::empty())
        );
    }

    #[test]
    fn transitions_must_start_from_tracked_layout() {
        assert!(check_transition(L::SHADER_READ_ONLY_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).is_ok());
        assert!(matches!(
            check_transition(L::UNDEFINED, L::SHADER_READ_ONLY_OPTIMAL),
            Err(GpuError::InvalidState(_))
        ));
    }
}
