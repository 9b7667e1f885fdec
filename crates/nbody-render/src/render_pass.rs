//! The three render passes of the frame graph.
//!
//! Every attachment is cleared and stored, and enters and leaves the pass in its
//! attachment layout. Layout changes of sampled targets are recorded as explicit barriers
//! around each pass instead of subpass dependencies.

use ash::vk;
use nbody_gpu::{Result, VkCheck};

/// Format of every HDR target.
pub const HDR_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;

/// Render passes shared by all frames.
pub struct RenderPasses {
    /// Surface format colour plus depth; writes the swapchain image
    pub ldr: vk::RenderPass,
    /// HDR colour plus depth; used by the scene pass
    pub hdr_color_depth: vk::RenderPass,
    /// HDR colour only; used by the post-processing passes
    pub hdr: vk::RenderPass,
}

fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
}

fn depth_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
}

/// Attachment descriptions of a single-subpass pass.
pub fn attachments(color_format: vk::Format, depth_format: Option<vk::Format>) -> Vec<vk::AttachmentDescription> {
    let mut attachments = vec![color_attachment(color_format)];
    attachments.extend(depth_format.map(depth_attachment));
    attachments
}

/// Create a single-subpass render pass with one colour and an optional depth attachment.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_render_pass(
    device: &ash::Device,
    color_format: vk::Format,
    depth_format: Option<vk::Format>,
) -> Result<vk::RenderPass> {
    let attachments = attachments(color_format, depth_format);

    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };

    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if depth_format.is_some() {
        subpass = subpass.depth_stencil_attachment(&depth_ref);
    }
    let subpasses = [subpass];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses);

    device
        .create_render_pass(&create_info, None)
        .checked("vkCreateRenderPass")
}

impl RenderPasses {
    /// Create the passes for a surface format and depth format.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        surface_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let ldr = create_render_pass(device, surface_format, Some(depth_format))?;
        let hdr_color_depth = match create_render_pass(device, HDR_FORMAT, Some(depth_format)) {
            Ok(pass) => pass,
            Err(err) => {
                device.destroy_render_pass(ldr, None);
                return Err(err);
            }
        };
        let hdr = match create_render_pass(device, HDR_FORMAT, None) {
            Ok(pass) => pass,
            Err(err) => {
                device.destroy_render_pass(ldr, None);
                device.destroy_render_pass(hdr_color_depth, None);
                return Err(err);
            }
        };

        Ok(Self {
            ldr,
            hdr_color_depth,
            hdr,
        })
    }

    /// Destroy all passes.
    ///
    /// # Safety
    /// No framebuffer or pipeline created against the passes may be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_render_pass(self.ldr, None);
        device.destroy_render_pass(self.hdr_color_depth, None);
        device.destroy_render_pass(self.hdr, None);
    }
}

/// Clear values matching [`attachments`].
pub fn clear_values(with_depth: bool) -> Vec<vk::ClearValue> {
    let mut values = vec![vk::ClearValue {
        color: vk::ClearColorValue {
            float32: [0.0, 0.0, 0.0, 0.0],
        },
    }];
    if with_depth {
        values.push(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        });
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachments_keep_their_layout() {
        for attachment in attachments(HDR_FORMAT, Some(vk::Format::D32_SFLOAT)) {
            assert_eq!(attachment.initial_layout, attachment.final_layout);
            assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
            assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        }
    }

    #[test]
    fn depth_attachment_is_optional() {
        let color_only = attachments(HDR_FORMAT, None);
        assert_eq!(color_only.len(), 1);
        assert_eq!(
            color_only[0].final_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );

        let with_depth = attachments(vk::Format::B8G8R8A8_UNORM, Some(vk::Format::D24_UNORM_S8_UINT));
        assert_eq!(with_depth.len(), 2);
        assert_eq!(with_depth[0].format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(
            with_depth[1].initial_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn clear_values_match_attachments() {
        assert_eq!(clear_values(false).len(), 1);
        let values = clear_values(true);
        assert_eq!(values.len(), 2);
        // SAFETY: the second entry was written as a depth value
        let depth = unsafe { values[1].depth_stencil };
        assert!((depth.depth - 1.0).abs() < f32::EPSILON);
    }
}
