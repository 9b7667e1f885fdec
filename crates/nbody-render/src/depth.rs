//! Depth attachments.

use ash::vk;
use nbody_gpu::command::{execute_single_time_commands, CommandPool};
use nbody_gpu::layout::set_image_layout;
use nbody_gpu::surface::depth_aspect;
use nbody_gpu::{GpuContext, GpuImage, Result, VkCheck};

/// A depth image with its view, kept in `DEPTH_STENCIL_ATTACHMENT_OPTIMAL`.
pub struct DepthBuffer {
    pub image: GpuImage,
    pub view: vk::ImageView,
}

impl DepthBuffer {
    /// Allocate a device-local depth image and move it into its attachment layout once.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn new(
        gpu: &GpuContext,
        pool: &CommandPool,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
        name: &str,
    ) -> Result<Self> {
        let device = gpu.device();
        let aspect = depth_aspect(format);

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let mut image = gpu.allocator().lock().create_image(
            &image_info,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            name,
        )?;

        let range = image.full_range(aspect);
        let transitioned = execute_single_time_commands(device, pool, gpu.graphics_queue(), |cmd| {
            set_image_layout(
                device,
                cmd,
                &mut image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                range,
                (
                    vk::PipelineStageFlags::ALL_COMMANDS,
                    vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                ),
            )
        });
        if let Err(err) = transitioned {
            gpu.allocator().lock().free_image(&mut image)?;
            return Err(err);
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(range);
        let view = match device.create_image_view(&view_info, None) {
            Ok(view) => view,
            Err(e) => {
                gpu.allocator().lock().free_image(&mut image)?;
                return Err(e).checked("vkCreateImageView");
            }
        };

        Ok(Self { image, view })
    }

    /// Extent of the depth image.
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent_2d()
    }

    /// Destroy the view and free the image.
    ///
    /// # Safety
    /// The depth buffer must not be in use.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        gpu.device().destroy_image_view(self.view, None);
        self.view = vk::ImageView::null();
        gpu.allocator().lock().free_image(&mut self.image)
    }
}
