//! Extent-dependent render targets.
//!
//! Five HDR colour targets feed each other through the frame graph. They are created in
//! `SHADER_READ_ONLY_OPTIMAL`, which is also the layout every pass leaves them in, so a
//! target is always sampleable between passes. The swapchain framebuffers pair each
//! swapchain view with the shared depth buffer.

use crate::depth::DepthBuffer;
use crate::render_pass::{RenderPasses, HDR_FORMAT};
use ash::vk;
use nbody_core::constants::BLUR_FRAMEBUFFER_SCALE;
use nbody_gpu::command::{execute_single_time_commands, CommandPool};
use nbody_gpu::layout::set_image_layout;
use nbody_gpu::swapchain::color_subresource_range;
use nbody_gpu::{GpuContext, GpuError, GpuImage, Result, VkCheck};

/// Extent of the luminance and blur targets for a surface extent.
///
/// Each dimension is `floor(d × 0.5)`, but never below one pixel.
pub fn blur_extent(extent: vk::Extent2D) -> vk::Extent2D {
    let scale = |d: u32| ((d as f32 * BLUR_FRAMEBUFFER_SCALE).floor() as u32).max(1);
    vk::Extent2D {
        width: scale(extent.width),
        height: scale(extent.height),
    }
}

/// Extents of the full-size and the blur-size targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetExtents {
    pub full: vk::Extent2D,
    pub blur: vk::Extent2D,
}

impl TargetExtents {
    pub fn for_surface(extent: vk::Extent2D) -> Self {
        Self {
            full: extent,
            blur: blur_extent(extent),
        }
    }
}

/// HDR targets of the frame graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetId {
    Scene,
    Luminance,
    BlurA,
    BlurB,
    Combine,
}

impl TargetId {
    pub const ALL: [Self; 5] = [
        Self::Scene,
        Self::Luminance,
        Self::BlurA,
        Self::BlurB,
        Self::Combine,
    ];

    /// Whether the target is rendered at blur size.
    pub const fn is_blur_sized(self) -> bool {
        matches!(self, Self::Luminance | Self::BlurA | Self::BlurB)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Luminance => "luminance",
            Self::BlurA => "blur_a",
            Self::BlurB => "blur_b",
            Self::Combine => "combine",
        }
    }

    /// Extent of this target within `extents`.
    pub const fn extent(self, extents: &TargetExtents) -> vk::Extent2D {
        if self.is_blur_sized() {
            extents.blur
        } else {
            extents.full
        }
    }
}

/// One HDR colour target and the framebuffer rendering into it.
pub struct HdrTarget {
    pub image: GpuImage,
    pub view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
}

impl HdrTarget {
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent_2d()
    }
}

/// Every extent-dependent render target.
pub struct RenderTargets {
    pub scene: HdrTarget,
    /// Depth attachment of the scene pass
    pub scene_depth: DepthBuffer,
    pub luminance: HdrTarget,
    pub blur_a: HdrTarget,
    pub blur_b: HdrTarget,
    pub combine: HdrTarget,
    /// One per swapchain image, in swapchain order
    pub swapchain_framebuffers: Vec<vk::Framebuffer>,
    /// Sampler for reading the HDR targets
    pub sampler: vk::Sampler,
    extents: TargetExtents,
}

unsafe fn create_framebuffer(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    attachments: &[vk::ImageView],
    extent: vk::Extent2D,
) -> Result<vk::Framebuffer> {
    let create_info = vk::FramebufferCreateInfo::default()
        .render_pass(render_pass)
        .attachments(attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1);
    device
        .create_framebuffer(&create_info, None)
        .checked("vkCreateFramebuffer")
}

unsafe fn create_hdr_image(
    gpu: &GpuContext,
    extent: vk::Extent2D,
    name: &str,
) -> Result<(GpuImage, vk::ImageView)> {
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(HDR_FORMAT)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let image = gpu.allocator().lock().create_image(
        &image_info,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        name,
    )?;

    let view_info = vk::ImageViewCreateInfo::default()
        .image(image.image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(HDR_FORMAT)
        .subresource_range(color_subresource_range());
    let view = match gpu.device().create_image_view(&view_info, None) {
        Ok(view) => view,
        Err(e) => {
            let mut image = image;
            gpu.allocator().lock().free_image(&mut image)?;
            return Err(e).checked("vkCreateImageView");
        }
    };

    Ok((image, view))
}

unsafe fn create_hdr_sampler(device: &ash::Device) -> Result<vk::Sampler> {
    let sampler_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_BORDER)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_BORDER)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_BORDER)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0)
        .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK);
    device
        .create_sampler(&sampler_info, None)
        .checked("vkCreateSampler")
}

/// Targets created so far by [`RenderTargets::new`].
///
/// Released as a whole when a later step fails.
#[derive(Default)]
struct PartialTargets {
    images: Vec<(GpuImage, vk::ImageView)>,
    scene_depth: Option<DepthBuffer>,
    framebuffers: Vec<vk::Framebuffer>,
    swapchain_framebuffers: Vec<vk::Framebuffer>,
    sampler: Option<vk::Sampler>,
}

impl PartialTargets {
    /// Assemble the finished targets, or hand every piece back if one is missing.
    fn finish(self, extents: TargetExtents) -> std::result::Result<RenderTargets, Self> {
        let Self {
            images,
            scene_depth,
            framebuffers,
            swapchain_framebuffers,
            sampler,
        } = self;

        let (scene_depth, sampler) = match (scene_depth, sampler) {
            (Some(depth), Some(sampler)) if images.len() == framebuffers.len() => (depth, sampler),
            (scene_depth, sampler) => {
                return Err(Self {
                    images,
                    scene_depth,
                    framebuffers,
                    swapchain_framebuffers,
                    sampler,
                })
            }
        };

        let targets: Vec<HdrTarget> = images
            .into_iter()
            .zip(framebuffers)
            .map(|((image, view), framebuffer)| HdrTarget {
                image,
                view,
                framebuffer,
            })
            .collect();

        match <[HdrTarget; 5]>::try_from(targets) {
            Ok([scene, luminance, blur_a, blur_b, combine]) => Ok(RenderTargets {
                scene,
                scene_depth,
                luminance,
                blur_a,
                blur_b,
                combine,
                swapchain_framebuffers,
                sampler,
                extents,
            }),
            Err(targets) => {
                let (images, framebuffers) = targets
                    .into_iter()
                    .map(|target| ((target.image, target.view), target.framebuffer))
                    .unzip();
                Err(Self {
                    images,
                    scene_depth: Some(scene_depth),
                    framebuffers,
                    swapchain_framebuffers,
                    sampler: Some(sampler),
                })
            }
        }
    }

    /// Destroy everything created so far.
    unsafe fn release(self, gpu: &GpuContext) -> Result<()> {
        let device = gpu.device();
        for framebuffer in self.swapchain_framebuffers.into_iter().chain(self.framebuffers) {
            device.destroy_framebuffer(framebuffer, None);
        }
        if let Some(sampler) = self.sampler {
            device.destroy_sampler(sampler, None);
        }
        if let Some(mut depth) = self.scene_depth {
            depth.destroy(gpu)?;
        }
        for (mut image, view) in self.images {
            device.destroy_image_view(view, None);
            gpu.allocator().lock().free_image(&mut image)?;
        }
        Ok(())
    }
}

impl RenderTargets {
    /// Create every target for `extent`.
    ///
    /// `swapchain_views` and `depth` must already match `extent`. On failure every target
    /// created so far is destroyed again.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn new(
        gpu: &GpuContext,
        pool: &CommandPool,
        passes: &RenderPasses,
        swapchain_views: &[vk::ImageView],
        depth: &DepthBuffer,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let extents = TargetExtents::for_surface(extent);
        let mut partial = PartialTargets::default();

        let built = Self::build(&mut partial, gpu, pool, passes, swapchain_views, depth, extents);
        if let Err(err) = built {
            partial.release(gpu)?;
            return Err(err);
        }

        let created = match partial.finish(extents) {
            Ok(created) => created,
            Err(partial) => {
                partial.release(gpu)?;
                return Err(GpuError::InvalidState("missing render target".into()));
            }
        };

        tracing::debug!(
            width = extent.width,
            height = extent.height,
            blur_width = extents.blur.width,
            blur_height = extents.blur.height,
            "Created render targets"
        );

        Ok(created)
    }

    unsafe fn build(
        partial: &mut PartialTargets,
        gpu: &GpuContext,
        pool: &CommandPool,
        passes: &RenderPasses,
        swapchain_views: &[vk::ImageView],
        depth: &DepthBuffer,
        extents: TargetExtents,
    ) -> Result<()> {
        let device = gpu.device();

        // 1. Colour images
        for id in TargetId::ALL {
            partial
                .images
                .push(create_hdr_image(gpu, id.extent(&extents), id.name())?);
        }

        // 2. Move every colour image into its resting layout
        execute_single_time_commands(device, pool, gpu.graphics_queue(), |cmd| {
            for (image, _) in &mut partial.images {
                set_image_layout(
                    device,
                    cmd,
                    image,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    color_subresource_range(),
                    (
                        vk::PipelineStageFlags::ALL_COMMANDS,
                        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                    ),
                )?;
            }
            Ok(())
        })?;

        // 3. Scene depth
        let scene_depth = partial.scene_depth.insert(DepthBuffer::new(
            gpu,
            pool,
            depth.image.format,
            extents.full,
            vk::ImageUsageFlags::empty(),
            "scene_depth",
        )?);
        let scene_depth_view = scene_depth.view;

        // 4. Framebuffers
        for (id, &(_, view)) in TargetId::ALL.into_iter().zip(&partial.images) {
            let framebuffer = if id == TargetId::Scene {
                create_framebuffer(
                    device,
                    passes.hdr_color_depth,
                    &[view, scene_depth_view],
                    extents.full,
                )?
            } else {
                create_framebuffer(device, passes.hdr, &[view], id.extent(&extents))?
            };
            partial.framebuffers.push(framebuffer);
        }

        for &view in swapchain_views {
            partial.swapchain_framebuffers.push(create_framebuffer(
                device,
                passes.ldr,
                &[view, depth.view],
                extents.full,
            )?);
        }

        // 5. Sampler
        partial.sampler = Some(create_hdr_sampler(device)?);

        Ok(())
    }

    /// Extents the targets were created for.
    pub fn extents(&self) -> TargetExtents {
        self.extents
    }

    pub fn get(&self, id: TargetId) -> &HdrTarget {
        match id {
            TargetId::Scene => &self.scene,
            TargetId::Luminance => &self.luminance,
            TargetId::BlurA => &self.blur_a,
            TargetId::BlurB => &self.blur_b,
            TargetId::Combine => &self.combine,
        }
    }

    pub fn get_mut(&mut self, id: TargetId) -> &mut HdrTarget {
        match id {
            TargetId::Scene => &mut self.scene,
            TargetId::Luminance => &mut self.luminance,
            TargetId::BlurA => &mut self.blur_a,
            TargetId::BlurB => &mut self.blur_b,
            TargetId::Combine => &mut self.combine,
        }
    }

    /// Destroy every framebuffer, view, image and the sampler.
    ///
    /// # Safety
    /// No command buffer referencing the targets may be pending.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        let device = gpu.device();
        for framebuffer in self.swapchain_framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer, None);
        }
        for id in TargetId::ALL {
            let target = self.get_mut(id);
            device.destroy_framebuffer(target.framebuffer, None);
            device.destroy_image_view(target.view, None);
            target.framebuffer = vk::Framebuffer::null();
            target.view = vk::ImageView::null();
            gpu.allocator().lock().free_image(&mut target.image)?;
        }
        self.scene_depth.destroy(gpu)?;
        device.destroy_sampler(self.sampler, None);
        self.sampler = vk::Sampler::null();
        Ok(())
    }
}

/// Targets with placeholder handles: view `n` of [`TargetId::ALL`] is `first_view + n`.
#[cfg(test)]
pub(crate) fn placeholder_targets(extent: vk::Extent2D, first_view: u64) -> RenderTargets {
    use ash::vk::Handle;

    let extents = TargetExtents::for_surface(extent);
    let image = |e: vk::Extent2D| GpuImage {
        image: vk::Image::null(),
        allocation: None,
        format: HDR_FORMAT,
        extent: vk::Extent3D {
            width: e.width,
            height: e.height,
            depth: 1,
        },
        mip_levels: 1,
        array_layers: 1,
        layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    };
    let partial = PartialTargets {
        images: (0..)
            .zip(TargetId::ALL)
            .map(|(n, id)| (image(id.extent(&extents)), vk::ImageView::from_raw(first_view + n)))
            .collect(),
        scene_depth: Some(DepthBuffer {
            image: image(extents.full),
            view: vk::ImageView::null(),
        }),
        framebuffers: vec![vk::Framebuffer::null(); TargetId::ALL.len()],
        swapchain_framebuffers: vec![vk::Framebuffer::null(); 3],
        sampler: Some(vk::Sampler::null()),
    };
    match partial.finish(extents) {
        Ok(targets) => targets,
        Err(_) => panic!("placeholder targets are complete"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn blur_targets_are_half_size() {
        assert_eq!(blur_extent(extent(1920, 1080)), extent(960, 540));
        assert_eq!(blur_extent(extent(1281, 721)), extent(640, 360));
    }

    #[test]
    fn blur_targets_never_collapse() {
        assert_eq!(blur_extent(extent(1, 1)), extent(1, 1));
    }

    #[test]
    fn complete_targets_assemble_in_graph_order() {
        let targets = placeholder_targets(extent(1920, 1080), 100);
        let extents = targets.extents();
        for id in TargetId::ALL {
            assert_eq!(targets.get(id).extent(), id.extent(&extents), "{}", id.name());
        }
        assert_eq!(targets.swapchain_framebuffers.len(), 3);
    }

    #[test]
    fn incomplete_targets_are_handed_back_for_release() {
        let extents = TargetExtents::for_surface(extent(1280, 720));
        let image = || GpuImage {
            image: vk::Image::null(),
            allocation: None,
            format: HDR_FORMAT,
            extent: vk::Extent3D {
                width: 1280,
                height: 720,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let built = PartialTargets {
            images: (0..3).map(|_| (image(), vk::ImageView::null())).collect(),
            scene_depth: Some(DepthBuffer {
                image: image(),
                view: vk::ImageView::null(),
            }),
            framebuffers: vec![vk::Framebuffer::null(); 3],
            swapchain_framebuffers: vec![vk::Framebuffer::null(); 2],
            sampler: Some(vk::Sampler::null()),
        };

        let Err(leftover) = built.finish(extents) else {
            panic!("three targets must not assemble");
        };
        assert_eq!(leftover.images.len(), 3);
        assert_eq!(leftover.framebuffers.len(), 3);
        assert_eq!(leftover.swapchain_framebuffers.len(), 2);
        assert!(leftover.scene_depth.is_some());
        assert!(leftover.sampler.is_some());

        let mut without_sampler = leftover;
        without_sampler.sampler = None;
        let Err(returned) = without_sampler.finish(extents) else {
            panic!("missing sampler must not assemble");
        };
        assert!(returned.scene_depth.is_some());
        assert_eq!(returned.images.len(), 3);
    }

    #[test]
    fn extents_follow_the_last_resize() {
        let sequence = [extent(1280, 720), extent(800, 600), extent(1920, 1080)];
        let last = sequence
            .iter()
            .map(|&e| TargetExtents::for_surface(e))
            .last()
            .unwrap();

        for id in TargetId::ALL {
            let expected = if id.is_blur_sized() {
                extent(960, 540)
            } else {
                extent(1920, 1080)
            };
            assert_eq!(id.extent(&last), expected, "{}", id.name());
        }
    }
}
