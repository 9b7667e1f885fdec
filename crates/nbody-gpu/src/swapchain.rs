//! Swapchain management.

use crate::error::{GpuError, Result, VkCheck};
use ash::vk;

/// Swapchain wrapper.
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Create a new swapchain, retiring `previous` once the new one exists.
    ///
    /// # Safety
    /// All handles must be valid and `previous` must not be in use.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn new(
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        capabilities: &vk::SurfaceCapabilitiesKHR,
        present_modes: &[vk::PresentModeKHR],
        surface_format: vk::SurfaceFormatKHR,
        window_extent: vk::Extent2D,
        vsync: bool,
        previous: Option<Swapchain>,
    ) -> Result<Self> {
        let present_mode = select_present_mode(present_modes, vsync);
        let image_count = clamp_image_count(desired_image_count(present_mode), capabilities);
        let extent = clamp_extent(capabilities, window_extent);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(vk::SurfaceTransformFlagsKHR::IDENTITY)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(
                previous
                    .as_ref()
                    .map_or(vk::SwapchainKHR::null(), |old| old.swapchain),
            );

        let created = swapchain_loader.create_swapchain(&create_info, None);

        // The retired swapchain goes away whether or not the new one could be created
        if let Some(old) = previous {
            old.destroy(device, swapchain_loader);
        }
        let swapchain = created.map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let images = swapchain_loader
            .get_swapchain_images(swapchain)
            .checked("vkGetSwapchainImagesKHR")?;

        let mut chain = Self {
            swapchain,
            images,
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
            present_mode,
        };
        chain.create_image_views(device)?;

        tracing::info!(
            width = extent.width,
            height = extent.height,
            images = chain.images.len(),
            ?present_mode,
            "Created swapchain"
        );

        Ok(chain)
    }

    /// Create one 2D colour view per swapchain image.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn create_image_views(&mut self, device: &ash::Device) -> Result<()> {
        for &view in &self.image_views {
            device.destroy_image_view(view, None);
        }
        self.image_views.clear();

        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(color_subresource_range());

            let view = device
                .create_image_view(&view_info, None)
                .checked("vkCreateImageView")?;
            self.image_views.push(view);
        }

        Ok(())
    }

    /// Acquire the next image, signaling `semaphore` when it is ready.
    ///
    /// Returns [`GpuError::OutOfDate`] when the swapchain must be recreated.
    ///
    /// # Safety
    /// All handles must be valid.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn acquire_next_image(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        semaphore: vk::Semaphore,
    ) -> Result<(u32, bool)> {
        let result = swapchain_loader.acquire_next_image(
            self.swapchain,
            u64::MAX,
            semaphore,
            vk::Fence::null(),
        );

        match result {
            Ok((index, suboptimal)) => Ok((index, suboptimal)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(GpuError::OutOfDate),
            Err(e) => Err(e).checked("vkAcquireNextImageKHR"),
        }
    }

    /// Present an image. Returns `true` when the swapchain should be recreated.
    ///
    /// # Safety
    /// All handles must be valid.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn present(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match swapchain_loader.queue_present(queue, &present_info) {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(e).checked("vkQueuePresentKHR"),
        }
    }

    /// Destroy the swapchain.
    ///
    /// # Safety
    /// All handles must be valid and swapchain must not be in use.
    pub unsafe fn destroy(
        &self,
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
    ) {
        for &view in &self.image_views {
            device.destroy_image_view(view, None);
        }
        swapchain_loader.destroy_swapchain(self.swapchain, None);
    }
}

/// Single-level, single-layer colour range.
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Select the present mode: MAILBOX when available and vsync is not forced, else FIFO.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Image count the engine asks for with a present mode.
pub fn desired_image_count(present_mode: vk::PresentModeKHR) -> u32 {
    if present_mode == vk::PresentModeKHR::MAILBOX {
        3
    } else {
        2
    }
}

/// Clamp an image count into the surface's supported range (max 0 means unbounded).
pub fn clamp_image_count(desired: u32, capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = desired;
    if capabilities.max_image_count > 0 {
        count = count.min(capabilities.max_image_count);
    }
    count.max(capabilities.min_image_count)
}

/// The surface's current extent clamped into its supported range.
///
/// Surfaces that leave the extent to the swapchain (`u32::MAX`) use the window size.
pub fn clamp_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    let current = if capabilities.current_extent.width == u32::MAX {
        window_extent
    } else {
        capabilities.current_extent
    };
    vk::Extent2D {
        width: current.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: current.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn mailbox_preferred_over_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(select_present_mode(&modes, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(select_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::IMMEDIATE], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn mailbox_raises_image_count() {
        assert_eq!(desired_image_count(vk::PresentModeKHR::MAILBOX), 3);
        assert_eq!(desired_image_count(vk::PresentModeKHR::FIFO), 2);
    }

    #[test]
    fn image_count_is_clamped() {
        assert_eq!(clamp_image_count(3, &capabilities(2, 2)), 2);
        assert_eq!(clamp_image_count(2, &capabilities(3, 8)), 3);
        // zero maximum means no upper bound
        assert_eq!(clamp_image_count(3, &capabilities(1, 0)), 3);
    }

    #[test]
    fn extent_is_clamped_to_surface_limits() {
        let window = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let mut caps = capabilities(2, 3);
        assert_eq!(
            clamp_extent(&caps, window),
            vk::Extent2D {
                width: 1280,
                height: 720
            }
        );

        caps.current_extent = vk::Extent2D {
            width: 8000,
            height: 0,
        };
        assert_eq!(
            clamp_extent(&caps, window),
            vk::Extent2D {
                width: 4096,
                height: 1
            }
        );
    }

    #[test]
    fn undetermined_extent_uses_window_size() {
        let mut caps = capabilities(2, 3);
        caps.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        let window = vk::Extent2D {
            width: 1920,
            height: 1080,
        };
        assert_eq!(clamp_extent(&caps, window), window);
    }
}
