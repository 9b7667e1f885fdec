//! Surface management for windowed rendering.
//!
//! Provides abstractions for Vulkan surface creation and management,
//! hiding the raw-window-handle complexity from application code.

use crate::context::GpuContext;
use crate::error::{GpuError, Result, VkCheck};
use crate::swapchain::Swapchain;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 5] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM_S8_UINT,
    vk::Format::D16_UNORM,
];

/// Surface context for windowed rendering.
///
/// Owns the Vulkan surface and the extension loaders, and remembers the colour and depth
/// formats chosen for it.
pub struct SurfaceContext {
    /// The Vulkan surface handle.
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader.
    pub surface_loader: ash::khr::surface::Instance,
    /// Swapchain extension loader.
    pub swapchain_loader: ash::khr::swapchain::Device,
    /// Colour format and colour space of the swapchain images.
    pub surface_format: vk::SurfaceFormatKHR,
    /// Format of the shared depth-stencil target.
    pub depth_format: vk::Format,
}

impl SurfaceContext {
    /// Create a new surface context from a window.
    ///
    /// Fails if the engine's queue family cannot present to the surface, the surface
    /// reports no formats, or no depth format is usable.
    ///
    /// # Safety
    /// The GPU context must be valid and the window must have valid handles.
    pub unsafe fn from_window<W>(gpu: &GpuContext, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        let surface = ash_window::create_surface(
            gpu.entry(),
            gpu.instance(),
            display.as_raw(),
            window_handle.as_raw(),
            None,
        )
        .checked("vkCreateSurfaceKHR")?;

        let surface_loader = ash::khr::surface::Instance::new(gpu.entry(), gpu.instance());

        match Self::choose_formats(gpu, &surface_loader, surface) {
            Ok((surface_format, depth_format)) => {
                let swapchain_loader = ash::khr::swapchain::Device::new(gpu.instance(), gpu.device());
                tracing::info!(
                    color = ?surface_format.format,
                    depth = ?depth_format,
                    "Created surface"
                );
                Ok(Self {
                    surface,
                    surface_loader,
                    swapchain_loader,
                    surface_format,
                    depth_format,
                })
            }
            Err(err) => {
                surface_loader.destroy_surface(surface, None);
                Err(err)
            }
        }
    }

    unsafe fn choose_formats(
        gpu: &GpuContext,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::SurfaceFormatKHR, vk::Format)> {
        let supported = surface_loader
            .get_physical_device_surface_support(gpu.physical_device(), gpu.queue_family(), surface)
            .checked("vkGetPhysicalDeviceSurfaceSupportKHR")?;
        if !supported {
            return Err(GpuError::WsiNotSupported(gpu.queue_family()));
        }

        let formats = surface_loader
            .get_physical_device_surface_formats(gpu.physical_device(), surface)
            .checked("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        let surface_format = select_surface_format(&formats)?;

        let depth_format = select_depth_format(|format| {
            gpu.instance()
                .get_physical_device_format_properties(gpu.physical_device(), format)
                .optimal_tiling_features
        })?;

        Ok((surface_format, depth_format))
    }

    /// Query the current surface capabilities.
    pub fn capabilities(&self, gpu: &GpuContext) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(gpu.physical_device(), self.surface)
                .checked("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
        }
    }

    /// Present modes supported by the surface.
    pub fn present_modes(&self, gpu: &GpuContext) -> Result<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(gpu.physical_device(), self.surface)
                .checked("vkGetPhysicalDeviceSurfacePresentModesKHR")
        }
    }

    /// Create a swapchain for this surface, chained to `previous`.
    ///
    /// Waits for the device to be idle first. The previous swapchain, if any, is destroyed
    /// once the new one exists.
    ///
    /// # Safety
    /// The GPU context must be valid.
    pub unsafe fn create_swapchain(
        &self,
        gpu: &GpuContext,
        window_extent: vk::Extent2D,
        vsync: bool,
        previous: Option<Swapchain>,
    ) -> Result<Swapchain> {
        gpu.wait_idle()?;

        let capabilities = self.capabilities(gpu)?;
        let present_modes = self.present_modes(gpu)?;

        Swapchain::new(
            gpu.device(),
            &self.swapchain_loader,
            self.surface,
            &capabilities,
            &present_modes,
            self.surface_format,
            window_extent,
            vsync,
            previous,
        )
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// The surface must not be in use.
    pub unsafe fn destroy(&self) {
        self.surface_loader.destroy_surface(self.surface, None);
    }
}

/// Select the surface format: the first reported entry, with UNDEFINED meaning "any".
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    let first = available
        .first()
        .ok_or_else(|| GpuError::SurfaceCreation("surface reports no formats".into()))?;

    if first.format == vk::Format::UNDEFINED {
        Ok(vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        })
    } else {
        Ok(*first)
    }
}

/// First depth format whose optimal-tiling features include depth-stencil attachment use.
pub fn select_depth_format(
    optimal_features: impl Fn(vk::Format) -> vk::FormatFeatureFlags,
) -> Result<vk::Format> {
    DEPTH_FORMAT_CANDIDATES
        .into_iter()
        .find(|&format| {
            optimal_features(format).contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or(GpuError::NoDepthFormat)
}

/// Aspect flags of a depth format.
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT | vk::Format::D16_UNORM => vk::ImageAspectFlags::DEPTH,
        _ => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn first_surface_format_is_used() {
        let formats = [
            format(vk::Format::B8G8R8A8_UNORM),
            format(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(
            select_surface_format(&formats).unwrap().format,
            vk::Format::B8G8R8A8_UNORM
        );
    }

    #[test]
    fn undefined_surface_format_maps_to_rgba8() {
        let chosen = select_surface_format(&[format(vk::Format::UNDEFINED)]).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn empty_format_list_is_an_error() {
        assert!(select_surface_format(&[]).is_err());
    }

    #[test]
    fn depth_format_follows_preference_order() {
        let chosen = select_depth_format(|format| match format {
            vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM => {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            }
            _ => vk::FormatFeatureFlags::SAMPLED_IMAGE,
        })
        .unwrap();
        assert_eq!(chosen, vk::Format::D24_UNORM_S8_UINT);
    }

    #[test]
    fn missing_depth_format_is_an_error() {
        let result = select_depth_format(|_| vk::FormatFeatureFlags::empty());
        assert!(matches!(result, Err(GpuError::NoDepthFormat)));
    }

    #[test]
    fn stencil_aspect_only_for_stencil_formats() {
        assert_eq!(depth_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            depth_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
