//! Order of the swapchain rebuild.

use ash::vk;

/// One stage of the rebuild after a surface change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildStep {
    /// Swapchain, chained to the old one, and its image views
    Swapchain,
    /// Shared depth buffer of the swapchain framebuffers
    Depth,
    /// HDR targets, scene depth and every framebuffer
    RenderTargets,
    /// Pool reset, allocation and writes
    DescriptorSets,
    /// Integrator, graph and present command buffers
    CommandBuffers,
    /// Projection aspect and framebuffer size in the camera block
    Camera,
}

/// Steps in the order they run.
pub const REBUILD_ORDER: [RebuildStep; 6] = [
    RebuildStep::Swapchain,
    RebuildStep::Depth,
    RebuildStep::RenderTargets,
    RebuildStep::DescriptorSets,
    RebuildStep::CommandBuffers,
    RebuildStep::Camera,
];

impl RebuildStep {
    /// Steps whose output this step reads.
    pub const fn inputs(self) -> &'static [Self] {
        match self {
            Self::Swapchain => &[],
            Self::Depth | Self::Camera => &[Self::Swapchain],
            Self::RenderTargets => &[Self::Swapchain, Self::Depth],
            Self::DescriptorSets => &[Self::RenderTargets],
            Self::CommandBuffers => &[
                Self::Swapchain,
                Self::RenderTargets,
                Self::DescriptorSets,
            ],
        }
    }
}

/// What a resize request turns into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizePlan {
    /// Minimized: keep everything and wait for a usable extent
    Deferred,
    Rebuild(vk::Extent2D),
}

pub fn plan_resize(extent: vk::Extent2D) -> ResizePlan {
    if extent.width == 0 || extent.height == 0 {
        ResizePlan::Deferred
    } else {
        ResizePlan::Rebuild(extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(step: RebuildStep) -> usize {
        REBUILD_ORDER
            .iter()
            .position(|&s| s == step)
            .unwrap_or_else(|| panic!("{step:?} missing from the rebuild"))
    }

    #[test]
    fn every_step_runs_after_its_inputs() {
        for step in REBUILD_ORDER {
            for &input in step.inputs() {
                assert!(position(input) < position(step), "{step:?} before {input:?}");
            }
        }
    }

    #[test]
    fn swapchain_first_camera_last() {
        assert_eq!(REBUILD_ORDER[0], RebuildStep::Swapchain);
        assert_eq!(REBUILD_ORDER[REBUILD_ORDER.len() - 1], RebuildStep::Camera);
        assert!(position(RebuildStep::DescriptorSets) < position(RebuildStep::CommandBuffers));
    }

    #[test]
    fn zero_extents_defer_the_whole_rebuild() {
        for (width, height) in [(0, 0), (0, 720), (1280, 0)] {
            assert_eq!(
                plan_resize(vk::Extent2D { width, height }),
                ResizePlan::Deferred
            );
        }
        let extent = vk::Extent2D {
            width: 1920,
            height: 1080,
        };
        assert_eq!(plan_resize(extent), ResizePlan::Rebuild(extent));
    }
}
