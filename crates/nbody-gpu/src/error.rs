//! GPU error types.

use ash::vk;
use std::panic::Location;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// A Vulkan call returned an unexpected result.
    #[error("{call} failed with {result:?} at {location}")]
    Call {
        call: &'static str,
        location: String,
        result: vk::Result,
    },

    /// Vulkan error without call-site context.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader could not be opened.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// No queue family offers graphics, compute and transfer with two queues.
    #[error("No queue family supports graphics, compute and transfer with at least two queues")]
    NoSuitableQueueFamily,

    /// No memory type matches the requested type bits and property flags.
    #[error("No compatible memory type for bits {type_bits:#034b} with {properties:?}")]
    NoCompatibleMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },

    /// None of the candidate depth formats is usable as a depth-stencil attachment.
    #[error("No supported depth format")]
    NoDepthFormat,

    /// The queue family cannot present to the surface.
    #[error("WSI not supported on queue family {0}")]
    WsiNotSupported(u32),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// The swapchain no longer matches the surface and must be recreated.
    #[error("Swapchain out of date")]
    OutOfDate,

    /// A shader or texture file could not be read.
    #[error("Asset {path} could not be loaded: {reason}")]
    AssetMissing { path: String, reason: String },

    /// Shader module creation failed.
    #[error("Shader module creation failed: {0}")]
    ShaderCompilation(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// A fence did not signal within the wait timeout.
    #[error("Fence {name} was not signaled within {timeout_ms} ms")]
    FenceTimeout { name: &'static str, timeout_ms: u64 },

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

/// Attach the call name and caller location to a raw Vulkan result.
pub trait VkCheck<T> {
    fn checked(self, call: &'static str) -> Result<T>;
}

impl<T> VkCheck<T> for std::result::Result<T, vk::Result> {
    #[track_caller]
    fn checked(self, call: &'static str) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(result) => {
                let location = Location::caller();
                Err(GpuError::Call {
                    call,
                    location: format!("{}:{}", location.file(), location.line()),
                    result,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_records_call_and_location() {
        let raw: std::result::Result<(), vk::Result> = Err(vk::Result::ERROR_DEVICE_LOST);
        let err = raw.checked("vkQueueSubmit").unwrap_err();
        match err {
            GpuError::Call {
                call,
                location,
                result,
            } => {
                assert_eq!(call, "vkQueueSubmit");
                assert!(location.contains("error.rs"));
                assert_eq!(result, vk::Result::ERROR_DEVICE_LOST);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn checked_passes_values_through() {
        let raw: std::result::Result<u32, vk::Result> = Ok(7);
        assert_eq!(raw.checked("vkAcquireNextImageKHR").unwrap(), 7);
    }

    #[test]
    fn call_error_message_names_the_call() {
        let err = GpuError::Call {
            call: "vkCreateFence",
            location: "sync.rs:12".to_string(),
            result: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
        };
        let message = err.to_string();
        assert!(message.starts_with("vkCreateFence failed"));
        assert!(message.ends_with("at sync.rs:12"));
    }
}
