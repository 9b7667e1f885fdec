//! Vulkan abstraction layer for the N-body engine.
//!
//! This crate provides:
//! - Vulkan instance, validation messenger and device management
//! - GPU capability detection and queue family selection
//! - Memory allocation via gpu-allocator with memory-type validation
//! - Tracked image layout transitions
//! - Rollback guards for partially created resources
//! - Command buffers, fences, semaphores and timestamp queries
//! - Surface and swapchain handling
//! - Shader, pipeline, descriptor and texture helpers

pub mod capabilities;
pub mod cleanup;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod layout;
pub mod memory;
pub mod pipeline;
pub mod query;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use cleanup::Rollback;
pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{
    write_sampled_image, write_storage_buffer, write_uniform_buffer, DescriptorPool,
    DescriptorSetLayoutBuilder,
};
pub use error::{GpuError, Result, VkCheck};
pub use layout::{access_masks, set_image_layout};
pub use memory::{find_memory_type_index, AllocationStats, GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{BlendMode, ComputePipeline, GraphicsPipeline, GraphicsPipelineConfig};
pub use query::TimestampPool;
pub use shader::{load_shader_module, load_spirv};
pub use surface::SurfaceContext;
pub use swapchain::Swapchain;
pub use sync::{create_fence, create_semaphore, wait_if_not_ready, FenceState, FenceTracker};
pub use texture::{Texture, TextureKind, TextureSource};
