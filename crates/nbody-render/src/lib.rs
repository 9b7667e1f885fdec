//! HDR render graph and integrator recording for the N-body engine.
//!
//! This crate provides:
//! - Render passes, HDR targets and the shared depth buffer
//! - Descriptor layouts, pool and sets
//! - The compute and graphics pipelines
//! - The six-pass frame graph and swapchain present transitions
//! - Particle buffers and the two integrator steps
//! - Fences and semaphores ordering compute, transfer, draw and present

pub mod depth;
pub mod descriptor_sets;
pub mod geometry;
pub mod graph;
pub mod physics;
pub mod pipelines;
pub mod present;
pub mod render_pass;
pub mod sync;
pub mod targets;
pub mod uniforms;

pub use depth::DepthBuffer;
pub use descriptor_sets::{DescriptorInputs, DescriptorLayouts, DescriptorSets, SetId, SetLayout};
pub use geometry::Geometry;
pub use graph::{GraphCommands, GraphInputs, PassDesc, PassOutput, PASSES};
pub use physics::{ParticleBuffers, PhysicsCommands, PhysicsInputs};
pub use pipelines::Pipelines;
pub use present::PresentCommands;
pub use render_pass::{RenderPasses, HDR_FORMAT};
pub use sync::SyncObjects;
pub use targets::{RenderTargets, TargetExtents, TargetId};
pub use uniforms::UniformBuffers;
