//! Core types and simulation setup for the N-body engine.
//!
//! This crate provides the GPU-independent pieces of the engine:
//! - Particle records and the uniform/push-constant wire layouts shared with shaders
//! - Simulation parameters and the UI value conversions applied by setters
//! - Initial-condition generators
//! - Camera state and keyboard/mouse integration
//! - Performance samples and the status line

pub mod camera;
pub mod error;
pub mod initial;
pub mod params;
pub mod particle;
pub mod perf;
pub mod random;
pub mod status;
pub mod uniforms;

pub use camera::{Camera, CameraInput};
pub use error::{Error, Result};
pub use initial::InitialCondition;
pub use params::SimulationParameters;
pub use particle::Particle;
pub use perf::{
    stage_samples, ComputeTimings, GraphicsStage, GraphicsTimings, PerformanceSample, SampleStage,
};
pub use random::Xorshift64Star;
pub use status::{IntervalWindow, StatusLine};
pub use uniforms::{
    BlurPushConstants, BlurUniforms, ComputeUniforms, GraphicsUniforms, PerformanceMeterUniforms,
    ToneMappingUniforms,
};

/// Engine-wide constants
pub mod constants {
    /// Local work-group size of both integrator shaders (must match the shaders).
    pub const WORK_GROUP_SIZE: [u32; 3] = [128, 1, 1];
    /// Particle count used when nothing else is configured.
    pub const DEFAULT_PARTICLE_COUNT: u32 = 20_000;
    /// Initial condition used when nothing else is configured.
    pub const DEFAULT_INITIAL_CONDITION: u32 = 1;
    /// Scale of the luminance and blur targets relative to the surface.
    pub const BLUR_FRAMEBUFFER_SCALE: f32 = 0.5;
    /// Timeout for every CPU-side fence wait (1 s).
    pub const FENCE_TIMEOUT_NS: u64 = 1_000_000_000;
    /// Vertex buffer binding for per-vertex data.
    pub const VERTEX_BUFFER_BIND_ID: u32 = 0;
    /// Vertex buffer binding for per-instance particle data.
    pub const INSTANCE_BUFFER_BIND_ID: u32 = 1;
    /// Number of frame/compute intervals kept for rate averaging.
    pub const RATE_WINDOW: usize = 100;
}
