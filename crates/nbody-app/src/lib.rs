//! Engine orchestration and windowing shell for the N-body simulation.
//!
//! This crate ties the other crates together:
//! - [`Engine`] owns the device, swapchain, frame graph and particle buffers, and
//!   exposes the lifecycle calls (`resize`, `launch`, `pause_compute`, `pause_all`) and
//!   the parameter setters
//! - [`run`] opens a window and drives the physics, draw and status timers from the
//!   winit event loop
//!
//! # Example
//!
//! ```no_run
//! use nbody_app::{run, EngineConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     run(EngineConfig::default().with_particle_count(8192))
//! }
//! ```
//!
//! Controls: W/S/A/D/Space move, Q/E roll, shift speeds up, right drag rotates (hold ctrl
//! for smooth rotation), the wheel zooms. F5 relaunches, F6 toggles the integrator, F7
//! pauses everything.

pub mod assets;
pub mod config;
pub mod controller;
pub mod engine;
pub mod resize;
mod runner;
pub mod timers;

pub use config::EngineConfig;
pub use controller::CameraController;
pub use engine::Engine;
pub use runner::run;
pub use timers::{Ticker, Timers};

pub use nbody_core::{InitialCondition, StatusLine};
