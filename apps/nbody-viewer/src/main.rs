//! N-body simulation viewer
//!
//! Integrates a gravitational particle system on the GPU and renders it with bloom and
//! tone mapping. The window title shows frame and computation rates.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p nbody-viewer -- [OPTIONS]
//! ```
//!
//! ## Examples
//!
//! ```bash
//! # Default: 20000 particles in two orbiting clusters
//! cargo run -p nbody-viewer
//!
//! # A larger lattice with a fixed seed
//! cargo run -p nbody-viewer -- --particles 65536 --condition 3 --seed 42
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod args;

use nbody_app::{run, EngineConfig};

use crate::args::{parse_args, print_help, Invocation};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let base = EngineConfig::new("N-body simulation").with_size(WIDTH, HEIGHT);

    match parse_args(&args, base)? {
        Invocation::Help => {
            print_help();
            Ok(())
        }
        Invocation::Run(config) => run(config),
    }
}
