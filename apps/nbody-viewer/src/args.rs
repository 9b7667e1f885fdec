//! Command-line flags.

use anyhow::{bail, Context};
use nbody_app::{EngineConfig, InitialCondition};

/// What the command line asks for.
#[derive(Debug)]
pub enum Invocation {
    Run(EngineConfig),
    Help,
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> anyhow::Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .with_context(|| format!("{flag} expects a value"))
}

fn number<T>(args: &[String], i: usize, flag: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = value(args, i, flag)?;
    raw.parse()
        .with_context(|| format!("invalid value {raw:?} for {flag}"))
}

/// Parse `args` (including the program name) on top of `base`.
pub fn parse_args(args: &[String], base: EngineConfig) -> anyhow::Result<Invocation> {
    let mut config = base;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "-h" | "--help" => return Ok(Invocation::Help),
            "-n" | "--particles" => {
                let count: u32 = number(args, i, flag)?;
                if count == 0 {
                    bail!("{flag} must be positive");
                }
                config = config.with_particle_count(count);
                i += 1;
            }
            "-c" | "--condition" => {
                let condition: u32 = number(args, i, flag)?;
                InitialCondition::try_from(condition)?;
                config = config.with_initial_condition(condition);
                i += 1;
            }
            "--assets" => {
                config = config.with_assets(value(args, i, flag)?);
                i += 1;
            }
            "--width" => {
                config.width = number(args, i, flag)?;
                i += 1;
            }
            "--height" => {
                config.height = number(args, i, flag)?;
                i += 1;
            }
            "--seed" => {
                config = config.with_seed(number(args, i, flag)?);
                i += 1;
            }
            "--vsync" => config = config.with_vsync(true),
            "--validation" => config = config.with_validation(true),
            "--no-validation" => config = config.with_validation(false),
            other => bail!("unknown argument {other:?} (see --help)"),
        }
        i += 1;
    }

    Ok(Invocation::Run(config))
}

pub fn print_help() {
    let conditions: String = InitialCondition::ALL
        .iter()
        .map(|c| format!("\n                            {}  {}", c.index(), c.name()))
        .collect();
    eprintln!(
        "N-body simulation viewer

USAGE:
    cargo run -p nbody-viewer -- [OPTIONS]

SIMULATION OPTIONS:
    -n, --particles <N>     Particle count (default: 20000)
    -c, --condition <N>     Initial condition (default: 1){conditions}
    --seed <N>              Generator seed (default: time based)

DISPLAY OPTIONS:
    --width <PX>            Window width (default: 1280)
    --height <PX>           Window height (default: 720)
    --vsync                 Present with FIFO instead of MAILBOX
    --assets <DIR>          Directory holding shaders/ and textures/ (default: assets)
    --validation            Enable Vulkan validation layers
    --no-validation         Disable Vulkan validation layers

CONTROLS:
    W/S/A/D, Space          Move
    Q/E                     Roll
    Shift / Ctrl            Faster movement / smooth rotation, finer zoom
    Right mouse drag        Rotate
    Wheel                   Zoom
    F5                      Relaunch with the current settings
    F6                      Pause or resume the integrator
    F7                      Pause or resume everything
    Esc                     Quit

OTHER:
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("nbody-viewer")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    fn run(list: &[&str]) -> EngineConfig {
        match parse_args(&args(list), EngineConfig::default()).unwrap() {
            Invocation::Run(config) => config,
            Invocation::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn no_flags_keep_defaults() {
        let config = run(&[]);
        assert_eq!(config.particle_count, 20_000);
        assert_eq!(config.initial_condition, 1);
    }

    #[test]
    fn flags_override_the_base() {
        let config = run(&[
            "--particles",
            "4096",
            "-c",
            "5",
            "--width",
            "1920",
            "--height",
            "1080",
            "--vsync",
            "--seed",
            "9",
            "--assets",
            "/opt/nbody",
        ]);
        assert_eq!(config.particle_count, 4096);
        assert_eq!(config.initial_condition, 5);
        assert_eq!((config.width, config.height), (1920, 1080));
        assert!(config.vsync);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.assets, std::path::PathBuf::from("/opt/nbody"));
    }

    #[test]
    fn help_wins() {
        let invocation = parse_args(&args(&["-n", "10", "--help"]), EngineConfig::default());
        assert!(matches!(invocation, Ok(Invocation::Help)));
    }

    #[test]
    fn bad_values_are_rejected() {
        let base = EngineConfig::default;
        assert!(parse_args(&args(&["--particles"]), base()).is_err());
        assert!(parse_args(&args(&["--particles", "many"]), base()).is_err());
        assert!(parse_args(&args(&["--particles", "0"]), base()).is_err());
        assert!(parse_args(&args(&["--condition", "6"]), base()).is_err());
        assert!(parse_args(&args(&["--fullscreen"]), base()).is_err());
    }
}
