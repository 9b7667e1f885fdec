//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use nbody_core::constants::{DEFAULT_INITIAL_CONDITION, DEFAULT_PARTICLE_COUNT};

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Window title until the first status line replaces it.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Particles generated by the first launch.
    pub particle_count: u32,
    /// Initial condition selector of the first launch.
    pub initial_condition: u32,
    /// Directory holding `shaders/` and `textures/`.
    pub assets: PathBuf,
    /// Enable vsync (FIFO instead of MAILBOX).
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Interval of the physics tick.
    pub physics_interval: Duration,
    /// Interval of the draw tick.
    pub draw_interval: Duration,
    /// Interval of the status-line refresh.
    pub status_interval: Duration,
    /// Seed of the initial-condition generator; time-based when absent.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "N-body simulation".to_string(),
            width: 1280,
            height: 720,
            particle_count: DEFAULT_PARTICLE_COUNT,
            initial_condition: DEFAULT_INITIAL_CONDITION,
            assets: PathBuf::from("assets"),
            vsync: false,
            validation: cfg!(debug_assertions),
            physics_interval: Duration::from_millis(1),
            draw_interval: Duration::from_millis(1),
            status_interval: Duration::from_millis(50),
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_particle_count(mut self, count: u32) -> Self {
        self.particle_count = count;
        self
    }

    pub fn with_initial_condition(mut self, condition: u32) -> Self {
        self.initial_condition = condition;
        self
    }

    /// Set the asset root.
    pub fn with_assets(mut self, assets: impl Into<PathBuf>) -> Self {
        self.assets = assets.into();
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the physics and draw tick intervals.
    pub fn with_tick_intervals(mut self, physics: Duration, draw: Duration) -> Self {
        self.physics_interval = physics;
        self.draw_interval = draw;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.particle_count, 20_000);
        assert_eq!(config.initial_condition, 1);
        assert_eq!(config.physics_interval, Duration::from_millis(1));
        assert_eq!(config.status_interval, Duration::from_millis(50));
        assert!(!config.vsync);
    }

    #[test]
    fn builder_overrides() {
        let config = EngineConfig::new("test")
            .with_size(800, 600)
            .with_particle_count(4096)
            .with_initial_condition(5)
            .with_assets("/tmp/assets")
            .with_vsync(true)
            .with_validation(false)
            .with_tick_intervals(Duration::from_millis(2), Duration::from_millis(8))
            .with_seed(7);
        assert_eq!(config.title, "test");
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.particle_count, 4096);
        assert_eq!(config.initial_condition, 5);
        assert_eq!(config.assets, PathBuf::from("/tmp/assets"));
        assert!(config.vsync);
        assert!(!config.validation);
        assert_eq!(config.physics_interval, Duration::from_millis(2));
        assert_eq!(config.draw_interval, Duration::from_millis(8));
        assert_eq!(config.seed, Some(7));
    }
}
