//! User-adjustable simulation and post-processing parameters.

use crate::constants::{DEFAULT_INITIAL_CONDITION, DEFAULT_PARTICLE_COUNT};
use crate::error::{Error, Result};
use crate::initial::InitialCondition;
use crate::uniforms::{BlurUniforms, ComputeUniforms, GraphicsUniforms, ToneMappingUniforms};

/// Host copy of every parameter block plus the settings applied on the next launch.
///
/// Setters take the integer slider values of the shell and convert them to shader units.
#[derive(Clone, Debug)]
pub struct SimulationParameters {
    pub graphics: GraphicsUniforms,
    pub compute: ComputeUniforms,
    pub blur: BlurUniforms,
    pub tone_mapping: ToneMappingUniforms,
    pub mouse_sensitivity: f32,
    /// Particle count used by the next launch
    pub pending_particle_count: u32,
    /// Initial condition used by the next launch
    pub pending_initial_condition: InitialCondition,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            graphics: GraphicsUniforms::default(),
            compute: ComputeUniforms::default(),
            blur: BlurUniforms::default(),
            tone_mapping: ToneMappingUniforms::default(),
            mouse_sensitivity: 0.5,
            pending_particle_count: DEFAULT_PARTICLE_COUNT,
            pending_initial_condition: InitialCondition::ALL
                [DEFAULT_INITIAL_CONDITION as usize],
        }
    }
}

impl SimulationParameters {
    pub fn set_gravitational_constant(&mut self, value: f64) {
        self.compute.gravity_constant = value as f32;
    }

    pub fn set_softening(&mut self, value: f64) {
        self.compute.softening_squared = value as f32;
    }

    /// Time step of the integrator; the scene pass uses it for sprite stretching.
    pub fn set_time_step(&mut self, value: f64) {
        self.compute.time_step = value as f32;
        self.graphics.time_step = value as f32;
    }

    pub fn set_bloom_strength(&mut self, value: i32) {
        self.blur.blur_strength = value as f32 / 100.0;
    }

    pub fn set_bloom_extent(&mut self, value: i32) {
        self.blur.blur_extent = value as f32 / 200.0;
    }

    pub fn set_particle_size(&mut self, value: i32) {
        self.graphics.particle_size = value as f32;
    }

    pub fn set_power(&mut self, value: i32) {
        self.compute.power = value as f32 * 0.1;
    }

    pub fn set_mouse_sensitivity(&mut self, value: i32) {
        self.mouse_sensitivity = value as f32 * 0.01;
    }

    pub fn set_exposure(&mut self, value: i32) {
        self.tone_mapping.exposure = value as f32 / 20.0;
    }

    pub fn set_gamma(&mut self, value: i32) {
        self.tone_mapping.gamma = value as f32 / 30.0;
    }

    pub fn set_tone_mapping_mode(&mut self, value: i32) {
        self.tone_mapping.tone_mapping_method = value;
    }

    /// Stage a particle count for the next launch.
    pub fn set_particle_count(&mut self, value: u32) -> Result<()> {
        if value == 0 {
            return Err(Error::InvalidParameter(
                "particle count must be positive".to_string(),
            ));
        }
        self.pending_particle_count = value;
        Ok(())
    }

    /// Stage an initial condition for the next launch.
    pub fn set_initial_condition(&mut self, value: u32) -> Result<()> {
        self.pending_initial_condition = InitialCondition::try_from(value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn slider_conversions() {
        let mut params = SimulationParameters::default();
        params.set_bloom_strength(45);
        params.set_bloom_extent(15);
        params.set_power(15);
        params.set_exposure(40);
        params.set_gamma(30);
        params.set_mouse_sensitivity(50);
        params.set_particle_size(12);

        assert_relative_eq!(params.blur.blur_strength, 0.45);
        assert_relative_eq!(params.blur.blur_extent, 0.075);
        assert_relative_eq!(params.compute.power, 1.5);
        assert_relative_eq!(params.tone_mapping.exposure, 2.0);
        assert_relative_eq!(params.tone_mapping.gamma, 1.0);
        assert_relative_eq!(params.mouse_sensitivity, 0.5);
        assert_relative_eq!(params.graphics.particle_size, 12.0);
    }

    #[test]
    fn time_step_updates_both_blocks() {
        let mut params = SimulationParameters::default();
        params.set_time_step(0.004);
        assert_relative_eq!(params.compute.time_step, 0.004);
        assert_relative_eq!(params.graphics.time_step, 0.004);
    }

    #[test]
    fn launch_settings_are_staged() {
        let mut params = SimulationParameters::default();
        assert_eq!(params.pending_particle_count, 20_000);
        assert_eq!(params.pending_initial_condition, InitialCondition::OrbitingPair);

        params.set_particle_count(4096).unwrap();
        params.set_initial_condition(3).unwrap();
        assert_eq!(params.pending_particle_count, 4096);
        assert_eq!(params.pending_initial_condition, InitialCondition::Lattice);
        // the live block is only touched by a launch
        assert_eq!(params.compute.particle_count, 0);

        assert!(params.set_particle_count(0).is_err());
        assert!(params.set_initial_condition(9).is_err());
        assert_eq!(params.pending_initial_condition, InitialCondition::Lattice);
    }
}
