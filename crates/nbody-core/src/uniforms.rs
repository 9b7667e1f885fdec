//! Uniform and push-constant blocks shared with the shaders.
//!
//! Every struct here is copied byte-for-byte into a persistently mapped uniform buffer,
//! so field order and sizes must match the GLSL declarations under `assets/shaders`.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Camera and particle-sprite parameters for the scene pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GraphicsUniforms {
    /// Projection matrix (column-major)
    pub projection: [f32; 16],
    /// Model matrix (column-major)
    pub model: [f32; 16],
    /// View matrix (column-major)
    pub view: [f32; 16],
    /// Size of the scene framebuffer in pixels
    pub fbo_size: [f32; 2],
    /// Seconds since start-up
    pub timestamp: f32,
    /// Integration step, used for motion blur of the sprites
    pub time_step: f32,
    /// Sprite size in pixels
    pub particle_size: f32,
}

impl Default for GraphicsUniforms {
    fn default() -> Self {
        let identity = Mat4::IDENTITY.to_cols_array();
        Self {
            projection: identity,
            model: identity,
            view: identity,
            fbo_size: [0.0, 0.0],
            timestamp: 0.0,
            time_step: 0.001,
            particle_size: 20.0,
        }
    }
}

impl GraphicsUniforms {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Store the camera matrices.
    pub fn set_matrices(&mut self, projection: Mat4, view: Mat4, model: Mat4) {
        self.projection = projection.to_cols_array();
        self.view = view.to_cols_array();
        self.model = model.to_cols_array();
    }
}

/// Integrator parameters for both compute steps.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ComputeUniforms {
    pub gravity_constant: f32,
    pub time_step: f32,
    pub softening_squared: f32,
    pub power: f32,
    pub particle_count: u32,
    pub work_group_offset: [u32; 3],
}

impl Default for ComputeUniforms {
    fn default() -> Self {
        Self {
            gravity_constant: 0.001,
            time_step: 0.002,
            softening_squared: 0.005,
            power: 1.5,
            particle_count: 0,
            work_group_offset: [0, 0, 0],
        }
    }
}

impl ComputeUniforms {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Bloom blur parameters.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct BlurUniforms {
    pub blur_extent: f32,
    pub blur_strength: f32,
}

impl Default for BlurUniforms {
    fn default() -> Self {
        Self {
            blur_extent: 0.075,
            blur_strength: 0.45,
        }
    }
}

/// Push constant selecting the blur axis.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct BlurPushConstants {
    /// 1 for the horizontal pass, 0 for the vertical pass
    pub horizontal: i32,
}

impl BlurPushConstants {
    pub const HORIZONTAL: Self = Self { horizontal: 1 };
    pub const VERTICAL: Self = Self { horizontal: 0 };
}

/// Tone-mapping operator parameters.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ToneMappingUniforms {
    pub gamma: f32,
    pub exposure: f32,
    pub tone_mapping_method: i32,
}

impl Default for ToneMappingUniforms {
    fn default() -> Self {
        Self {
            gamma: 1.0,
            exposure: 2.0,
            tone_mapping_method: 1,
        }
    }
}

/// One performance-meter bar.
///
/// `positions` holds the relative share of each stage, `process_count` how many of them
/// are valid, and `relative_size` the bar length relative to the slower queue.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PerformanceMeterUniforms {
    pub positions: [f32; 8],
    pub process_count: i32,
    pub relative_size: f32,
}

impl Default for PerformanceMeterUniforms {
    fn default() -> Self {
        Self {
            positions: [0.0; 8],
            process_count: 0,
            relative_size: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn graphics_uniforms_layout() {
        assert_eq!(offset_of!(GraphicsUniforms, projection), 0);
        assert_eq!(offset_of!(GraphicsUniforms, model), 64);
        assert_eq!(offset_of!(GraphicsUniforms, view), 128);
        assert_eq!(offset_of!(GraphicsUniforms, fbo_size), 192);
        assert_eq!(offset_of!(GraphicsUniforms, timestamp), 200);
        assert_eq!(offset_of!(GraphicsUniforms, time_step), 204);
        assert_eq!(offset_of!(GraphicsUniforms, particle_size), 208);
        assert_eq!(GraphicsUniforms::SIZE, 212);
    }

    #[test]
    fn compute_uniforms_layout() {
        assert_eq!(offset_of!(ComputeUniforms, gravity_constant), 0);
        assert_eq!(offset_of!(ComputeUniforms, time_step), 4);
        assert_eq!(offset_of!(ComputeUniforms, softening_squared), 8);
        assert_eq!(offset_of!(ComputeUniforms, power), 12);
        assert_eq!(offset_of!(ComputeUniforms, particle_count), 16);
        assert_eq!(offset_of!(ComputeUniforms, work_group_offset), 20);
        assert_eq!(ComputeUniforms::SIZE, 32);
    }

    #[test]
    fn post_process_layouts() {
        assert_eq!(size_of::<BlurUniforms>(), 8);
        assert_eq!(size_of::<BlurPushConstants>(), 4);
        assert_eq!(offset_of!(ToneMappingUniforms, tone_mapping_method), 8);
        assert_eq!(size_of::<ToneMappingUniforms>(), 12);
        assert_eq!(offset_of!(PerformanceMeterUniforms, process_count), 32);
        assert_eq!(offset_of!(PerformanceMeterUniforms, relative_size), 36);
        assert_eq!(size_of::<PerformanceMeterUniforms>(), 40);
    }

    #[test]
    fn defaults() {
        let g = GraphicsUniforms::default();
        assert_eq!(g.particle_size, 20.0);
        assert_eq!(g.time_step, 0.001);
        assert_eq!(g.view, Mat4::IDENTITY.to_cols_array());

        let c = ComputeUniforms::default();
        assert_eq!(c.gravity_constant, 0.001);
        assert_eq!(c.power, 1.5);

        let t = ToneMappingUniforms::default();
        assert_eq!(t.tone_mapping_method, 1);
        assert_eq!(PerformanceMeterUniforms::default().relative_size, 1.0);
    }

    #[test]
    fn matrices_are_column_major() {
        let mut g = GraphicsUniforms::default();
        let view = Mat4::from_translation(glam::Vec3::new(0.0, 0.0, -2.5));
        g.set_matrices(Mat4::IDENTITY, view, Mat4::IDENTITY);
        // translation lives in the last column
        assert_eq!(g.view[14], -2.5);
    }
}
