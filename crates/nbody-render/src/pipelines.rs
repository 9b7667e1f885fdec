//! Compute and graphics pipelines of the engine.
//!
//! Shaders are loaded as SPIR-V from `<assets>/shaders/<name>.spv`.

use crate::descriptor_sets::{DescriptorLayouts, SetLayout};
use crate::geometry::{particle_vertex_input, quad_vertex_input};
use crate::render_pass::RenderPasses;
use ash::vk;
use nbody_core::BlurPushConstants;
use nbody_gpu::{load_spirv, ComputePipeline, GraphicsPipeline, GraphicsPipelineConfig, Result};
use std::mem::size_of;
use std::path::{Path, PathBuf};

/// Compiled shader names, without the `.spv` suffix.
pub const SHADER_NAMES: [&str; 12] = [
    "nbody_leapfrog_step_one.comp",
    "nbody_leapfrog_step_two.comp",
    "nbody.vert",
    "nbody.frag",
    "luminosity.vert",
    "luminosity.frag",
    "gaussblur.vert",
    "gaussblur.frag",
    "normal_texture.vert",
    "normal_texture.frag",
    "performance_meter.vert",
    "performance_meter.frag",
];

/// Shaders of the tone-mapping pass; listed apart so [`SHADER_NAMES`] stays grouped by pass.
pub const TONE_MAPPING_SHADERS: [&str; 2] = ["tone_mapping.vert", "tone_mapping.frag"];

/// Path of a compiled shader below the asset root.
pub fn shader_path(assets: &Path, name: &str) -> PathBuf {
    assets.join("shaders").join(format!("{name}.spv"))
}

/// Push-constant range of the blur pipeline.
pub fn blur_push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange::default()
        .stage_flags(vk::ShaderStageFlags::FRAGMENT)
        .offset(0)
        .size(size_of::<BlurPushConstants>() as u32)
}

/// Every pipeline the engine binds.
pub struct Pipelines {
    pub leapfrog_step_one: ComputePipeline,
    pub leapfrog_step_two: ComputePipeline,
    pub nbody: GraphicsPipeline,
    pub luminosity: GraphicsPipeline,
    pub blur: GraphicsPipeline,
    pub normal_texture: GraphicsPipeline,
    pub performance_meter: GraphicsPipeline,
    pub tone_mapping: GraphicsPipeline,
}

struct ShaderLoader<'a> {
    assets: &'a Path,
}

impl ShaderLoader<'_> {
    fn load(&self, name: &str) -> Result<Vec<u32>> {
        let path = shader_path(self.assets, name);
        let code = load_spirv(&path)?;
        tracing::debug!(path = %path.display(), words = code.len(), "Loaded shader");
        Ok(code)
    }

    fn fullscreen(&self, effect: &str, render_pass: vk::RenderPass) -> Result<GraphicsPipelineConfig> {
        let (vertex_bindings, vertex_attributes) = quad_vertex_input();
        Ok(GraphicsPipelineConfig {
            vertex_shader: self.load(&format!("{effect}.vert"))?,
            fragment_shader: self.load(&format!("{effect}.frag"))?,
            vertex_bindings,
            vertex_attributes,
            render_pass,
            ..Default::default()
        })
    }
}

impl Pipelines {
    /// Load every shader and build the pipelines.
    ///
    /// # Safety
    /// The device and all handles must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        assets: &Path,
        layouts: &DescriptorLayouts,
        passes: &RenderPasses,
    ) -> Result<Self> {
        let shaders = ShaderLoader { assets };

        // 1. Integrator
        let leapfrog = [layouts.get(SetLayout::Leapfrog)];
        let leapfrog_step_one = ComputePipeline::new(
            device,
            &shaders.load("nbody_leapfrog_step_one.comp")?,
            &leapfrog,
            &[],
        )?;
        let leapfrog_step_two = ComputePipeline::new(
            device,
            &shaders.load("nbody_leapfrog_step_two.comp")?,
            &leapfrog,
            &[],
        )?;

        // 2. Particle sprites; depth is written but never tested so sprites blend freely
        let (vertex_bindings, vertex_attributes) = particle_vertex_input();
        let nbody_config = GraphicsPipelineConfig {
            vertex_shader: shaders.load("nbody.vert")?,
            fragment_shader: shaders.load("nbody.frag")?,
            vertex_bindings,
            vertex_attributes,
            depth_test: false,
            depth_write: true,
            render_pass: passes.hdr_color_depth,
            ..Default::default()
        };
        let nbody = GraphicsPipeline::new(device, &nbody_config, &[layouts.get(SetLayout::Nbody)], &[])?;

        // 3. Post-processing
        let normal_texture_layout = [layouts.get(SetLayout::NormalTexture)];
        let luminosity = GraphicsPipeline::new(
            device,
            &shaders.fullscreen("luminosity", passes.hdr)?,
            &normal_texture_layout,
            &[],
        )?;
        let blur = GraphicsPipeline::new(
            device,
            &shaders.fullscreen("gaussblur", passes.hdr)?,
            &[layouts.get(SetLayout::Blur)],
            &[blur_push_constant_range()],
        )?;
        let normal_texture = GraphicsPipeline::new(
            device,
            &shaders.fullscreen("normal_texture", passes.hdr)?,
            &normal_texture_layout,
            &[],
        )?;
        let performance_meter = GraphicsPipeline::new(
            device,
            &shaders.fullscreen("performance_meter", passes.hdr)?,
            &[layouts.get(SetLayout::Performance)],
            &[],
        )?;
        let tone_mapping = GraphicsPipeline::new(
            device,
            &shaders.fullscreen("tone_mapping", passes.ldr)?,
            &[layouts.get(SetLayout::ToneMapping)],
            &[],
        )?;

        tracing::info!("Created pipelines");

        Ok(Self {
            leapfrog_step_one,
            leapfrog_step_two,
            nbody,
            luminosity,
            blur,
            normal_texture,
            performance_meter,
            tone_mapping,
        })
    }

    /// Destroy every pipeline and its layout.
    ///
    /// # Safety
    /// No command buffer using the pipelines may be pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        self.leapfrog_step_one.destroy(device);
        self.leapfrog_step_two.destroy(device);
        self.nbody.destroy(device);
        self.luminosity.destroy(device);
        self.blur.destroy(device);
        self.normal_texture.destroy(device);
        self.performance_meter.destroy(device);
        self.tone_mapping.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shaders_live_below_the_asset_root() {
        let path = shader_path(Path::new("assets"), "nbody.vert");
        assert_eq!(path, Path::new("assets").join("shaders").join("nbody.vert.spv"));
    }

    #[test]
    fn every_graphics_effect_has_both_stages() {
        let names: Vec<&str> = SHADER_NAMES.iter().chain(&TONE_MAPPING_SHADERS).copied().collect();
        for effect in ["nbody", "luminosity", "gaussblur", "normal_texture", "performance_meter", "tone_mapping"] {
            assert!(names.contains(&format!("{effect}.vert").as_str()), "{effect}");
            assert!(names.contains(&format!("{effect}.frag").as_str()), "{effect}");
        }
    }

    #[test]
    fn blur_direction_is_a_fragment_push_constant() {
        let range = blur_push_constant_range();
        assert_eq!(range.size, 4);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }
}
