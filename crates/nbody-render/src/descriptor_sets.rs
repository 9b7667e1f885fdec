//! Descriptor set layouts and the sets bound by the graph and the integrator.
//!
//! All sets come from one pool that is reset as a whole on resize and relaunch; the sets
//! are then allocated and written again against the new resources.

use crate::targets::{RenderTargets, TargetId};
use crate::uniforms::UniformBuffers;
use ash::vk;
use nbody_gpu::{
    write_sampled_image, write_storage_buffer, write_uniform_buffer, DescriptorPool,
    DescriptorSetLayoutBuilder, GpuBuffer, Result, Texture,
};

const COMPUTE: vk::ShaderStageFlags = vk::ShaderStageFlags::COMPUTE;
const FRAGMENT: vk::ShaderStageFlags = vk::ShaderStageFlags::FRAGMENT;
const VERTEX_FRAGMENT: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

const UBO: vk::DescriptorType = vk::DescriptorType::UNIFORM_BUFFER;
const SAMPLER: vk::DescriptorType = vk::DescriptorType::COMBINED_IMAGE_SAMPLER;
const STORAGE: vk::DescriptorType = vk::DescriptorType::STORAGE_BUFFER;

/// Upper bound of sets allocated from the pool.
pub const MAX_SETS: u32 = 30;

/// Descriptor counts reserved in the pool.
pub const POOL_SIZES: [vk::DescriptorPoolSize; 3] = [
    vk::DescriptorPoolSize {
        ty: UBO,
        descriptor_count: 20,
    },
    vk::DescriptorPoolSize {
        ty: SAMPLER,
        descriptor_count: 30,
    },
    vk::DescriptorPoolSize {
        ty: STORAGE,
        descriptor_count: 5,
    },
];

/// Descriptor set layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SetLayout {
    /// Particles and integrator parameters
    Leapfrog,
    /// One performance-meter bar
    Performance,
    /// Camera block, sprite and noise textures
    Nbody,
    /// Blur input and blur parameters
    Blur,
    /// A single sampled texture
    NormalTexture,
    /// Tone-mapping input and parameters
    ToneMapping,
}

impl SetLayout {
    pub const ALL: [Self; 6] = [
        Self::Leapfrog,
        Self::Performance,
        Self::Nbody,
        Self::Blur,
        Self::NormalTexture,
        Self::ToneMapping,
    ];

    /// `(binding, type, stages)` of every binding.
    pub const fn bindings(self) -> &'static [(u32, vk::DescriptorType, vk::ShaderStageFlags)] {
        match self {
            Self::Leapfrog => &[(0, STORAGE, COMPUTE), (1, UBO, COMPUTE)],
            Self::Performance => &[(0, UBO, VERTEX_FRAGMENT)],
            Self::Nbody => &[
                (0, UBO, VERTEX_FRAGMENT),
                (1, SAMPLER, FRAGMENT),
                (2, SAMPLER, FRAGMENT),
            ],
            Self::Blur => &[(0, SAMPLER, FRAGMENT), (1, UBO, FRAGMENT)],
            Self::NormalTexture => &[(0, SAMPLER, FRAGMENT)],
            Self::ToneMapping => &[(0, SAMPLER, FRAGMENT), (1, UBO, FRAGMENT)],
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Leapfrog => 0,
            Self::Performance => 1,
            Self::Nbody => 2,
            Self::Blur => 3,
            Self::NormalTexture => 4,
            Self::ToneMapping => 5,
        }
    }
}

/// Every set the engine allocates, in allocation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SetId {
    Leapfrog,
    PerformanceCompute,
    PerformanceGraphics,
    Nbody,
    /// Samples the scene target
    Luminosity,
    /// Samples the luminance target
    BlurAlpha,
    /// Samples the first blur target
    BlurBeta,
    NormalTextureScene,
    /// Samples the second blur target (the bloom)
    NormalTextureBlur,
    ToneMapping,
}

impl SetId {
    pub const ALL: [Self; 10] = [
        Self::Leapfrog,
        Self::PerformanceCompute,
        Self::PerformanceGraphics,
        Self::Nbody,
        Self::Luminosity,
        Self::BlurAlpha,
        Self::BlurBeta,
        Self::NormalTextureScene,
        Self::NormalTextureBlur,
        Self::ToneMapping,
    ];

    pub const fn layout(self) -> SetLayout {
        match self {
            Self::Leapfrog => SetLayout::Leapfrog,
            Self::PerformanceCompute | Self::PerformanceGraphics => SetLayout::Performance,
            Self::Nbody => SetLayout::Nbody,
            Self::Luminosity | Self::NormalTextureScene | Self::NormalTextureBlur => {
                SetLayout::NormalTexture
            }
            Self::BlurAlpha | Self::BlurBeta => SetLayout::Blur,
            Self::ToneMapping => SetLayout::ToneMapping,
        }
    }
}

/// Render targets sampled by the post-processing sets, as `(set, binding, target)`.
pub const TARGET_BINDINGS: [(SetId, u32, TargetId); 6] = [
    (SetId::Luminosity, 0, TargetId::Scene),
    (SetId::BlurAlpha, 0, TargetId::Luminance),
    (SetId::BlurBeta, 0, TargetId::BlurA),
    (SetId::NormalTextureScene, 0, TargetId::Scene),
    (SetId::NormalTextureBlur, 0, TargetId::BlurB),
    (SetId::ToneMapping, 0, TargetId::Combine),
];

/// The created layouts, indexed by [`SetLayout`].
pub struct DescriptorLayouts {
    layouts: [vk::DescriptorSetLayout; 6],
}

impl DescriptorLayouts {
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        let mut layouts = [vk::DescriptorSetLayout::null(); 6];
        for layout in SetLayout::ALL {
            let builder = layout
                .bindings()
                .iter()
                .fold(DescriptorSetLayoutBuilder::new(), |builder, &(binding, ty, stages)| {
                    builder.binding(binding, ty, 1, stages)
                });
            layouts[layout.index()] = builder.build(device)?;
        }
        Ok(Self { layouts })
    }

    pub fn get(&self, layout: SetLayout) -> vk::DescriptorSetLayout {
        self.layouts[layout.index()]
    }

    /// # Safety
    /// No pipeline layout or pool using the layouts may be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        for &layout in &self.layouts {
            device.destroy_descriptor_set_layout(layout, None);
        }
    }
}

/// Create the shared descriptor pool.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_pool(device: &ash::Device) -> Result<DescriptorPool> {
    DescriptorPool::new(device, MAX_SETS, &POOL_SIZES)
}

/// Resources the sets point at.
pub struct DescriptorInputs<'a> {
    pub uniforms: &'a UniformBuffers,
    /// Storage buffer integrated by the compute steps
    pub particles: &'a GpuBuffer,
    pub particle_texture: &'a Texture,
    pub noise_texture: &'a Texture,
    pub targets: &'a RenderTargets,
}

/// Allocated descriptor sets.
#[derive(Clone, Copy, Debug)]
pub struct DescriptorSets {
    pub leapfrog: vk::DescriptorSet,
    pub performance_compute: vk::DescriptorSet,
    pub performance_graphics: vk::DescriptorSet,
    pub nbody: vk::DescriptorSet,
    /// Samples the scene target
    pub luminosity: vk::DescriptorSet,
    /// Samples the luminance target
    pub blur_alpha: vk::DescriptorSet,
    /// Samples the first blur target
    pub blur_beta: vk::DescriptorSet,
    pub normal_texture_scene: vk::DescriptorSet,
    /// Samples the second blur target (the bloom)
    pub normal_texture_blur: vk::DescriptorSet,
    pub tone_mapping: vk::DescriptorSet,
}

impl DescriptorSets {
    /// Allocate every set from `pool`.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate(
        device: &ash::Device,
        pool: &DescriptorPool,
        layouts: &DescriptorLayouts,
    ) -> Result<Self> {
        let handles: Vec<vk::DescriptorSetLayout> =
            SetId::ALL.iter().map(|id| layouts.get(id.layout())).collect();
        let sets = pool.allocate(device, &handles)?;
        let set = |id: SetId| {
            SetId::ALL
                .iter()
                .position(|&other| other == id)
                .and_then(|i| sets.get(i).copied())
                .ok_or_else(|| {
                    nbody_gpu::GpuError::InvalidState(format!("descriptor set {id:?} not allocated"))
                })
        };

        Ok(Self {
            leapfrog: set(SetId::Leapfrog)?,
            performance_compute: set(SetId::PerformanceCompute)?,
            performance_graphics: set(SetId::PerformanceGraphics)?,
            nbody: set(SetId::Nbody)?,
            luminosity: set(SetId::Luminosity)?,
            blur_alpha: set(SetId::BlurAlpha)?,
            blur_beta: set(SetId::BlurBeta)?,
            normal_texture_scene: set(SetId::NormalTextureScene)?,
            normal_texture_blur: set(SetId::NormalTextureBlur)?,
            tone_mapping: set(SetId::ToneMapping)?,
        })
    }

    pub const fn get(&self, id: SetId) -> vk::DescriptorSet {
        match id {
            SetId::Leapfrog => self.leapfrog,
            SetId::PerformanceCompute => self.performance_compute,
            SetId::PerformanceGraphics => self.performance_graphics,
            SetId::Nbody => self.nbody,
            SetId::Luminosity => self.luminosity,
            SetId::BlurAlpha => self.blur_alpha,
            SetId::BlurBeta => self.blur_beta,
            SetId::NormalTextureScene => self.normal_texture_scene,
            SetId::NormalTextureBlur => self.normal_texture_blur,
            SetId::ToneMapping => self.tone_mapping,
        }
    }

    /// `(set, binding, view)` of every render-target image write.
    pub fn target_writes(
        &self,
        targets: &RenderTargets,
    ) -> [(vk::DescriptorSet, u32, vk::ImageView); 6] {
        TARGET_BINDINGS
            .map(|(set, binding, target)| (self.get(set), binding, targets.get(target).view))
    }

    /// Point every set at its resources.
    ///
    /// # Safety
    /// The device and all resources in `inputs` must be valid.
    pub unsafe fn write(&self, device: &ash::Device, inputs: &DescriptorInputs<'_>) {
        let uniforms = inputs.uniforms;
        let targets = inputs.targets;

        // Integrator
        write_storage_buffer(
            device,
            self.leapfrog,
            0,
            inputs.particles.buffer,
            inputs.particles.size,
        );
        write_uniform_buffer(
            device,
            self.leapfrog,
            1,
            uniforms.compute.buffer,
            uniforms.compute.size,
        );

        // Performance meters
        write_uniform_buffer(
            device,
            self.performance_compute,
            0,
            uniforms.performance_compute.buffer,
            uniforms.performance_compute.size,
        );
        write_uniform_buffer(
            device,
            self.performance_graphics,
            0,
            uniforms.performance_graphics.buffer,
            uniforms.performance_graphics.size,
        );

        // Scene
        write_uniform_buffer(
            device,
            self.nbody,
            0,
            uniforms.graphics.buffer,
            uniforms.graphics.size,
        );
        for (binding, texture) in [(1, inputs.particle_texture), (2, inputs.noise_texture)] {
            write_sampled_image(
                device,
                self.nbody,
                binding,
                texture.sampler,
                texture.view,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        }

        // Post-processing
        for (set, binding, view) in self.target_writes(targets) {
            write_sampled_image(
                device,
                set,
                binding,
                targets.sampler,
                view,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        }
        for set in [self.blur_alpha, self.blur_beta] {
            write_uniform_buffer(device, set, 1, uniforms.blur.buffer, uniforms.blur.size);
        }
        write_uniform_buffer(
            device,
            self.tone_mapping,
            1,
            uniforms.tone_mapping.buffer,
            uniforms.tone_mapping.size,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::placeholder_targets;
    use ash::vk::Handle;
    use std::collections::{HashMap, HashSet};

    fn placeholder_sets() -> DescriptorSets {
        let set = |id: SetId| {
            let index = SetId::ALL.iter().position(|&other| other == id).unwrap_or(0);
            vk::DescriptorSet::from_raw(1 + index as u64)
        };
        DescriptorSets {
            leapfrog: set(SetId::Leapfrog),
            performance_compute: set(SetId::PerformanceCompute),
            performance_graphics: set(SetId::PerformanceGraphics),
            nbody: set(SetId::Nbody),
            luminosity: set(SetId::Luminosity),
            blur_alpha: set(SetId::BlurAlpha),
            blur_beta: set(SetId::BlurBeta),
            normal_texture_scene: set(SetId::NormalTextureScene),
            normal_texture_blur: set(SetId::NormalTextureBlur),
            tone_mapping: set(SetId::ToneMapping),
        }
    }

    fn demand() -> HashMap<vk::DescriptorType, u32> {
        let mut counts = HashMap::new();
        for id in SetId::ALL {
            for &(_, ty, _) in id.layout().bindings() {
                *counts.entry(ty).or_insert(0) += 1;
            }
        }
        counts
    }

    #[test]
    fn pool_covers_every_set() {
        assert!(SetId::ALL.len() as u32 <= MAX_SETS);
        for (ty, needed) in demand() {
            let reserved = POOL_SIZES
                .iter()
                .find(|size| size.ty == ty)
                .map_or(0, |size| size.descriptor_count);
            assert!(needed <= reserved, "{ty:?}: {needed} > {reserved}");
        }
    }

    #[test]
    fn bindings_are_dense() {
        for layout in SetLayout::ALL {
            for (expected, &(binding, _, _)) in layout.bindings().iter().enumerate() {
                assert_eq!(binding, expected as u32, "{layout:?}");
            }
        }
    }

    #[test]
    fn camera_block_is_visible_to_both_stages() {
        let (_, ty, stages) = SetLayout::Nbody.bindings()[0];
        assert_eq!(ty, UBO);
        assert!(stages.contains(vk::ShaderStageFlags::VERTEX));
        assert!(stages.contains(vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn integrator_reads_particles_from_storage() {
        let bindings = SetLayout::Leapfrog.bindings();
        assert_eq!(bindings[0].1, STORAGE);
        assert_eq!(bindings[0].2, COMPUTE);
    }

    #[test]
    fn every_target_sampler_binding_is_wired() {
        let wired: HashSet<(SetId, u32)> =
            TARGET_BINDINGS.iter().map(|&(set, binding, _)| (set, binding)).collect();
        for id in SetId::ALL {
            // the scene set samples the particle and noise textures instead
            if id == SetId::Nbody {
                continue;
            }
            for &(binding, ty, _) in id.layout().bindings() {
                assert_eq!(wired.contains(&(id, binding)), ty == SAMPLER, "{id:?}.{binding}");
            }
        }
    }

    #[test]
    fn rewritten_sets_only_name_live_views() {
        let sets = placeholder_sets();
        let stale = placeholder_targets(vk::Extent2D { width: 1280, height: 720 }, 100);
        let live = placeholder_targets(vk::Extent2D { width: 1920, height: 1080 }, 200);

        let live_views: HashSet<u64> = TargetId::ALL
            .iter()
            .map(|&id| live.get(id).view.as_raw())
            .collect();
        let stale_views: HashSet<u64> = TargetId::ALL
            .iter()
            .map(|&id| stale.get(id).view.as_raw())
            .collect();

        for (set, binding, view) in sets.target_writes(&live) {
            assert!(live_views.contains(&view.as_raw()), "set {set:?}.{binding}");
            assert!(!stale_views.contains(&view.as_raw()));
        }
    }

    #[test]
    fn bloom_chain_reads_the_previous_pass() {
        let sets = placeholder_sets();
        let targets = placeholder_targets(vk::Extent2D { width: 800, height: 600 }, 10);
        let writes = sets.target_writes(&targets);
        let view_for = |set: SetId| {
            writes
                .iter()
                .find(|&&(handle, _, _)| handle == sets.get(set))
                .map(|&(_, _, view)| view)
        };

        assert_eq!(view_for(SetId::BlurAlpha), Some(targets.luminance.view));
        assert_eq!(view_for(SetId::BlurBeta), Some(targets.blur_a.view));
        assert_eq!(view_for(SetId::NormalTextureBlur), Some(targets.blur_b.view));
        assert_eq!(view_for(SetId::ToneMapping), Some(targets.combine.view));
    }
}
