//! Sampled textures uploaded through a staging buffer.
//!
//! A [`TextureSource`] is the decoded form of a texture: per-level dimensions and one
//! tightly packed byte blob ordered layer by layer, level by level within each layer.

use crate::command::{execute_single_time_commands, CommandPool};
use crate::context::GpuContext;
use crate::error::{GpuError, Result, VkCheck};
use crate::layout::{set_image_layout, DEFAULT_STAGES};
use crate::memory::GpuImage;
use ash::vk;

/// Upper bound of sampler anisotropy.
const MAX_ANISOTROPY: f32 = 8.0;

/// Decoded texture data.
#[derive(Clone, Debug)]
pub struct TextureSource {
    pub format: vk::Format,
    /// `(width, height)` of every mip level, largest first
    pub levels: Vec<(u32, u32)>,
    pub layers: u32,
    pub bytes_per_texel: u32,
    pub data: Vec<u8>,
}

impl TextureSource {
    /// Single-level RGBA8 texture.
    pub fn rgba8(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            format: vk::Format::R8G8B8A8_UNORM,
            levels: vec![(width, height)],
            layers: 1,
            bytes_per_texel: 4,
            data,
        }
    }

    /// Number of mip levels.
    pub fn mip_levels(&self) -> u32 {
        self.levels.len() as u32
    }

    fn level_size(&self, (width, height): (u32, u32)) -> u64 {
        u64::from(width) * u64::from(height) * u64::from(self.bytes_per_texel)
    }

    /// Bytes of one layer including all its levels.
    pub fn layer_size(&self) -> u64 {
        self.levels.iter().map(|&level| self.level_size(level)).sum()
    }

    /// Check that the blob holds every level of every layer.
    pub fn validate(&self) -> Result<()> {
        if self.levels.is_empty() || self.layers == 0 {
            return Err(GpuError::InvalidState("texture has no levels or layers".into()));
        }
        let expected = self.layer_size() * u64::from(self.layers);
        if self.data.len() as u64 != expected {
            return Err(GpuError::InvalidState(format!(
                "texture data holds {} bytes, levels need {expected}",
                self.data.len()
            )));
        }
        Ok(())
    }

    /// One buffer-to-image copy per (layer, level).
    pub fn copy_regions(&self) -> Vec<vk::BufferImageCopy> {
        let mut regions = Vec::with_capacity(self.levels.len() * self.layers as usize);
        let mut offset = 0u64;
        for layer in 0..self.layers {
            for (level, &(width, height)) in self.levels.iter().enumerate() {
                regions.push(
                    vk::BufferImageCopy::default()
                        .buffer_offset(offset)
                        .image_subresource(
                            vk::ImageSubresourceLayers::default()
                                .aspect_mask(vk::ImageAspectFlags::COLOR)
                                .mip_level(level as u32)
                                .base_array_layer(layer)
                                .layer_count(1),
                        )
                        .image_extent(vk::Extent3D {
                            width,
                            height,
                            depth: 1,
                        }),
                );
                offset += self.level_size((width, height));
            }
        }
        regions
    }
}

/// How the layers of a texture are viewed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureKind {
    Flat,
    Cube,
    Array,
}

impl TextureKind {
    /// Image view type for this kind.
    pub fn view_type(self) -> vk::ImageViewType {
        match self {
            Self::Flat => vk::ImageViewType::TYPE_2D,
            Self::Cube => vk::ImageViewType::CUBE,
            Self::Array => vk::ImageViewType::TYPE_2D_ARRAY,
        }
    }

    /// Image creation flags for this kind.
    pub fn create_flags(self) -> vk::ImageCreateFlags {
        match self {
            Self::Cube => vk::ImageCreateFlags::CUBE_COMPATIBLE,
            _ => vk::ImageCreateFlags::empty(),
        }
    }

    fn check_layers(self, layers: u32) -> Result<()> {
        match (self, layers) {
            (Self::Flat, 1) | (Self::Cube, 6) => Ok(()),
            (Self::Array, n) if n > 0 => Ok(()),
            _ => Err(GpuError::InvalidState(format!(
                "{self:?} texture cannot have {layers} layers"
            ))),
        }
    }
}

/// An uploaded, sampled texture.
pub struct Texture {
    pub image: GpuImage,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

impl Texture {
    /// Upload `source` and create its view and sampler.
    ///
    /// The image ends in `SHADER_READ_ONLY_OPTIMAL`.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn upload(
        gpu: &GpuContext,
        pool: &CommandPool,
        queue: vk::Queue,
        source: &TextureSource,
        kind: TextureKind,
        address_mode: vk::SamplerAddressMode,
        name: &str,
    ) -> Result<Self> {
        source.validate()?;
        kind.check_layers(source.layers)?;

        let device = gpu.device();
        let (width, height) = source.levels[0];

        let mut staging = gpu.allocator().lock().create_buffer(
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            source.data.len() as u64,
            Some(source.data.as_slice()),
            "texture staging",
        )?;

        let image_info = vk::ImageCreateInfo::default()
            .flags(kind.create_flags())
            .image_type(vk::ImageType::TYPE_2D)
            .format(source.format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(source.mip_levels())
            .array_layers(source.layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let mut image = gpu.allocator().lock().create_image(
            &image_info,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            name,
        )?;

        let range = image.full_range(vk::ImageAspectFlags::COLOR);
        let regions = source.copy_regions();
        let uploaded = execute_single_time_commands(device, pool, queue, |cmd| {
            set_image_layout(
                device,
                cmd,
                &mut image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                range,
                DEFAULT_STAGES,
            )?;
            device.cmd_copy_buffer_to_image(
                cmd,
                staging.buffer,
                image.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &regions,
            );
            set_image_layout(
                device,
                cmd,
                &mut image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                range,
                DEFAULT_STAGES,
            )
        });

        gpu.allocator().lock().free_buffer(&mut staging)?;
        if let Err(err) = uploaded {
            gpu.allocator().lock().free_image(&mut image)?;
            return Err(err);
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(kind.view_type())
            .format(source.format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::R,
                g: vk::ComponentSwizzle::G,
                b: vk::ComponentSwizzle::B,
                a: vk::ComponentSwizzle::A,
            })
            .subresource_range(range);
        let view = device
            .create_image_view(&view_info, None)
            .checked("vkCreateImageView")?;

        let anisotropy = gpu.capabilities().supports_sampler_anisotropy;
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .mip_lod_bias(0.0)
            .compare_op(vk::CompareOp::NEVER)
            .min_lod(0.0)
            .max_lod(source.mip_levels() as f32)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(if anisotropy { MAX_ANISOTROPY } else { 1.0 })
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK);
        let sampler = device
            .create_sampler(&sampler_info, None)
            .checked("vkCreateSampler")?;

        tracing::debug!(name, width, height, levels = source.mip_levels(), "Uploaded texture");

        Ok(Self {
            image,
            view,
            sampler,
        })
    }

    /// Destroy the sampler, view and image.
    ///
    /// # Safety
    /// The texture must not be in use.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        gpu.device().destroy_sampler(self.sampler, None);
        gpu.device().destroy_image_view(self.view, None);
        gpu.allocator().lock().free_image(&mut self.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mip_chain(layers: u32) -> TextureSource {
        let levels = vec![(4, 4), (2, 2), (1, 1)];
        let bytes = (16 + 4 + 1) * 4 * layers as usize;
        TextureSource {
            format: vk::Format::R8G8B8A8_UNORM,
            levels,
            layers,
            bytes_per_texel: 4,
            data: vec![0; bytes],
        }
    }

    #[test]
    fn one_region_per_layer_and_level() {
        let source = mip_chain(6);
        let regions = source.copy_regions();
        assert_eq!(regions.len(), 18);

        // second layer starts after all levels of the first
        let layer_one = &regions[3];
        assert_eq!(layer_one.image_subresource.base_array_layer, 1);
        assert_eq!(layer_one.image_subresource.mip_level, 0);
        assert_eq!(layer_one.buffer_offset, source.layer_size());

        let smallest = &regions[2];
        assert_eq!(smallest.buffer_offset, (16 + 4) * 4);
        assert_eq!(smallest.image_extent.width, 1);
    }

    #[test]
    fn validate_checks_blob_size() {
        assert!(mip_chain(1).validate().is_ok());

        let mut short = mip_chain(2);
        short.data.pop();
        assert!(short.validate().is_err());
    }

    #[test]
    fn kinds_map_to_view_types() {
        assert_eq!(TextureKind::Flat.view_type(), vk::ImageViewType::TYPE_2D);
        assert_eq!(TextureKind::Cube.view_type(), vk::ImageViewType::CUBE);
        assert_eq!(TextureKind::Array.view_type(), vk::ImageViewType::TYPE_2D_ARRAY);
        assert_eq!(
            TextureKind::Cube.create_flags(),
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        );
    }

    #[test]
    fn cube_needs_six_layers() {
        assert!(TextureKind::Cube.check_layers(6).is_ok());
        assert!(TextureKind::Cube.check_layers(1).is_err());
        assert!(TextureKind::Flat.check_layers(2).is_err());
        assert!(TextureKind::Array.check_layers(4).is_ok());
    }
}
