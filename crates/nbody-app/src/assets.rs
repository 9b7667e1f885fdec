//! Texture assets, loaded from disk or generated when missing.

use std::f64::consts::TAU;
use std::path::{Path, PathBuf};

use anyhow::Context;
use nbody_gpu::TextureSource;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use tracing::{debug, warn};

/// Sprite drawn for every particle.
pub const PARTICLE_TEXTURE: &str = "particle.png";
/// Noise modulating the sprites.
pub const NOISE_TEXTURE: &str = "noise.png";

const SPRITE_SIZE: u32 = 64;
const NOISE_SIZE: u32 = 256;
const NOISE_SEED: u32 = 0x6e62;

/// `<assets>/textures/<name>`
pub fn texture_path(assets: &Path, name: &str) -> PathBuf {
    assets.join("textures").join(name)
}

/// Decode an image file into a single-level RGBA8 source.
pub fn load_rgba(path: &Path) -> anyhow::Result<TextureSource> {
    let image = image::open(path)
        .with_context(|| format!("failed to load texture {}", path.display()))?
        .into_rgba8();
    let (width, height) = image.dimensions();
    debug!(path = %path.display(), width, height, "Loaded texture");
    Ok(TextureSource::rgba8(width, height, image.into_raw()))
}

fn load_or_generate(
    assets: &Path,
    name: &str,
    generate: impl FnOnce() -> TextureSource,
) -> TextureSource {
    let path = texture_path(assets, name);
    match load_rgba(&path) {
        Ok(source) => source,
        Err(e) => {
            warn!("{e:#}; generating {name} instead");
            generate()
        }
    }
}

/// The particle sprite, or a gaussian disc if the file is unavailable.
pub fn particle_texture(assets: &Path) -> TextureSource {
    load_or_generate(assets, PARTICLE_TEXTURE, || gaussian_sprite(SPRITE_SIZE))
}

/// The noise texture, or tileable fractal noise if the file is unavailable.
pub fn noise_texture(assets: &Path) -> TextureSource {
    load_or_generate(assets, NOISE_TEXTURE, || tileable_noise(NOISE_SIZE, NOISE_SEED))
}

/// White disc whose alpha falls off as a gaussian towards the border.
pub fn gaussian_sprite(size: u32) -> TextureSource {
    let center = (size as f32 - 1.0) * 0.5;
    let sigma = size as f32 / 6.0;
    let mut data = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 - center;
            let dy = y as f32 - center;
            let falloff = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
            let value = (falloff * 255.0).round() as u8;
            data.extend_from_slice(&[value, value, value, value]);
        }
    }
    TextureSource::rgba8(size, size, data)
}

/// Sample `noise` at `(u, v)` in `[0, 1]²` so that both axes wrap.
///
/// Each axis is mapped onto a circle, which places the square on a torus in 4D.
fn torus_sample(noise: &impl NoiseFn<f64, 4>, u: f64, v: f64) -> f64 {
    let (su, cu) = (u * TAU).sin_cos();
    let (sv, cv) = (v * TAU).sin_cos();
    noise.get([cu, su, cv, sv])
}

/// Greyscale fractal noise that tiles seamlessly in both directions.
pub fn tileable_noise(size: u32, seed: u32) -> TextureSource {
    let noise = Fbm::<Perlin>::new(seed).set_octaves(5).set_frequency(1.5);
    let mut data = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let u = f64::from(x) / f64::from(size);
            let v = f64::from(y) / f64::from(size);
            let value = torus_sample(&noise, u, v).mul_add(0.5, 0.5).clamp(0.0, 1.0);
            let byte = (value * 255.0).round() as u8;
            data.extend_from_slice(&[byte, byte, byte, 255]);
        }
    }
    TextureSource::rgba8(size, size, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn texel(source: &TextureSource, x: u32, y: u32) -> [u8; 4] {
        let (width, _) = source.levels[0];
        let i = ((y * width + x) * 4) as usize;
        [
            source.data[i],
            source.data[i + 1],
            source.data[i + 2],
            source.data[i + 3],
        ]
    }

    #[test]
    fn sprite_peaks_in_the_middle() {
        let sprite = gaussian_sprite(SPRITE_SIZE);
        assert_eq!(sprite.levels, vec![(SPRITE_SIZE, SPRITE_SIZE)]);
        assert_eq!(sprite.data.len(), (SPRITE_SIZE * SPRITE_SIZE * 4) as usize);

        let middle = texel(&sprite, SPRITE_SIZE / 2, SPRITE_SIZE / 2)[3];
        let corner = texel(&sprite, 0, 0)[3];
        assert!(middle > 240);
        assert!(corner < 5);
    }

    #[test]
    fn noise_wraps_at_the_edges() {
        let noise = Fbm::<Perlin>::new(NOISE_SEED);
        for v in [0.0, 0.3, 0.75] {
            assert_relative_eq!(
                torus_sample(&noise, 0.0, v),
                torus_sample(&noise, 1.0, v),
                epsilon = 1e-9
            );
            assert_relative_eq!(
                torus_sample(&noise, v, 0.0),
                torus_sample(&noise, v, 1.0),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn noise_texture_is_opaque_and_varied() {
        let source = tileable_noise(32, NOISE_SEED);
        assert!(source.data.chunks(4).all(|texel| texel[3] == 255));
        let first = source.data[0];
        assert!(source.data.chunks(4).any(|texel| texel[0] != first));
    }

    #[test]
    fn missing_file_falls_back() {
        let assets = Path::new("/nonexistent/assets");
        assert!(load_rgba(&texture_path(assets, PARTICLE_TEXTURE)).is_err());
        let sprite = particle_texture(assets);
        assert_eq!(sprite.levels, vec![(SPRITE_SIZE, SPRITE_SIZE)]);
    }
}
