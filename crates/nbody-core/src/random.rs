//! Seedable pseudo-random source for the initial-condition generators.
//!
//! A xorshift64* generator: small, deterministic for a given seed and fast enough to fill
//! millions of particles. Not suitable for anything security related.

use glam::Vec3;

const DEFAULT_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// xorshift64* generator with a cached Box-Muller spare.
#[derive(Clone, Debug)]
pub struct Xorshift64Star {
    state: u64,
    spare: Option<f64>,
}

impl Default for Xorshift64Star {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl Xorshift64Star {
    /// Create a generator. A zero seed is replaced by the default, since zero is a fixed
    /// point of the xorshift step.
    pub const fn new(seed: u64) -> Self {
        let state = if seed == 0 { DEFAULT_SEED } else { seed };
        Self { state, spare: None }
    }

    /// Seed from the wall clock.
    pub fn from_time() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(DEFAULT_SEED, |d| d.as_nanos() as u64);
        Self::new(nanos ^ DEFAULT_SEED)
    }

    /// Next raw 64-bit value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform sample in `[0, 1)`.
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        // top 53 bits give every representable value in [0, 1) the same weight
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Standard normal sample.
    pub fn standard_normal(&mut self) -> f64 {
        if let Some(spare) = self.spare.take() {
            return spare;
        }
        // 1 - u keeps the logarithm argument in (0, 1]
        let u1 = 1.0 - self.next_f64();
        let u2 = self.next_f64();
        let radius = (-2.0 * u1.ln()).sqrt();
        let angle = std::f64::consts::TAU * u2;
        self.spare = Some(radius * angle.sin());
        radius * angle.cos()
    }

    /// Normal sample with the given mean and standard deviation.
    #[inline]
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f32 {
        (mean + std_dev * self.standard_normal()) as f32
    }

    /// Vector of three independent normal samples.
    #[inline]
    pub fn normal_vec3(&mut self, mean: f64, std_dev: f64) -> Vec3 {
        Vec3::new(
            self.normal(mean, std_dev),
            self.normal(mean, std_dev),
            self.normal(mean, std_dev),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Xorshift64Star::new(42);
        let mut b = Xorshift64Star::new(42);
        for _ in 0..16 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn zero_seed_is_replaced() {
        let mut rng = Xorshift64Star::new(0);
        assert_ne!(rng.next_u64(), 0);
    }

    #[test]
    fn uniform_stays_in_unit_interval() {
        let mut rng = Xorshift64Star::new(7);
        for _ in 0..10_000 {
            let x = rng.next_f64();
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn normal_moments() {
        let mut rng = Xorshift64Star::new(1234);
        let n = 50_000;
        let samples: Vec<f64> = (0..n).map(|_| f64::from(rng.normal(2.0, 0.5))).collect();
        let mean = samples.iter().sum::<f64>() / f64::from(n);
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / f64::from(n);
        assert!((mean - 2.0).abs() < 0.02, "mean {mean}");
        assert!((var.sqrt() - 0.5).abs() < 0.02, "std {}", var.sqrt());
    }
}
