//! Particle records as laid out in the compute and draw buffers.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::constants::WORK_GROUP_SIZE;

/// One body of the simulation.
///
/// `xyzm` holds the position in `xyz` and the mass in `w`; `v` holds the velocity in `xyz`.
/// The draw buffer binds this struct as per-instance vertex input.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Particle {
    pub xyzm: [f32; 4],
    pub v: [f32; 4],
}

impl Particle {
    /// Size of one record in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a particle from position, velocity and mass.
    #[inline]
    pub fn new(position: Vec3, velocity: Vec3, mass: f32) -> Self {
        Self {
            xyzm: [position.x, position.y, position.z, mass],
            v: [velocity.x, velocity.y, velocity.z, 0.0],
        }
    }

    /// Position of the particle.
    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::new(self.xyzm[0], self.xyzm[1], self.xyzm[2])
    }

    /// Velocity of the particle.
    #[inline]
    pub fn velocity(&self) -> Vec3 {
        Vec3::new(self.v[0], self.v[1], self.v[2])
    }

    /// Mass of the particle.
    #[inline]
    pub fn mass(&self) -> f32 {
        self.xyzm[3]
    }
}

/// Byte size of a buffer holding `count` particles.
#[inline]
pub const fn buffer_size(count: u32) -> u64 {
    count as u64 * Particle::SIZE as u64
}

/// Number of work groups needed to cover `count` particles.
#[inline]
pub const fn dispatch_group_count(count: u32) -> u32 {
    count.div_ceil(WORK_GROUP_SIZE[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn particle_layout() {
        assert_eq!(Particle::SIZE, 32);
        assert_eq!(std::mem::offset_of!(Particle, xyzm), 0);
        assert_eq!(std::mem::offset_of!(Particle, v), 16);
    }

    #[test]
    fn buffer_size_is_count_times_record() {
        assert_eq!(buffer_size(20_000), 640_000);
        assert_eq!(buffer_size(0), 0);
    }

    #[test]
    fn dispatch_rounds_up() {
        assert_eq!(dispatch_group_count(1), 1);
        assert_eq!(dispatch_group_count(128), 1);
        assert_eq!(dispatch_group_count(129), 2);
        assert_eq!(dispatch_group_count(20_000), 157);
    }

    #[test]
    fn accessors() {
        let p = Particle::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(-1.0, 0.5, 0.0), 4.0);
        assert_eq!(p.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(p.velocity(), Vec3::new(-1.0, 0.5, 0.0));
        assert_eq!(p.mass(), 4.0);
        assert_eq!(p.v[3], 0.0);
    }
}
