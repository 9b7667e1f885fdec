//! Initial-condition generators.
//!
//! Each generator fills a particle array that is uploaded verbatim into the compute and
//! draw buffers on launch.

use glam::Vec3;

use crate::error::{Error, Result};
use crate::particle::Particle;
use crate::random::Xorshift64Star;

/// Axis of the initial rotation of the two-cluster setups.
const TWIN_AXIS: Vec3 = Vec3::new(0.0, 0.0, -0.4);
/// Cluster centres of the two-cluster setups.
const TWIN_CENTRES: [Vec3; 2] = [Vec3::new(1.5, 0.1, 0.0), Vec3::new(-1.5, -0.1, 0.0)];
/// Central masses of the orbiting pair.
const ORBIT_CENTRAL_MASSES: [f32; 2] = [9500.0, 10_000.0];
const BLOB_COUNT: usize = 20;

/// Available particle layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InitialCondition {
    /// Two rigidly rotating clusters with small random velocities.
    TwinClusters,
    /// Two clusters orbiting heavy central bodies.
    OrbitingPair,
    /// One cluster orbiting a heavy central body.
    SingleDisk,
    /// Cubic lattice at rest.
    Lattice,
    /// Cubic lattice with a sinusoidal shear velocity.
    ShearedLattice,
    /// Twenty gaussian blobs at rest.
    Blobs,
}

impl InitialCondition {
    /// All conditions in selector order.
    pub const ALL: [Self; 6] = [
        Self::TwinClusters,
        Self::OrbitingPair,
        Self::SingleDisk,
        Self::Lattice,
        Self::ShearedLattice,
        Self::Blobs,
    ];

    /// Numeric selector used by the shell.
    pub const fn index(self) -> u32 {
        match self {
            Self::TwinClusters => 0,
            Self::OrbitingPair => 1,
            Self::SingleDisk => 2,
            Self::Lattice => 3,
            Self::ShearedLattice => 4,
            Self::Blobs => 5,
        }
    }

    /// Short human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::TwinClusters => "twin clusters",
            Self::OrbitingPair => "orbiting pair",
            Self::SingleDisk => "single disk",
            Self::Lattice => "lattice",
            Self::ShearedLattice => "sheared lattice",
            Self::Blobs => "blobs",
        }
    }

    /// Generate `count` particles.
    ///
    /// `gravity_constant` sets the orbital speed of the orbiting setups.
    pub fn generate(
        self,
        count: u32,
        gravity_constant: f32,
        rng: &mut Xorshift64Star,
    ) -> Vec<Particle> {
        let mut particles = vec![Particle::default(); count as usize];
        match self {
            Self::TwinClusters => twin_clusters(&mut particles, rng),
            Self::OrbitingPair => orbiting_pair(&mut particles, gravity_constant, rng),
            Self::SingleDisk => single_disk(&mut particles, gravity_constant, rng),
            Self::Lattice => lattice(&mut particles, false, rng),
            Self::ShearedLattice => lattice(&mut particles, true, rng),
            Self::Blobs => blobs(&mut particles, rng),
        }
        particles
    }
}

impl TryFrom<u32> for InitialCondition {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(Error::UnknownInitialCondition(value))
    }
}

impl std::fmt::Display for InitialCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.index())
    }
}

/// Offset from a cluster centre, flattened along z.
fn flat_offset(rng: &mut Xorshift64Star, std_dev: f64) -> Vec3 {
    Vec3::new(
        rng.normal(0.0, std_dev),
        rng.normal(0.0, std_dev),
        rng.normal(0.0, std_dev) * 0.1,
    )
}

/// Circular orbital velocity around a central mass at distance `r`.
fn orbital_velocity(r: Vec3, axis: Vec3, gravity_constant: f32, central_mass: f32) -> Vec3 {
    let distance = r.length();
    if distance <= f32::EPSILON {
        return Vec3::ZERO;
    }
    let speed = (gravity_constant * central_mass / distance).sqrt();
    r.cross(axis).normalize_or_zero() * speed
}

fn twin_clusters(particles: &mut [Particle], rng: &mut Xorshift64Star) {
    let half = particles.len() / 2;
    for (i, particle) in particles.iter_mut().enumerate() {
        let centre = TWIN_CENTRES[usize::from(i >= half)];
        let mass = rng.normal(0.5, 0.1).abs();
        let r = flat_offset(rng, 0.8);
        let jitter = rng.normal_vec3(0.0, 0.5) * 0.02;
        let velocity = r.cross(TWIN_AXIS) + jitter;
        *particle = Particle::new(centre + r, velocity, mass);
    }
}

fn orbiting_pair(particles: &mut [Particle], gravity_constant: f32, rng: &mut Xorshift64Star) {
    let half = particles.len() / 2;
    for (i, particle) in particles.iter_mut().enumerate() {
        let cluster = usize::from(i >= half);
        let centre = TWIN_CENTRES[cluster];
        let central_mass = ORBIT_CENTRAL_MASSES[cluster];
        let mass = rng.normal(0.5, 0.3).abs();
        let r = flat_offset(rng, 0.7);
        *particle = if i == cluster * half {
            Particle::new(centre, Vec3::ZERO, central_mass)
        } else {
            let velocity = orbital_velocity(r, TWIN_AXIS, gravity_constant, central_mass);
            Particle::new(centre + r, velocity, mass)
        };
    }
}

fn single_disk(particles: &mut [Particle], gravity_constant: f32, rng: &mut Xorshift64Star) {
    const CENTRAL_MASS: f32 = 10_000.0;
    let axis = Vec3::new(0.0, 0.0, 0.4);
    for (i, particle) in particles.iter_mut().enumerate() {
        let mass = rng.normal(0.5, 0.1).abs();
        let r = rng.normal_vec3(0.0, 0.5);
        *particle = if i == 0 {
            Particle::new(Vec3::ZERO, Vec3::ZERO, CENTRAL_MASS)
        } else {
            Particle::new(r, orbital_velocity(r, axis, gravity_constant, CENTRAL_MASS), mass)
        };
    }
}

/// Edge length of the smallest cube holding `count` points.
pub fn lattice_side(count: usize) -> usize {
    let side = (count as f64).cbrt().ceil() as usize;
    // cbrt of a perfect cube can land just above the integer
    let side = if side > 1 && (side - 1).pow(3) >= count {
        side - 1
    } else {
        side
    };
    side.max(1)
}

/// Map lattice index `i` of `side` to `[-1, 1]`.
fn lattice_coordinate(i: usize, side: usize) -> f32 {
    if side <= 1 {
        return 0.0;
    }
    let span = (side - 1) as f64;
    ((i as f64 - span * 0.5) / span * 2.0) as f32
}

fn lattice(particles: &mut [Particle], sheared: bool, rng: &mut Xorshift64Star) {
    let side = lattice_side(particles.len());
    for (index, particle) in particles.iter_mut().enumerate() {
        let i = index / (side * side);
        let j = (index / side) % side;
        let k = index % side;
        let base = Vec3::new(
            lattice_coordinate(i, side),
            lattice_coordinate(j, side),
            lattice_coordinate(k, side),
        );
        let mass = rng.normal(0.5, 0.1).abs();
        let position = base + rng.normal_vec3(0.0, 0.001);
        let velocity = if sheared && side > 1 {
            Vec3::new(5.0 * (j as f32 / (side - 1) as f32 * 100.0).sin(), 0.0, 0.0)
        } else {
            Vec3::ZERO
        };
        *particle = Particle::new(position, velocity, mass);
    }
}

fn blobs(particles: &mut [Particle], rng: &mut Xorshift64Star) {
    let per_blob = (particles.len() / BLOB_COUNT).max(1);
    let mut centre = Vec3::ZERO;
    for (index, particle) in particles.iter_mut().enumerate() {
        // the remainder of an uneven split joins the last blob
        if index % per_blob == 0 && index / per_blob < BLOB_COUNT {
            centre = rng.normal_vec3(0.0, 1.0);
        }
        let position = centre + rng.normal_vec3(0.0, 1.0) * 0.2;
        let mass = rng.normal(0.5, 0.1).abs();
        *particle = Particle::new(position, Vec3::ZERO, mass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn generate(condition: InitialCondition, count: u32) -> Vec<Particle> {
        condition.generate(count, 0.001, &mut Xorshift64Star::new(99))
    }

    #[test]
    fn selector_round_trip() {
        for condition in InitialCondition::ALL {
            assert_eq!(InitialCondition::try_from(condition.index()).ok(), Some(condition));
        }
        assert!(InitialCondition::try_from(6).is_err());
    }

    #[test]
    fn every_condition_fills_the_requested_count() {
        for condition in InitialCondition::ALL {
            let particles = generate(condition, 1000);
            assert_eq!(particles.len(), 1000);
            assert!(particles.iter().all(|p| p.mass() > 0.0), "{condition}");
            assert!(
                particles
                    .iter()
                    .all(|p| p.position().is_finite() && p.velocity().is_finite()),
                "{condition}"
            );
        }
    }

    #[test]
    fn orbiting_pair_has_central_masses() {
        let particles = generate(InitialCondition::OrbitingPair, 20_000);
        let first = particles[0];
        let second = particles[10_000];
        assert_eq!(first.mass(), 9500.0);
        assert_eq!(first.position(), TWIN_CENTRES[0]);
        assert_eq!(first.velocity(), Vec3::ZERO);
        assert_eq!(second.mass(), 10_000.0);
        assert_eq!(second.position(), TWIN_CENTRES[1]);
    }

    #[test]
    fn orbiting_pair_speed_is_circular() {
        let particles = generate(InitialCondition::OrbitingPair, 100);
        let p = particles[1];
        let r = p.position() - TWIN_CENTRES[0];
        let expected = (0.001 * 9500.0 / r.length()).sqrt();
        assert_relative_eq!(p.velocity().length(), expected, max_relative = 1e-4);
        // velocity is perpendicular to the radius
        assert!(p.velocity().dot(r).abs() < 1e-3);
    }

    #[test]
    fn lattice_side_is_smallest_cube() {
        assert_eq!(lattice_side(0), 1);
        assert_eq!(lattice_side(1), 1);
        assert_eq!(lattice_side(8), 2);
        assert_eq!(lattice_side(9), 3);
        assert_eq!(lattice_side(27), 3);
        assert_eq!(lattice_side(1000), 10);
    }

    #[test]
    fn lattice_spans_unit_cube() {
        let particles = generate(InitialCondition::Lattice, 27);
        assert_relative_eq!(particles[0].position().x, -1.0, epsilon = 0.01);
        assert_relative_eq!(particles[26].position().z, 1.0, epsilon = 0.01);
        assert!(particles.iter().all(|p| p.velocity() == Vec3::ZERO));
    }

    #[test]
    fn single_particle_lattice_sits_at_origin() {
        let particles = generate(InitialCondition::ShearedLattice, 1);
        assert!(particles[0].position().length() < 0.01);
        assert_eq!(particles[0].velocity(), Vec3::ZERO);
    }

    #[test]
    fn sheared_lattice_moves_along_x() {
        let particles = generate(InitialCondition::ShearedLattice, 64);
        assert!(particles.iter().any(|p| p.velocity().x != 0.0));
        assert!(particles.iter().all(|p| p.velocity().y == 0.0 && p.velocity().z == 0.0));
    }

    #[test]
    fn blobs_handle_small_counts() {
        let particles = generate(InitialCondition::Blobs, 7);
        assert_eq!(particles.len(), 7);
        assert!(particles.iter().all(|p| p.mass() > 0.0));
    }

    #[test]
    fn empty_generation() {
        assert!(generate(InitialCondition::OrbitingPair, 0).is_empty());
    }
}
