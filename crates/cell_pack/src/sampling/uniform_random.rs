//! Uniform random orientation sampling.
use glam::Quat;
use rand::RngCore;

use crate::sampling::{quat_from_uniforms, rand01, OrientationSampling};

/// Uniform i.i.d. rotations over SO(3).
#[derive(Debug, Clone, Default)]
pub struct UniformRandomOrientation;

impl UniformRandomOrientation {
    pub fn new() -> Self {
        Self
    }
}

impl OrientationSampling for UniformRandomOrientation {
    fn sample(&self, _index: u64, rng: &mut dyn RngCore) -> Quat {
        let u1 = rand01(rng);
        let u2 = rand01(rng);
        let u3 = rand01(rng);
        quat_from_uniforms(u1, u2, u3)
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let s = UniformRandomOrientation::new();
        let mut a = StdRng::seed_from_u64(11);
        let mut b = StdRng::seed_from_u64(11);
        for i in 0..16 {
            assert_eq!(s.sample(i, &mut a), s.sample(i, &mut b));
        }
    }

    #[test]
    fn rotated_axis_has_no_preferred_direction() {
        let s = UniformRandomOrientation::new();
        let mut rng = StdRng::seed_from_u64(5);
        let n = 4000;
        let mean: Vec3 = (0..n)
            .map(|i| s.sample(i, &mut rng) * Vec3::Z)
            .fold(Vec3::ZERO, |acc, v| acc + v)
            / n as f32;
        assert!(mean.length() < 0.06, "mean direction {mean:?}");
    }
}
