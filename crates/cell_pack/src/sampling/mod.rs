//! Random and quasi-random samplers used by the placement kernel.
//!
//! This module defines the [`OrientationSampling`] trait behind which candidate
//! rotations are drawn, plus the jitter sampler that perturbs a grid point inside
//! its half-spacing ball. All samplers consume only the RNG they are handed, so a
//! packing run stays reproducible under a fixed seed.
use glam::{Quat, Vec3};
use rand::RngCore;

pub mod halton;
pub mod uniform_random;

pub use halton::HaltonOrientation;
pub use uniform_random::UniformRandomOrientation;

/// Trait for orientation sampling.
///
/// `index` counts how many rotations the caller has drawn so far from this
/// sampler; sequence-based samplers use it, purely random ones ignore it.
pub trait OrientationSampling: Send + Sync + std::fmt::Debug {
    fn sample(&self, index: u64, rng: &mut dyn RngCore) -> Quat;
}

/// Generate a random float in the range [0, 1).
#[inline]
pub(crate) fn rand01(rng: &mut dyn RngCore) -> f32 {
    (rng.next_u32() as f32) / ((u32::MAX as f32) + 1.0)
}

/// Compute the next smaller representable float value.
#[inline]
pub(crate) fn next_down(val: f32) -> f32 {
    if val.is_nan() || val == f32::NEG_INFINITY {
        return val;
    }
    if val == f32::INFINITY {
        return f32::MAX;
    }
    if val == 0.0 {
        return -f32::MIN_POSITIVE;
    }
    let bits = val.to_bits();
    if val > 0.0 {
        f32::from_bits(bits - 1)
    } else {
        f32::from_bits(bits + 1)
    }
}

/// Uniform point in the unit ball by rejection from the enclosing cube.
pub(crate) fn unit_ball(rng: &mut dyn RngCore) -> Vec3 {
    loop {
        let v = Vec3::new(
            rand01(rng) * 2.0 - 1.0,
            rand01(rng) * 2.0 - 1.0,
            rand01(rng) * 2.0 - 1.0,
        );
        if v.length_squared() <= 1.0 {
            return v;
        }
    }
}

/// Jitter offset `δ = u ⊙ jitter_max · (spacing / 2)` with `u` uniform in the unit ball.
///
/// A zero `jitter_max` short-circuits without touching the RNG.
pub fn sample_jitter(rng: &mut dyn RngCore, jitter_max: Vec3, spacing: f32) -> Vec3 {
    if jitter_max == Vec3::ZERO {
        return Vec3::ZERO;
    }
    unit_ball(rng) * jitter_max * (spacing * 0.5)
}

/// Map three uniforms in [0, 1) to a uniformly distributed unit quaternion (Shoemake).
pub(crate) fn quat_from_uniforms(u1: f32, u2: f32, u3: f32) -> Quat {
    use std::f32::consts::TAU;
    let a = (1.0 - u1).sqrt();
    let b = u1.sqrt();
    let (s2, c2) = (TAU * u2).sin_cos();
    let (s3, c3) = (TAU * u3).sin_cos();
    Quat::from_xyzw(a * s2, a * c2, b * s3, b * c3).normalize()
}
