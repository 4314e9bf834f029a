//! Halton sequence orientation sampling.
use std::sync::OnceLock;

use glam::Quat;
use rand::RngCore;

use crate::sampling::{next_down, quat_from_uniforms, rand01, OrientationSampling};

/// Low-discrepancy rotations from a 3D Halton sequence fed through Shoemake's mapping.
#[derive(Debug)]
pub struct HaltonOrientation {
    /// Bases for the 3D Halton sequence. Defaults to `(2, 3, 5)`.
    pub bases: (u32, u32, u32),
    /// Starting index into the sequence.
    pub start_index: u64,
    /// If true, apply a Cranley–Patterson rotation drawn once from the run RNG.
    pub rotate: bool,
    offsets: OnceLock<[f32; 3]>,
}

impl HaltonOrientation {
    /// Construct with default bases (2, 3, 5), start_index = 1, and rotation enabled.
    pub fn new() -> Self {
        Self::with_bases((2, 3, 5), true)
    }

    /// Construct with custom bases and rotation flag; start_index defaults to 1.
    ///
    /// Panics if any base is less than 2.
    pub fn with_bases(bases: (u32, u32, u32), rotate: bool) -> Self {
        assert!(
            bases.0 >= 2 && bases.1 >= 2 && bases.2 >= 2,
            "Halton bases must be >= 2"
        );
        Self {
            bases,
            start_index: 1,
            rotate,
            offsets: OnceLock::new(),
        }
    }

    /// Set the starting index (builder-style).
    pub fn with_start_index(mut self, start_index: u64) -> Self {
        self.start_index = start_index;
        self
    }

    fn offsets(&self, rng: &mut dyn RngCore) -> [f32; 3] {
        if !self.rotate {
            return [0.0; 3];
        }
        *self
            .offsets
            .get_or_init(|| [rand01(rng), rand01(rng), rand01(rng)])
    }
}

impl Default for HaltonOrientation {
    fn default() -> Self {
        Self::new()
    }
}

impl OrientationSampling for HaltonOrientation {
    fn sample(&self, index: u64, rng: &mut dyn RngCore) -> Quat {
        let [dx, dy, dz] = self.offsets(rng);
        let idx = self.start_index + index;
        let u1 = frac(radical_inverse(idx, self.bases.0) + dx);
        let u2 = frac(radical_inverse(idx, self.bases.1) + dy);
        let u3 = frac(radical_inverse(idx, self.bases.2) + dz);
        quat_from_uniforms(u1, u2, u3)
    }
}

#[inline]
fn frac(x: f32) -> f32 {
    x - x.floor()
}

/// Compute the radical inverse of `n` in the given `base`.
fn radical_inverse(mut n: u64, base: u32) -> f32 {
    debug_assert!(base >= 2);
    let inv_b = 1.0 / base as f32;

    if n == 0 {
        return 0.0;
    }

    let mut f = inv_b;
    let mut result = 0.0_f32;

    while n > 0 {
        let digit = (n % base as u64) as f32;
        result += digit * f;
        n /= base as u64;
        f *= inv_b;
    }

    if result >= 1.0 {
        next_down(1.0)
    } else {
        result
    }
}
