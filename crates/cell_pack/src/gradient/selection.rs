//! Weighted choice of a grid point among the allowed candidates.
//!
//! Every helper takes the candidate indices in scheduler order and the full
//! per-grid-point weight field. Random variants draw exactly one uniform from
//! the RNG; extremum variants draw nothing. All return `None` when no
//! candidate carries positive weight, leaving the fallback to the caller.
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::sampling::rand01;

/// How a weight field turns into a grid-point choice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSelection {
    MaxWeight,
    MinWeight,
    /// Inverse transform over the cumulative weights, scanned in order.
    #[default]
    RandomWeighted,
    /// Same distribution, binary search on the cumulative weights.
    LinearWeighted,
    /// Subtract weights from a uniform draw until it goes negative.
    SubWeighted,
}

/// Dispatches on `mode`.
pub fn select_point(
    mode: WeightSelection,
    allowed: &[u32],
    weights: &[f32],
    rng: &mut dyn RngCore,
) -> Option<u32> {
    match mode {
        WeightSelection::MaxWeight => pick_max_weight(allowed, weights),
        WeightSelection::MinWeight => pick_min_weight(allowed, weights),
        WeightSelection::RandomWeighted => pick_random_weighted(allowed, weights, rng),
        WeightSelection::LinearWeighted => pick_linear_weighted(allowed, weights, rng),
        WeightSelection::SubWeighted => pick_sub_weighted(allowed, weights, rng),
    }
}

/// Highest weight; ties go to the lowest grid index.
pub fn pick_max_weight(allowed: &[u32], weights: &[f32]) -> Option<u32> {
    allowed
        .iter()
        .copied()
        .max_by(|&a, &b| {
            weights[a as usize]
                .total_cmp(&weights[b as usize])
                .then(b.cmp(&a))
        })
}

/// Lowest weight; ties go to the lowest grid index.
pub fn pick_min_weight(allowed: &[u32], weights: &[f32]) -> Option<u32> {
    allowed
        .iter()
        .copied()
        .min_by(|&a, &b| {
            weights[a as usize]
                .total_cmp(&weights[b as usize])
                .then(a.cmp(&b))
        })
}

fn total_weight(allowed: &[u32], weights: &[f32]) -> f32 {
    allowed.iter().map(|&p| weights[p as usize].max(0.0)).sum()
}

pub fn pick_random_weighted(
    allowed: &[u32],
    weights: &[f32],
    rng: &mut dyn RngCore,
) -> Option<u32> {
    let total = total_weight(allowed, weights);
    if total <= 0.0 {
        return None;
    }
    let target = rand01(rng) * total;
    let mut cumulative = 0.0;
    for &p in allowed {
        let w = weights[p as usize].max(0.0);
        cumulative += w;
        if w > 0.0 && target < cumulative {
            return Some(p);
        }
    }
    last_positive(allowed, weights)
}

pub fn pick_linear_weighted(
    allowed: &[u32],
    weights: &[f32],
    rng: &mut dyn RngCore,
) -> Option<u32> {
    let mut cumulative = Vec::with_capacity(allowed.len());
    let mut running = 0.0f32;
    for &p in allowed {
        running += weights[p as usize].max(0.0);
        cumulative.push(running);
    }
    if running <= 0.0 {
        return None;
    }
    let target = rand01(rng) * running;
    let slot = cumulative.partition_point(|&c| c <= target);
    match allowed.get(slot) {
        Some(&p) => Some(p),
        None => last_positive(allowed, weights),
    }
}

pub fn pick_sub_weighted(allowed: &[u32], weights: &[f32], rng: &mut dyn RngCore) -> Option<u32> {
    let total = total_weight(allowed, weights);
    if total <= 0.0 {
        return None;
    }
    let mut remaining = rand01(rng) * total;
    for &p in allowed {
        let w = weights[p as usize].max(0.0);
        remaining -= w;
        if w > 0.0 && remaining < 0.0 {
            return Some(p);
        }
    }
    last_positive(allowed, weights)
}

/// Rounding fallback: the last candidate with positive weight.
fn last_positive(allowed: &[u32], weights: &[f32]) -> Option<u32> {
    allowed
        .iter()
        .rev()
        .copied()
        .find(|&p| weights[p as usize] > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRng {
        value: u32,
    }

    impl RngCore for FixedRng {
        fn next_u32(&mut self) -> u32 {
            self.value
        }

        fn next_u64(&mut self) -> u64 {
            self.value as u64
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            let bytes = self.value.to_le_bytes();
            for (i, b) in dest.iter_mut().enumerate() {
                *b = bytes[i % 4];
            }
        }
    }

    fn at(fraction: f32) -> FixedRng {
        FixedRng {
            value: (fraction * u32::MAX as f32) as u32,
        }
    }

    const WEIGHTS: [f32; 4] = [0.0, 0.7, 0.3, 0.7];

    #[test]
    fn extrema_break_ties_by_lowest_index() {
        let allowed = [3, 2, 1];
        assert_eq!(pick_max_weight(&allowed, &WEIGHTS), Some(1));
        assert_eq!(pick_min_weight(&allowed, &WEIGHTS), Some(2));
        assert_eq!(pick_min_weight(&[3, 0, 2], &WEIGHTS), Some(0));
        assert_eq!(pick_max_weight(&[], &WEIGHTS), None);
    }

    #[test]
    fn weighted_variants_agree_on_fixed_draws() {
        let allowed = [0, 1, 2];
        for (fraction, expected) in [(0.0, 1), (0.5, 1), (0.8, 2), (0.999, 2)] {
            for mode in [
                WeightSelection::RandomWeighted,
                WeightSelection::LinearWeighted,
                WeightSelection::SubWeighted,
            ] {
                let mut rng = at(fraction);
                assert_eq!(
                    select_point(mode, &allowed, &WEIGHTS, &mut rng),
                    Some(expected),
                    "{mode:?} at {fraction}"
                );
            }
        }
    }

    #[test]
    fn zero_weight_candidates_are_never_picked() {
        let allowed = [0, 2];
        for fraction in [0.0, 0.3, 0.99] {
            let mut rng = at(fraction);
            assert_eq!(pick_sub_weighted(&allowed, &WEIGHTS, &mut rng), Some(2));
        }
    }

    #[test]
    fn all_zero_weights_yield_none() {
        let mut rng = at(0.5);
        assert_eq!(pick_random_weighted(&[0], &WEIGHTS, &mut rng), None);
        assert_eq!(pick_linear_weighted(&[0], &WEIGHTS, &mut rng), None);
        assert_eq!(pick_sub_weighted(&[], &WEIGHTS, &mut rng), None);
    }
}
