//! Ingredient selection table.
//!
//! Active ingredients fall into three groups:
//! - negative priority: a forced queue, most negative first (ties by id);
//! - positive priority: weighted by priority;
//! - zero or unset: weighted by `min_radius / Σ min_radius · p_min`, where `p_min`
//!   is the smallest positive priority (1.0 when there is none).
//!
//! The positive and zero groups share one cumulative distribution.
use crate::ingredient::{Ingredient, IngredientId};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriorityTable {
    forced: Vec<IngredientId>,
    weighted: Vec<IngredientId>,
    /// Normalized cumulative weights; the last entry is 1.
    cumulative: Vec<f32>,
}

impl PriorityTable {
    /// Builds the table over the active ingredients.
    pub fn build(ingredients: &[Ingredient]) -> Self {
        let active = || ingredients.iter().enumerate().filter(|(_, i)| i.is_active());

        let mut forced: Vec<(f32, IngredientId)> = active()
            .filter_map(|(id, i)| i.priority.filter(|&p| p < 0.0).map(|p| (p, id)))
            .collect();
        forced.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let positive: Vec<(IngredientId, f32)> = active()
            .filter_map(|(id, i)| i.priority.filter(|&p| p > 0.0).map(|p| (id, p)))
            .collect();
        let neutral: Vec<(IngredientId, f32)> = active()
            .filter(|(_, i)| i.priority.is_none_or(|p| p == 0.0))
            .map(|(id, i)| (id, i.min_radius()))
            .collect();

        let p_min = positive
            .iter()
            .map(|&(_, p)| p)
            .reduce(f32::min)
            .unwrap_or(1.0);
        let radius_sum: f32 = neutral.iter().map(|&(_, r)| r).sum();

        let mut entries = positive;
        entries.extend(neutral.into_iter().map(|(id, r)| {
            let w = if radius_sum > 0.0 {
                r / radius_sum * p_min
            } else {
                p_min
            };
            (id, w)
        }));
        entries.sort_by_key(|&(id, _)| id);

        let total: f32 = entries.iter().map(|&(_, w)| w).sum();
        let mut running = 0.0;
        let mut weighted = Vec::with_capacity(entries.len());
        let mut cumulative = Vec::with_capacity(entries.len());
        for (id, w) in entries {
            running += w;
            weighted.push(id);
            cumulative.push(if total > 0.0 { running / total } else { 1.0 });
        }
        if let Some(last) = cumulative.last_mut() {
            *last = 1.0;
        }

        Self {
            forced: forced.into_iter().map(|(_, id)| id).collect(),
            weighted,
            cumulative,
        }
    }

    /// True when no ingredient is selectable.
    pub fn is_empty(&self) -> bool {
        self.forced.is_empty() && self.weighted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.forced.len() + self.weighted.len()
    }

    /// Forced queue, in processing order.
    pub fn forced(&self) -> &[IngredientId] {
        &self.forced
    }

    /// Selection probability of each weighted ingredient, in id order.
    pub fn probabilities(&self) -> Vec<(IngredientId, f32)> {
        let mut prev = 0.0;
        self.weighted
            .iter()
            .zip(&self.cumulative)
            .map(|(&id, &c)| {
                let p = c - prev;
                prev = c;
                (id, p)
            })
            .collect()
    }

    /// Picks an ingredient for a uniform draw `u ∈ [0, 1)`.
    ///
    /// The head of the forced queue wins regardless of `u`.
    pub fn pick(&self, u: f32) -> Option<IngredientId> {
        if let Some(&id) = self.forced.first() {
            return Some(id);
        }
        let slot = self.cumulative.partition_point(|&c| c <= u);
        self.weighted
            .get(slot)
            .or_else(|| self.weighted.last())
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingredient::Shape;

    fn ingredient(name: &str, radius: f32, priority: Option<f32>) -> Ingredient {
        let mut i = Ingredient::new(name, Shape::sphere(radius)).with_count(1);
        i.priority = priority;
        i.reset();
        i
    }

    #[test]
    fn forced_queue_runs_most_negative_first() {
        let ingredients = vec![
            ingredient("z", 1.0, None),
            ingredient("y", 1.0, Some(-1.0)),
            ingredient("x", 1.0, Some(-2.0)),
        ];
        let table = PriorityTable::build(&ingredients);
        assert_eq!(table.forced(), &[2, 1]);
        assert_eq!(table.pick(0.99), Some(2));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn neutral_ingredients_scale_by_radius_and_smallest_priority() {
        let ingredients = vec![
            ingredient("a", 1.0, Some(2.0)),
            ingredient("b", 1.0, Some(4.0)),
            ingredient("c", 3.0, Some(0.0)),
            ingredient("d", 1.0, None),
        ];
        let table = PriorityTable::build(&ingredients);
        // weights: 2, 4, 3/4·2 = 1.5, 1/4·2 = 0.5 over a total of 8.
        let probs = table.probabilities();
        let expected = [(0, 0.25), (1, 0.5), (2, 0.1875), (3, 0.0625)];
        for ((id, p), (eid, ep)) in probs.into_iter().zip(expected) {
            assert_eq!(id, eid);
            assert!((p - ep).abs() < 1e-6, "{id}: {p} vs {ep}");
        }
        assert_eq!(table.pick(0.0), Some(0));
        assert_eq!(table.pick(0.3), Some(1));
        assert_eq!(table.pick(0.8), Some(2));
        assert_eq!(table.pick(0.99), Some(3));
    }

    #[test]
    fn completed_ingredients_drop_out() {
        let mut ingredients = vec![ingredient("a", 1.0, None), ingredient("b", 2.0, None)];
        ingredients[0].mark_exhausted();
        let table = PriorityTable::build(&ingredients);
        assert_eq!(table.probabilities(), vec![(1, 1.0)]);
        ingredients[1].mark_exhausted();
        assert!(PriorityTable::build(&ingredients).is_empty());
        assert_eq!(PriorityTable::build(&ingredients).pick(0.5), None);
    }
}
