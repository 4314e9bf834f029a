//! Results of a packing run and the writers that persist them.
use std::io::Write;

use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ingredient::{Completion, IngredientId};
use crate::packed::InstanceId;

/// One committed instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackedInstance {
    /// Position in [`PackResult::instances`] (commit order).
    pub id: InstanceId,
    pub ingredient_id: IngredientId,
    pub position: Vec3,
    pub rotation: Mat3,
    /// Grid point the attempt started from.
    pub grid_point: u32,
    /// Scheduler iteration that committed the instance.
    pub rank: usize,
}

/// Per-ingredient counters at the end of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IngredientReport {
    pub id: IngredientId,
    pub name: String,
    pub target_count: u32,
    pub placed_count: u32,
    pub total_rejections: u64,
    pub completion: Completion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[f32; 3]>,
}

/// Outcome of a packing run.
#[non_exhaustive]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PackResult {
    pub seed: u64,
    pub instances: Vec<PackedInstance>,
    pub ingredients: Vec<IngredientReport>,
    /// Free grid points left.
    pub free_points: usize,
    pub total_points: usize,
    pub iterations: usize,
    /// True when the run stopped on a cancellation request.
    pub cancelled: bool,
}

impl PackResult {
    pub fn placed_total(&self) -> u64 {
        self.ingredients.iter().map(|i| i.placed_count as u64).sum()
    }

    pub fn target_total(&self) -> u64 {
        self.ingredients.iter().map(|i| i.target_count as u64).sum()
    }

    /// True when every quota was met.
    pub fn is_complete(&self) -> bool {
        self.ingredients
            .iter()
            .all(|i| i.placed_count >= i.target_count)
    }

    /// `Σ placed / Σ target`; 1 for an empty recipe.
    pub fn completion_ratio(&self) -> f32 {
        let target = self.target_total();
        if target == 0 {
            return 1.0;
        }
        (self.placed_total() as f64 / target as f64) as f32
    }

    /// Instances of one ingredient, in commit order.
    pub fn instances_of(&self, ingredient: IngredientId) -> impl Iterator<Item = &PackedInstance> {
        self.instances
            .iter()
            .filter(move |i| i.ingredient_id == ingredient)
    }

    pub fn report(&self, name: &str) -> Option<&IngredientReport> {
        self.ingredients.iter().find(|r| r.name == name)
    }
}

/// Sink for finished results.
pub trait Writer {
    fn write(&mut self, result: &PackResult) -> Result<()>;
}

/// Writes results as JSON to any [`std::io::Write`].
#[derive(Debug)]
pub struct JsonWriter<W: Write> {
    inner: W,
    pretty: bool,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            pretty: false,
        }
    }

    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Writer for JsonWriter<W> {
    fn write(&mut self, result: &PackResult) -> Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.inner, result)?;
        } else {
            serde_json::to_writer(&mut self.inner, result)?;
        }
        self.inner.write_all(b"\n")?;
        self.inner.flush()?;
        Ok(())
    }
}
