//! Ingredients: shapes with abundance targets, priorities and placement parameters.
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::compartment::CompartmentId;
use crate::error::{Error, Result};

pub mod placement;
pub mod shape;

pub use placement::{attempt_placement, PlaceOutcome, PlacementContext};
pub use shape::{CylinderSegment, PosedShape, Shape, Sphere, SphereLevel};

/// Index of an ingredient inside its environment.
pub type IngredientId = usize;

/// Default number of consecutive failed attempts before an ingredient gives up.
pub const DEFAULT_REJECTION_THRESHOLD: u32 = 30;

/// Where instances of an ingredient may be placed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementRegion {
    #[default]
    Exterior,
    /// On the surface band of a compartment.
    Surface(CompartmentId),
    /// Strictly inside a compartment.
    Interior(CompartmentId),
}

impl PlacementRegion {
    /// Grid tag encoding: `0`, `+c` or `-c`.
    pub fn code(&self) -> i32 {
        match *self {
            PlacementRegion::Exterior => 0,
            PlacementRegion::Surface(c) => c as i32,
            PlacementRegion::Interior(c) => -(c as i32),
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => PlacementRegion::Exterior,
            c if c > 0 => PlacementRegion::Surface(c as CompartmentId),
            c => PlacementRegion::Interior(c.unsigned_abs()),
        }
    }

    pub fn compartment(&self) -> Option<CompartmentId> {
        match *self {
            PlacementRegion::Exterior => None,
            PlacementRegion::Surface(c) | PlacementRegion::Interior(c) => Some(c),
        }
    }

    pub fn is_surface(&self) -> bool {
        matches!(self, PlacementRegion::Surface(_))
    }
}

/// How the scheduler picks candidate grid points for an ingredient.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackingMode {
    #[default]
    Random,
    /// Prefer points close to already occupied space.
    Close,
    /// Sample points by the named gradient's weights.
    Gradient(String),
}

/// Lifecycle state of an ingredient within a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    #[default]
    Active,
    /// Quota reached.
    Filled,
    /// No allowed grid point remained.
    Exhausted,
    /// `rejection_threshold` consecutive failed attempts.
    RejectionLimit,
}

impl Completion {
    pub fn is_active(&self) -> bool {
        matches!(self, Completion::Active)
    }
}

/// One ingredient of a recipe.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct Ingredient {
    /// Unique name within the recipe.
    pub name: String,
    pub shape: Shape,
    /// Local "up" aligned to the membrane normal for surface ingredients.
    pub principal_vector: Vec3,
    pub target_count: u32,
    /// `None` and `0` are normalized by radius; negative values force strict order.
    pub priority: Option<f32>,
    pub region: PlacementRegion,
    /// Per-axis jitter scale in units of half a grid spacing.
    pub jitter_max: Vec3,
    pub n_jitter_attempts: u32,
    pub use_rotation_axis: bool,
    pub rotation_axis: Vec3,
    /// Angle range in radians for rotations about `rotation_axis`.
    pub rotation_range: f32,
    pub rejection_threshold: u32,
    pub packing_mode: PackingMode,
    /// Extra clearance from the box faces beyond the encapsulating radius.
    pub cutoff_boundary: f32,
    /// Maximum center distance from the membrane for surface ingredients.
    /// Defaults to the grid spacing.
    pub cutoff_surface: Option<f32>,
    /// Names of ingredients that must already sit nearby for a point to be tried.
    pub partners: Vec<String>,
    /// Cosmetic RGB passed through to results.
    pub color: Option<[f32; 3]>,

    encapsulating_radius: f32,
    min_radius: f32,
    pub(crate) partner_ids: Vec<IngredientId>,
    pub(crate) placed_count: u32,
    pub(crate) rejection_counter: u32,
    pub(crate) total_rejections: u64,
    pub(crate) completion: Completion,
    pub(crate) last_position: Option<Vec3>,
}

impl Ingredient {
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        let encapsulating_radius = shape.encapsulating_radius();
        let min_radius = shape.min_radius();
        Self {
            name: name.into(),
            shape,
            principal_vector: Vec3::Z,
            target_count: 0,
            priority: None,
            region: PlacementRegion::Exterior,
            jitter_max: Vec3::ONE,
            n_jitter_attempts: 5,
            use_rotation_axis: false,
            rotation_axis: Vec3::Z,
            rotation_range: std::f32::consts::TAU,
            rejection_threshold: DEFAULT_REJECTION_THRESHOLD,
            packing_mode: PackingMode::Random,
            cutoff_boundary: 0.0,
            cutoff_surface: None,
            partners: Vec::new(),
            color: None,
            encapsulating_radius,
            min_radius,
            partner_ids: Vec::new(),
            placed_count: 0,
            rejection_counter: 0,
            total_rejections: 0,
            completion: Completion::Active,
            last_position: None,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.target_count = count;
        self
    }

    pub fn with_priority(mut self, priority: f32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_region(mut self, region: PlacementRegion) -> Self {
        self.region = region;
        self
    }

    pub fn with_jitter(mut self, jitter_max: Vec3, attempts: u32) -> Self {
        self.jitter_max = jitter_max;
        self.n_jitter_attempts = attempts;
        self
    }

    pub fn with_principal_vector(mut self, principal_vector: Vec3) -> Self {
        self.principal_vector = principal_vector;
        self
    }

    /// Restrict rotations to angles in `[0, range)` about `axis`.
    pub fn with_rotation_axis(mut self, axis: Vec3, range: f32) -> Self {
        self.use_rotation_axis = true;
        self.rotation_axis = axis;
        self.rotation_range = range;
        self
    }

    pub fn with_packing_mode(mut self, mode: PackingMode) -> Self {
        self.packing_mode = mode;
        self
    }

    pub fn with_rejection_threshold(mut self, threshold: u32) -> Self {
        self.rejection_threshold = threshold;
        self
    }

    pub fn with_cutoff_boundary(mut self, cutoff: f32) -> Self {
        self.cutoff_boundary = cutoff;
        self
    }

    pub fn with_cutoff_surface(mut self, cutoff: f32) -> Self {
        self.cutoff_surface = Some(cutoff);
        self
    }

    pub fn with_partners<I, S>(mut self, partners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partners = partners.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = Some(color);
        self
    }

    /// Checks shape and parameters, normalizing the direction vectors.
    pub fn validate(&mut self) -> Result<()> {
        self.shape.validate()?;
        let invalid = |msg: String| Err(Error::InvalidRecipe(format!("{}: {msg}", self.name)));
        if self.name.is_empty() {
            return Err(Error::InvalidRecipe("ingredient name is empty".into()));
        }
        if let Some(p) = self.priority {
            if !p.is_finite() {
                return invalid(format!("priority must be finite, got {p}"));
            }
        }
        if !self.jitter_max.is_finite() || self.jitter_max.min_element() < 0.0 {
            return invalid(format!("jitter_max must be >= 0, got {}", self.jitter_max));
        }
        if !self.cutoff_boundary.is_finite() || self.cutoff_boundary < 0.0 {
            return invalid(format!(
                "cutoff_boundary must be >= 0, got {}",
                self.cutoff_boundary
            ));
        }
        if let Some(c) = self.cutoff_surface {
            if !c.is_finite() || c < 0.0 {
                return invalid(format!("cutoff_surface must be >= 0, got {c}"));
            }
        }
        if !self.rotation_range.is_finite() || self.rotation_range < 0.0 {
            return invalid(format!(
                "rotation_range must be >= 0, got {}",
                self.rotation_range
            ));
        }
        self.principal_vector = self.principal_vector.try_normalize().unwrap_or(Vec3::Z);
        self.rotation_axis = self.rotation_axis.try_normalize().unwrap_or(Vec3::Z);
        if self.rejection_threshold == 0 {
            self.rejection_threshold = DEFAULT_REJECTION_THRESHOLD;
        }
        self.encapsulating_radius = self.shape.encapsulating_radius();
        self.min_radius = self.shape.min_radius();
        Ok(())
    }

    pub fn encapsulating_radius(&self) -> f32 {
        self.encapsulating_radius
    }

    pub fn min_radius(&self) -> f32 {
        self.min_radius
    }

    /// Largest translation the jitter can add at the given spacing.
    pub fn jitter_reach(&self, spacing: f32) -> f32 {
        self.jitter_max.max_element() * spacing * 0.5
    }

    pub fn placed_count(&self) -> u32 {
        self.placed_count
    }

    pub fn rejection_counter(&self) -> u32 {
        self.rejection_counter
    }

    pub fn total_rejections(&self) -> u64 {
        self.total_rejections
    }

    pub fn completion(&self) -> Completion {
        self.completion
    }

    pub fn is_active(&self) -> bool {
        self.completion.is_active()
    }

    pub fn last_position(&self) -> Option<Vec3> {
        self.last_position
    }

    /// Partner ingredients resolved by the environment.
    pub fn partner_ids(&self) -> &[IngredientId] {
        &self.partner_ids
    }

    /// Clears run counters; keeps configuration.
    pub(crate) fn reset(&mut self) {
        self.placed_count = 0;
        self.rejection_counter = 0;
        self.total_rejections = 0;
        self.completion = if self.target_count == 0 {
            Completion::Filled
        } else {
            Completion::Active
        };
        self.last_position = None;
    }

    /// Counts a successful placement; returns `true` when the quota is met.
    pub(crate) fn record_placement(&mut self, position: Vec3) -> bool {
        self.placed_count += 1;
        self.rejection_counter = 0;
        self.last_position = Some(position);
        if self.placed_count >= self.target_count {
            self.completion = Completion::Filled;
            true
        } else {
            false
        }
    }

    /// Counts a failed attempt; returns `true` when the rejection threshold is reached.
    pub(crate) fn record_rejection(&mut self) -> bool {
        self.rejection_counter += 1;
        self.total_rejections += 1;
        if self.rejection_counter >= self.rejection_threshold {
            self.completion = Completion::RejectionLimit;
            true
        } else {
            false
        }
    }

    pub(crate) fn mark_exhausted(&mut self) {
        self.completion = Completion::Exhausted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_codes_round_trip() {
        for region in [
            PlacementRegion::Exterior,
            PlacementRegion::Surface(3),
            PlacementRegion::Interior(2),
        ] {
            assert_eq!(PlacementRegion::from_code(region.code()), region);
        }
        assert_eq!(PlacementRegion::Interior(2).code(), -2);
        assert_eq!(PlacementRegion::Surface(2).compartment(), Some(2));
    }

    #[test]
    fn rejection_threshold_completes_ingredient() {
        let mut ingr = Ingredient::new("a", Shape::sphere(1.0))
            .with_count(5)
            .with_rejection_threshold(3);
        ingr.validate().expect("valid");
        ingr.reset();
        assert!(!ingr.record_rejection());
        assert!(!ingr.record_rejection());
        assert!(!ingr.record_placement(Vec3::ZERO));
        assert_eq!(ingr.rejection_counter(), 0);
        assert!(!ingr.record_rejection());
        assert!(!ingr.record_rejection());
        assert!(ingr.record_rejection());
        assert_eq!(ingr.completion(), Completion::RejectionLimit);
        assert_eq!(ingr.total_rejections(), 5);
    }

    #[test]
    fn quota_completes_ingredient() {
        let mut ingr = Ingredient::new("a", Shape::sphere(1.0)).with_count(2);
        ingr.reset();
        assert!(!ingr.record_placement(Vec3::ONE));
        assert!(ingr.record_placement(Vec3::ONE));
        assert_eq!(ingr.completion(), Completion::Filled);
        assert_eq!(ingr.last_position(), Some(Vec3::ONE));
    }

    #[test]
    fn zero_quota_starts_filled() {
        let mut ingr = Ingredient::new("a", Shape::sphere(1.0));
        ingr.reset();
        assert!(!ingr.is_active());
    }

    #[test]
    fn validate_normalizes_vectors() {
        let mut ingr = Ingredient::new("a", Shape::sphere(1.0))
            .with_principal_vector(Vec3::new(0.0, 3.0, 0.0))
            .with_rotation_axis(Vec3::ZERO, 1.0);
        ingr.validate().expect("valid");
        assert_eq!(ingr.principal_vector, Vec3::Y);
        assert_eq!(ingr.rotation_axis, Vec3::Z);

        let mut bad = Ingredient::new("b", Shape::sphere(1.0)).with_cutoff_boundary(-1.0);
        assert!(matches!(bad.validate(), Err(Error::InvalidRecipe(_))));
    }
}
