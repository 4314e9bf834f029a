//! Environment setup: grid, compartments, ingredients and gradients in one arena.
//!
//! Everything is addressed by index: compartments by `CompartmentId` (slot + 1),
//! ingredients by `IngredientId`, instances by `InstanceId`. Building an
//! environment tags the grid (or restores it from a cache file), resolves partner
//! names and gradients, and derives spacing and padding defaults.
use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::compartment::{tag_grid, Compartment, CompartmentId};
use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, Mesh};
use crate::gradient::Gradient;
use crate::grid::cache::{GridCache, GridCacheKey};
use crate::grid::Grid;
use crate::ingredient::{Ingredient, IngredientId, PackingMode};
use crate::pack::config::PackConfig;
use crate::pack::events::EventSink;
use crate::pack::result::{IngredientReport, PackResult, PackedInstance};
use crate::pack::runner::PackRun;
use crate::pack::CancellationFlag;
use crate::packed::PackedObjects;
use crate::recipe::{resolve_gradient, CompartmentSpec, GradientSpec, MeshStore, Recipe};

/// Collects the parts of an environment before validation.
#[derive(Clone, Debug)]
pub struct EnvironmentBuilder {
    bounding_box: BoundingBox,
    config: PackConfig,
    compartments: Vec<CompartmentSpec>,
    ingredients: Vec<Ingredient>,
    gradients: Vec<GradientSpec>,
}

impl EnvironmentBuilder {
    pub fn new(bounding_box: BoundingBox) -> Self {
        Self {
            bounding_box,
            config: PackConfig::default(),
            compartments: Vec::new(),
            ingredients: Vec::new(),
            gradients: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: PackConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a top-level compartment; its id is the number of compartments so far.
    pub fn with_compartment(self, name: impl Into<String>, mesh: Mesh) -> Self {
        self.push_compartment(name.into(), mesh, None)
    }

    /// Adds a compartment nested inside `parent`.
    pub fn with_child_compartment(
        self,
        name: impl Into<String>,
        mesh: Mesh,
        parent: CompartmentId,
    ) -> Self {
        self.push_compartment(name.into(), mesh, Some(parent))
    }

    fn push_compartment(mut self, name: String, mesh: Mesh, parent: Option<CompartmentId>) -> Self {
        self.compartments.push(CompartmentSpec { name, mesh, parent });
        self
    }

    pub fn with_ingredient(mut self, ingredient: Ingredient) -> Self {
        self.ingredients.push(ingredient);
        self
    }

    pub fn with_ingredients(mut self, ingredients: impl IntoIterator<Item = Ingredient>) -> Self {
        self.ingredients.extend(ingredients);
        self
    }

    pub fn with_gradient(mut self, gradient: GradientSpec) -> Self {
        self.gradients.push(gradient);
        self
    }

    /// Validates everything and tags the grid.
    pub fn build(self) -> Result<Environment> {
        let config = self.config;
        config.validate()?;
        self.bounding_box
            .validate()
            .map_err(|e| Error::InvalidRecipe(format!("bounding box: {e}")))?;

        let mut ingredients = self.ingredients;
        for ingredient in &mut ingredients {
            ingredient.validate()?;
        }
        resolve_partners(&mut ingredients)?;
        let n_compartments = self.compartments.len();
        for ingredient in &ingredients {
            if let Some(c) = ingredient.region.compartment() {
                if c == 0 || c as usize > n_compartments {
                    return Err(Error::InvalidRecipe(format!(
                        "ingredient '{}' targets unknown compartment {c}",
                        ingredient.name
                    )));
                }
            }
        }

        let spacing = match config.spacing {
            Some(s) => s,
            None => ingredients
                .iter()
                .map(Ingredient::min_radius)
                .reduce(f32::min)
                .map(|r| r * 2.0 / 3f32.sqrt())
                .ok_or_else(|| {
                    Error::InvalidConfig("spacing is required for a recipe without ingredients".into())
                })?,
        };
        let mut grid = Grid::new(self.bounding_box, spacing, config.grid_style)?;

        let gradient_specs = self
            .gradients
            .iter()
            .map(|spec| resolve_gradient(spec, &self.compartments))
            .collect::<Result<Vec<_>>>()?;
        let mut compartments = self
            .compartments
            .into_iter()
            .enumerate()
            .map(|(slot, spec)| {
                let compartment = Compartment::new(slot as CompartmentId + 1, spec.name, spec.mesh)?;
                Ok(match spec.parent {
                    Some(parent) => compartment.with_parent(parent),
                    None => compartment,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        prepare_grid(&config, &mut grid, &mut compartments)?;

        let mut warnings = Vec::new();
        for ingredient in &ingredients {
            let code = ingredient.region.code();
            if ingredient.target_count > 0 && !grid.compartment_ids().contains(&code) {
                warn!(
                    ingredient = %ingredient.name,
                    region = code,
                    "ingredient region holds no grid point"
                );
                warnings.push(BuildWarning {
                    context: ingredient.name.clone(),
                    message: format!("region {code} holds no grid point"),
                });
            }
        }

        let mut gradients: Vec<Gradient> = Vec::with_capacity(gradient_specs.len());
        for spec in gradient_specs {
            if gradients.iter().any(|g| g.name() == spec.name) {
                return Err(Error::InvalidRecipe(format!(
                    "gradient '{}' declared twice",
                    spec.name
                )));
            }
            gradients.push(Gradient::build(
                spec.name,
                spec.mode,
                spec.selection,
                spec.invert,
                &grid,
                &compartments,
            )?);
        }
        let gradient_refs = ingredients
            .iter()
            .map(|ingredient| match &ingredient.packing_mode {
                PackingMode::Gradient(name) => {
                    let found = gradients.iter().position(|g| g.name() == name);
                    if found.is_none() {
                        warn!(
                            ingredient = %ingredient.name,
                            gradient = %name,
                            "unknown gradient; falling back to random point picking"
                        );
                        warnings.push(BuildWarning {
                            context: ingredient.name.clone(),
                            message: format!("unknown gradient '{name}', picking points at random"),
                        });
                    }
                    found
                }
                _ => None,
            })
            .collect();

        let padding = config.padding.unwrap_or_else(|| {
            let radius = ingredients
                .iter()
                .map(Ingredient::encapsulating_radius)
                .fold(0.0, f32::max);
            let reach = ingredients
                .iter()
                .map(|i| i.jitter_reach(spacing))
                .fold(0.0, f32::max);
            radius + reach
        });

        for ingredient in &mut ingredients {
            ingredient.reset();
        }
        let packed = PackedObjects::new(config.index_bulk_threshold, config.index_rebuild_every);

        info!(
            grid_points = grid.len(),
            dims = ?grid.dims(),
            spacing,
            padding,
            compartments = compartments.len(),
            ingredients = ingredients.len(),
            gradients = gradients.len(),
            "environment ready"
        );

        Ok(Environment {
            config,
            grid,
            compartments,
            ingredients,
            gradients,
            gradient_refs,
            packed,
            instances: Vec::new(),
            padding,
            warnings,
        })
    }
}

/// Maps partner names onto ingredient ids; names must be unique.
fn resolve_partners(ingredients: &mut [Ingredient]) -> Result<()> {
    let mut ids: BTreeMap<String, IngredientId> = BTreeMap::new();
    for (id, ingredient) in ingredients.iter().enumerate() {
        if ids.insert(ingredient.name.clone(), id).is_some() {
            return Err(Error::InvalidRecipe(format!(
                "ingredient name '{}' is not unique",
                ingredient.name
            )));
        }
    }
    for ingredient in ingredients.iter_mut() {
        ingredient.partner_ids = ingredient
            .partners
            .iter()
            .map(|name| {
                ids.get(name).copied().ok_or_else(|| {
                    Error::InvalidRecipe(format!(
                        "ingredient '{}' names unknown partner '{name}'",
                        ingredient.name
                    ))
                })
            })
            .collect::<Result<_>>()?;
    }
    Ok(())
}

/// Restores tags from the grid cache when it matches, tags from scratch otherwise.
fn prepare_grid(config: &PackConfig, grid: &mut Grid, compartments: &mut [Compartment]) -> Result<()> {
    let key = GridCacheKey::new(grid, compartments, config.inside_method, config.surface_method);
    if let (true, Some(path)) = (config.load_from_grid_file, &config.grid_file) {
        match GridCache::load_matching(path, &key) {
            Ok(cache) => {
                cache.apply(grid, compartments)?;
                info!(path = %path.display(), "restored tagged grid from cache");
                return Ok(());
            }
            Err(Error::CacheMismatch { expected, found }) => {
                warn!(%expected, %found, "grid cache key mismatch; rebuilding grid");
            }
            Err(e @ (Error::Io(_) | Error::Serialization(_))) => {
                warn!(path = %path.display(), error = %e, "grid cache unreadable; rebuilding grid");
            }
            Err(e) => return Err(e),
        }
    }

    tag_grid(grid, compartments, config.inside_method, config.surface_method)?;

    if let (true, Some(path)) = (config.save_grid_file, &config.grid_file) {
        GridCache::capture(key, grid, compartments).save(path)?;
        info!(path = %path.display(), "saved tagged grid");
    }
    Ok(())
}

/// Owns all state of a packing problem.
#[derive(Debug)]
pub struct Environment {
    pub(crate) config: PackConfig,
    pub(crate) grid: Grid,
    pub(crate) compartments: Vec<Compartment>,
    pub(crate) ingredients: Vec<Ingredient>,
    pub(crate) gradients: Vec<Gradient>,
    /// Gradient used by each ingredient, if it packs by gradient.
    pub(crate) gradient_refs: Vec<Option<usize>>,
    pub(crate) packed: PackedObjects,
    pub(crate) instances: Vec<PackedInstance>,
    pub(crate) padding: f32,
    pub(crate) warnings: Vec<BuildWarning>,
}

/// Non-fatal problem found while building; replayed as a warning event by every run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildWarning {
    pub context: String,
    pub message: String,
}

impl Environment {
    pub fn builder(bounding_box: BoundingBox) -> EnvironmentBuilder {
        EnvironmentBuilder::new(bounding_box)
    }

    /// Resolves `recipe` through `store` and builds the environment.
    pub fn from_recipe(recipe: &Recipe, store: &dyn MeshStore, config: PackConfig) -> Result<Self> {
        let resolved = recipe.resolve(store)?;
        info!(
            recipe = %recipe.name,
            version = %recipe.version,
            compartments = resolved.compartments.len(),
            ingredients = resolved.ingredients.len(),
            "recipe resolved"
        );
        EnvironmentBuilder {
            bounding_box: resolved.bounding_box,
            config,
            compartments: resolved.compartments,
            ingredients: resolved.ingredients,
            gradients: resolved.gradients,
        }
        .build()
    }

    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn compartments(&self) -> &[Compartment] {
        &self.compartments
    }

    pub fn compartment(&self, id: CompartmentId) -> Option<&Compartment> {
        self.compartments.get((id as usize).checked_sub(1)?)
    }

    pub fn ingredients(&self) -> &[Ingredient] {
        &self.ingredients
    }

    pub fn ingredient(&self, id: IngredientId) -> &Ingredient {
        &self.ingredients[id]
    }

    pub fn ingredient_id(&self, name: &str) -> Option<IngredientId> {
        self.ingredients.iter().position(|i| i.name == name)
    }

    pub fn gradients(&self) -> &[Gradient] {
        &self.gradients
    }

    pub fn gradient(&self, name: &str) -> Option<&Gradient> {
        self.gradients.iter().find(|g| g.name() == name)
    }

    pub fn packed(&self) -> &PackedObjects {
        &self.packed
    }

    /// Committed instances, in commit order.
    pub fn instances(&self) -> &[PackedInstance] {
        &self.instances
    }

    pub fn padding(&self) -> f32 {
        self.padding
    }

    pub fn warnings(&self) -> &[BuildWarning] {
        &self.warnings
    }

    /// Returns the environment to its cold-start state, keeping tags and gradients.
    pub fn reset(&mut self) {
        self.grid.reset();
        self.packed.clear();
        self.instances.clear();
        for ingredient in &mut self.ingredients {
            ingredient.reset();
        }
    }

    /// Resets and starts a run driven step by step.
    pub fn start(&mut self, seed: u64) -> PackRun<'_> {
        PackRun::new(self, seed)
    }

    /// Packs to completion.
    pub fn pack(&mut self, seed: u64) -> PackResult {
        self.start(seed).run(&mut (), &CancellationFlag::new())
    }

    /// Packs to completion, reporting to `sink` and honoring `cancel`.
    pub fn pack_with_events(
        &mut self,
        seed: u64,
        sink: &mut dyn EventSink,
        cancel: &CancellationFlag,
    ) -> PackResult {
        self.start(seed).run(sink, cancel)
    }

    /// Snapshot of the current state as a result.
    pub(crate) fn result(&self, seed: u64, iterations: usize, cancelled: bool) -> PackResult {
        PackResult {
            seed,
            instances: self.instances.clone(),
            ingredients: self
                .ingredients
                .iter()
                .enumerate()
                .map(|(id, i)| IngredientReport {
                    id,
                    name: i.name.clone(),
                    target_count: i.target_count,
                    placed_count: i.placed_count(),
                    total_rejections: i.total_rejections(),
                    completion: i.completion(),
                    color: i.color,
                })
                .collect(),
            free_points: self.grid.n_free(),
            total_points: self.grid.len(),
            iterations,
            cancelled,
        }
    }
}
