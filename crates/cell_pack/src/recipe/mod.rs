//! Serde model of a packing recipe and its resolution into compartments and ingredients.
//!
//! A recipe names reusable `objects` (shapes or compartment meshes) and a
//! `composition` tree. The root composition entry, the one no other entry refers
//! to, describes the exterior of the box; entries whose object is a mesh become
//! compartments and contribute interior and surface regions of their own.
//!
//! ```json
//! {
//!   "name": "demo",
//!   "bounding_box": [[0, 0, 0], [100, 100, 100]],
//!   "objects": {
//!     "ball": { "type": "single_sphere", "radius": 5 },
//!     "cell": { "type": "mesh", "mesh": "cell.json" }
//!   },
//!   "composition": {
//!     "space": { "regions": { "interior": ["cell", { "object": "ball", "count": 10 }] } },
//!     "cell": { "object": "cell", "regions": { "interior": [{ "object": "ball", "count": 4 }] } }
//!   }
//! }
//! ```
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::compartment::CompartmentId;
use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, Mesh};
use crate::gradient::{GradientMode, WeightSelection};
use crate::ingredient::{
    CylinderSegment, Ingredient, PackingMode, PlacementRegion, Shape, SphereLevel,
};

pub mod mesh_store;

pub use mesh_store::{InMemoryMeshStore, JsonMeshStore, MeshStore};

/// Avogadro constant, 1/mol.
pub const AVOGADRO: f64 = 6.022_140_76e23;

/// Instances expected for `molarity` (mol/L) in `volume` cubic ångström.
///
/// `1 Å³ = 1e-27 L`.
pub fn molarity_to_count(molarity: f64, volume: f64) -> u32 {
    let count = (molarity * AVOGADRO * volume * 1e-27).round();
    if count.is_finite() && count > 0.0 {
        count.min(u32::MAX as f64) as u32
    } else {
        0
    }
}

/// Geometry kind of an [`ObjectSpec`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    #[default]
    SingleSphere,
    MultiSphere,
    SingleCylinder,
    MultiCylinder,
    SingleCube,
    /// Compartment boundary read through a [`MeshStore`].
    Mesh,
}

/// Candidate-point strategy named in a recipe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackingModeName {
    #[default]
    Random,
    Close,
    Gradient,
}

/// Reusable object definition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectSpec {
    #[serde(rename = "type")]
    pub kind: ObjectType,
    pub radius: Option<f32>,
    /// Sphere centers, or cylinder bottom points.
    pub positions: Option<Vec<Vec3>>,
    pub radii: Option<Vec<f32>>,
    /// Cylinder top points, paired with `positions`.
    pub positions2: Option<Vec<Vec3>>,
    /// Explicit sphere tree for multi-sphere objects; overrides `positions`/`radii`.
    pub levels: Option<Vec<SphereLevel>>,
    pub half_extents: Option<Vec3>,
    pub mesh: Option<String>,
    pub color: Option<[f32; 3]>,
    pub jitter_attempts: Option<u32>,
    pub max_jitter: Option<Vec3>,
    pub priority: Option<f32>,
    pub packing_mode: Option<PackingModeName>,
    pub gradient: Option<String>,
    pub use_rotation_axis: bool,
    pub rotation_axis: Option<Vec3>,
    pub rotation_range: Option<f32>,
    pub principal_vector: Option<Vec3>,
    pub rejection_threshold: Option<u32>,
    pub cutoff_boundary: Option<f32>,
    pub cutoff_surface: Option<f32>,
    pub partners: Vec<String>,
}

impl ObjectSpec {
    /// Builds the ingredient shape. Mesh objects have none.
    pub fn to_shape(&self) -> Result<Shape> {
        let missing = |field: &str| {
            Error::InvalidRecipe(format!("{:?} object needs `{field}`", self.kind))
        };
        let shape = match self.kind {
            ObjectType::SingleSphere => {
                let radius = self
                    .radius
                    .or_else(|| self.radii.as_ref().and_then(|r| r.first().copied()))
                    .ok_or_else(|| missing("radius"))?;
                Shape::sphere(radius)
            }
            ObjectType::MultiSphere => match &self.levels {
                Some(levels) => Shape::MultiSphere {
                    levels: levels.clone(),
                },
                None => {
                    let centers = self.positions.clone().ok_or_else(|| missing("positions"))?;
                    let radii = self.radii.clone().ok_or_else(|| missing("radii"))?;
                    Shape::multi_sphere(centers, radii)
                }
            },
            ObjectType::SingleCylinder | ObjectType::MultiCylinder => {
                let segments = self.cylinder_segments()?;
                if self.kind == ObjectType::SingleCylinder {
                    if segments.len() != 1 {
                        return Err(Error::InvalidRecipe(format!(
                            "single cylinder has {} segments",
                            segments.len()
                        )));
                    }
                    Shape::SingleCylinder(segments[0])
                } else {
                    Shape::MultiCylinder { segments }
                }
            }
            ObjectType::SingleCube => {
                Shape::cube(self.half_extents.ok_or_else(|| missing("half_extents"))?)
            }
            ObjectType::Mesh => {
                return Err(Error::InvalidRecipe(
                    "mesh objects describe compartments, not ingredients".into(),
                ))
            }
        };
        shape.validate()?;
        Ok(shape)
    }

    /// Pairs `positions[i]` with `positions2[i]`; each segment takes `radii[i]`
    /// or the shared `radius`.
    fn cylinder_segments(&self) -> Result<Vec<CylinderSegment>> {
        let (Some(bottoms), Some(tops)) = (&self.positions, &self.positions2) else {
            return Err(Error::InvalidRecipe(
                "cylinders need both `positions` and `positions2`".into(),
            ));
        };
        if bottoms.len() != tops.len() || bottoms.is_empty() {
            return Err(Error::InvalidRecipe(format!(
                "cylinder has {} bottom and {} top points",
                bottoms.len(),
                tops.len()
            )));
        }
        bottoms
            .iter()
            .zip(tops)
            .enumerate()
            .map(|(i, (&bottom, &top))| {
                let radius = self
                    .radii
                    .as_ref()
                    .and_then(|r| r.get(i).copied())
                    .or(self.radius)
                    .ok_or_else(|| {
                        Error::InvalidRecipe(format!("cylinder segment {i} has no radius"))
                    })?;
                Ok(CylinderSegment {
                    bottom,
                    top,
                    radius,
                })
            })
            .collect()
    }

    fn packing_mode(&self) -> Result<PackingMode> {
        match (self.packing_mode, &self.gradient) {
            (Some(PackingModeName::Gradient) | None, Some(name)) => {
                Ok(PackingMode::Gradient(name.clone()))
            }
            (Some(PackingModeName::Gradient), None) => Err(Error::InvalidRecipe(
                "gradient packing mode without a `gradient` name".into(),
            )),
            (Some(PackingModeName::Close), _) => Ok(PackingMode::Close),
            _ => Ok(PackingMode::Random),
        }
    }

    /// Builds an ingredient with its recipe parameters applied.
    pub fn to_ingredient(&self, name: &str) -> Result<Ingredient> {
        let mut ingredient = Ingredient::new(name, self.to_shape()?)
            .with_packing_mode(self.packing_mode()?)
            .with_partners(self.partners.iter().cloned());
        if let Some(p) = self.priority {
            ingredient = ingredient.with_priority(p);
        }
        if self.max_jitter.is_some() || self.jitter_attempts.is_some() {
            let jitter_max = self.max_jitter.unwrap_or(ingredient.jitter_max);
            let attempts = self.jitter_attempts.unwrap_or(ingredient.n_jitter_attempts);
            ingredient = ingredient.with_jitter(jitter_max, attempts);
        }
        if self.use_rotation_axis {
            ingredient = ingredient.with_rotation_axis(
                self.rotation_axis.unwrap_or(Vec3::Z),
                self.rotation_range.unwrap_or(std::f32::consts::TAU),
            );
        }
        if let Some(v) = self.principal_vector {
            ingredient = ingredient.with_principal_vector(v);
        }
        if let Some(t) = self.rejection_threshold {
            ingredient = ingredient.with_rejection_threshold(t);
        }
        if let Some(c) = self.cutoff_boundary {
            ingredient = ingredient.with_cutoff_boundary(c);
        }
        if let Some(c) = self.cutoff_surface {
            ingredient = ingredient.with_cutoff_surface(c);
        }
        if let Some(color) = self.color {
            ingredient = ingredient.with_color(color);
        }
        Ok(ingredient)
    }
}

/// Abundance and priority override attached to an object in a region.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InlineIngredient {
    pub object: String,
    pub count: Option<i64>,
    pub molarity: Option<f64>,
    pub priority: Option<f32>,
}

/// Item of a region list: a composition entry name or an inline ingredient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegionItem {
    Reference(String),
    Inline(InlineIngredient),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Regions {
    pub interior: Vec<RegionItem>,
    pub surface: Vec<RegionItem>,
}

/// Node of the composition tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionEntry {
    pub object: Option<String>,
    pub count: Option<i64>,
    pub molarity: Option<f64>,
    pub priority: Option<f32>,
    pub regions: Regions,
}

/// Named gradient declared by a recipe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientSpec {
    pub name: String,
    #[serde(flatten)]
    pub mode: GradientMode,
    #[serde(default)]
    pub selection: WeightSelection,
    #[serde(default)]
    pub invert: bool,
    /// Composition entry whose surface a `surface` gradient follows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compartment_name: Option<String>,
}

impl GradientSpec {
    pub fn new(name: impl Into<String>, mode: GradientMode) -> Self {
        Self {
            name: name.into(),
            mode,
            selection: WeightSelection::default(),
            invert: false,
            compartment_name: None,
        }
    }

    pub fn with_selection(mut self, selection: WeightSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }
}

/// A complete packing recipe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub objects: BTreeMap<String, ObjectSpec>,
    #[serde(default)]
    pub composition: BTreeMap<String, CompositionEntry>,
    #[serde(default)]
    pub gradients: Vec<GradientSpec>,
}

/// Compartment produced by recipe resolution; its id is its position plus one.
#[derive(Clone, Debug, PartialEq)]
pub struct CompartmentSpec {
    pub name: String,
    pub mesh: Mesh,
    pub parent: Option<CompartmentId>,
}

/// Recipe flattened into the arenas an environment is built from.
#[derive(Clone, Debug)]
pub struct ResolvedRecipe {
    pub bounding_box: BoundingBox,
    pub compartments: Vec<CompartmentSpec>,
    pub ingredients: Vec<Ingredient>,
    pub gradients: Vec<GradientSpec>,
}

impl Recipe {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let recipe: Recipe = serde_json::from_str(json)?;
        recipe.validate()?;
        Ok(recipe)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Structural checks that need no mesh access.
    pub fn validate(&self) -> Result<()> {
        self.bounding_box
            .validate()
            .map_err(|e| Error::InvalidRecipe(format!("bounding box: {e}")))?;
        if self.composition.is_empty() {
            return Err(Error::InvalidRecipe("composition is empty".into()));
        }
        for (name, entry) in &self.composition {
            if let Some(object) = &entry.object {
                if !self.objects.contains_key(object) {
                    return Err(Error::InvalidRecipe(format!(
                        "entry '{name}' refers to unknown object '{object}'"
                    )));
                }
            }
            for item in entry.regions.interior.iter().chain(&entry.regions.surface) {
                match item {
                    RegionItem::Reference(target) if !self.composition.contains_key(target) => {
                        return Err(Error::InvalidRecipe(format!(
                            "entry '{name}' refers to unknown entry '{target}'"
                        )));
                    }
                    RegionItem::Inline(inline) if !self.objects.contains_key(&inline.object) => {
                        return Err(Error::InvalidRecipe(format!(
                            "entry '{name}' refers to unknown object '{}'",
                            inline.object
                        )));
                    }
                    _ => {}
                }
            }
        }
        self.root()?;
        Ok(())
    }

    /// The single composition entry no other entry refers to.
    fn root(&self) -> Result<&str> {
        let referenced: BTreeSet<&str> = self
            .composition
            .values()
            .flat_map(|e| e.regions.interior.iter().chain(&e.regions.surface))
            .filter_map(|item| match item {
                RegionItem::Reference(name) => Some(name.as_str()),
                RegionItem::Inline(_) => None,
            })
            .collect();
        let roots: Vec<&str> = self
            .composition
            .keys()
            .map(String::as_str)
            .filter(|name| !referenced.contains(name))
            .collect();
        match roots.as_slice() {
            [root] => Ok(root),
            [] => Err(Error::InvalidRecipe(
                "composition has no root entry (every entry is referenced)".into(),
            )),
            _ => Err(Error::InvalidRecipe(format!(
                "composition has several root entries: {roots:?}"
            ))),
        }
    }

    fn is_compartment(&self, entry: &CompositionEntry) -> bool {
        entry
            .object
            .as_ref()
            .and_then(|o| self.objects.get(o))
            .is_some_and(|o| o.kind == ObjectType::Mesh)
    }

    /// Walks the composition tree depth first, assigning compartment ids in visit
    /// order and turning every ingredient into an [`Ingredient`] with its region
    /// and target count.
    pub fn resolve(&self, store: &dyn MeshStore) -> Result<ResolvedRecipe> {
        self.validate()?;
        let root = self.root()?;
        let root_entry = &self.composition[root];
        if self.is_compartment(root_entry) {
            return Err(Error::InvalidRecipe(format!(
                "root entry '{root}' cannot be a compartment"
            )));
        }
        if !root_entry.regions.surface.is_empty() {
            return Err(Error::InvalidRecipe(format!(
                "root entry '{root}' has no surface"
            )));
        }

        let mut state = Resolution {
            recipe: self,
            store,
            visited: BTreeSet::from([root.to_owned()]),
            compartments: Vec::new(),
            pending: Vec::new(),
        };
        state.visit_regions(root_entry, None)?;

        let volumes = region_volumes(&self.bounding_box, &state.compartments);
        let mut ingredients = Vec::with_capacity(state.pending.len());
        let mut names = BTreeSet::new();
        for pending in state.pending {
            let mut ingredient = self.objects[&pending.object].to_ingredient(&pending.name)?;
            if !names.insert(pending.name.clone()) {
                return Err(Error::InvalidRecipe(format!(
                    "ingredient '{}' appears twice; give it a composition entry per region",
                    pending.name
                )));
            }
            let count = match (pending.count, pending.molarity) {
                (Some(c), _) if c < 0 => {
                    return Err(Error::InvalidRecipe(format!(
                        "ingredient '{}' has negative count {c}",
                        pending.name
                    )))
                }
                (Some(c), _) => u32::try_from(c).unwrap_or(u32::MAX),
                (None, Some(m)) if m < 0.0 || !m.is_finite() => {
                    return Err(Error::InvalidRecipe(format!(
                        "ingredient '{}' has invalid molarity {m}",
                        pending.name
                    )))
                }
                (None, Some(m)) => {
                    let volume = volumes[pending.region.compartment().unwrap_or(0) as usize];
                    molarity_to_count(m, volume)
                }
                (None, None) => {
                    warn!(
                        ingredient = %pending.name,
                        "no count or molarity given; nothing will be placed"
                    );
                    0
                }
            };
            ingredient = ingredient.with_count(count).with_region(pending.region);
            if let Some(p) = pending.priority {
                ingredient = ingredient.with_priority(p);
            }
            ingredients.push(ingredient);
        }

        let gradients = self
            .gradients
            .iter()
            .map(|spec| resolve_gradient(spec, &state.compartments))
            .collect::<Result<Vec<_>>>()?;

        Ok(ResolvedRecipe {
            bounding_box: self.bounding_box,
            compartments: state.compartments,
            ingredients,
            gradients,
        })
    }
}

/// Replaces a named surface-gradient compartment by its resolved id.
pub(crate) fn resolve_gradient(spec: &GradientSpec, compartments: &[CompartmentSpec]) -> Result<GradientSpec> {
    let mut spec = spec.clone();
    if let (GradientMode::Surface { compartment, .. }, Some(name)) =
        (&mut spec.mode, &spec.compartment_name)
    {
        let slot = compartments
            .iter()
            .position(|c| &c.name == name)
            .ok_or_else(|| {
                Error::InvalidRecipe(format!(
                    "gradient '{}' names unknown compartment '{name}'",
                    spec.name
                ))
            })?;
        *compartment = slot as CompartmentId + 1;
    }
    Ok(spec)
}

/// Volume of each region in cubic ångström: index 0 is the exterior (box minus
/// top-level compartments), index `c` the mesh volume of compartment `c`.
fn region_volumes(bounding_box: &BoundingBox, compartments: &[CompartmentSpec]) -> Vec<f64> {
    let mut volumes = Vec::with_capacity(compartments.len() + 1);
    let top_level: f64 = compartments
        .iter()
        .filter(|c| c.parent.is_none())
        .map(|c| c.mesh.volume() as f64)
        .sum();
    volumes.push((bounding_box.volume() as f64 - top_level).max(0.0));
    volumes.extend(compartments.iter().map(|c| c.mesh.volume() as f64));
    volumes
}

struct PendingIngredient {
    name: String,
    object: String,
    region: PlacementRegion,
    count: Option<i64>,
    molarity: Option<f64>,
    priority: Option<f32>,
}

struct Resolution<'a> {
    recipe: &'a Recipe,
    store: &'a dyn MeshStore,
    visited: BTreeSet<String>,
    compartments: Vec<CompartmentSpec>,
    pending: Vec<PendingIngredient>,
}

impl Resolution<'_> {
    fn visit_regions(&mut self, entry: &CompositionEntry, owner: Option<CompartmentId>) -> Result<()> {
        let interior = match owner {
            Some(c) => PlacementRegion::Interior(c),
            None => PlacementRegion::Exterior,
        };
        for item in &entry.regions.interior {
            self.visit_item(item, interior, owner)?;
        }
        if let Some(c) = owner {
            for item in &entry.regions.surface {
                self.visit_item(item, PlacementRegion::Surface(c), owner)?;
            }
        }
        Ok(())
    }

    fn visit_item(
        &mut self,
        item: &RegionItem,
        region: PlacementRegion,
        owner: Option<CompartmentId>,
    ) -> Result<()> {
        let recipe = self.recipe;
        match item {
            RegionItem::Inline(inline) => {
                self.pending.push(PendingIngredient {
                    name: inline.object.clone(),
                    object: inline.object.clone(),
                    region,
                    count: inline.count,
                    molarity: inline.molarity,
                    priority: inline.priority,
                });
                Ok(())
            }
            RegionItem::Reference(name) => {
                if !self.visited.insert(name.clone()) {
                    return Err(Error::InvalidRecipe(format!(
                        "composition entry '{name}' is referenced more than once"
                    )));
                }
                let entry = &recipe.composition[name];
                if recipe.is_compartment(entry) {
                    if region.is_surface() {
                        return Err(Error::InvalidRecipe(format!(
                            "compartment '{name}' cannot sit on a surface"
                        )));
                    }
                    let object = entry.object.as_deref().unwrap_or_default();
                    let path = recipe.objects[object].mesh.as_deref().ok_or_else(|| {
                        Error::InvalidRecipe(format!("mesh object '{object}' has no `mesh` path"))
                    })?;
                    let mesh = self.store.read_mesh(path)?;
                    self.compartments.push(CompartmentSpec {
                        name: name.clone(),
                        mesh,
                        parent: owner,
                    });
                    let id = self.compartments.len() as CompartmentId;
                    self.visit_regions(entry, Some(id))
                } else {
                    let object = entry.object.clone().ok_or_else(|| {
                        Error::InvalidRecipe(format!("entry '{name}' has no object"))
                    })?;
                    if !entry.regions.interior.is_empty() || !entry.regions.surface.is_empty() {
                        return Err(Error::InvalidRecipe(format!(
                            "ingredient entry '{name}' cannot own regions"
                        )));
                    }
                    self.pending.push(PendingIngredient {
                        name: name.clone(),
                        object,
                        region,
                        count: entry.count,
                        molarity: entry.molarity,
                        priority: entry.priority,
                    });
                    Ok(())
                }
            }
        }
    }
}
