#![forbid(unsafe_code)]
//! cell_pack: stochastic packing of ingredient recipes into nested mesh compartments.
//!
//! Modules:
//! - geometry: bounding boxes, closed triangle meshes and intersection primitives
//! - grid: the regular lattice with compartment tags, distance field and free-point set
//! - compartment: mesh compartments, inside/surface grid tagging
//! - ingredient: shapes, abundance targets and the placement kernel
//! - packed: spatial index over placed instances
//! - gradient: weight fields that bias point selection
//! - recipe: serde recipe model and mesh stores
//! - pack: environment, scheduler, events and results
//!
//! For examples, see the `cell_pack_examples` crate.
pub mod compartment;
pub mod error;
pub mod geometry;
pub mod gradient;
pub mod grid;
pub mod ingredient;
pub mod pack;
pub mod packed;
pub mod recipe;
pub mod sampling;

/// Convenient re-exports for common types. Import with `use cell_pack::prelude::*;`.
pub mod prelude {
    pub use crate::compartment::{tag_grid, Compartment, CompartmentId, InsideMethod, SurfaceMethod};
    pub use crate::error::{Error, Result};
    pub use crate::geometry::{BoundingBox, Mesh, SurfaceHit};
    pub use crate::gradient::{Gradient, GradientMode, WeightSelection};
    pub use crate::grid::cache::{GridCache, GridCacheKey};
    pub use crate::grid::{Grid, GridStyle, EXTERIOR};
    pub use crate::ingredient::placement::RejectReason;
    pub use crate::ingredient::{
        attempt_placement, Completion, Ingredient, IngredientId, PackingMode, PlaceOutcome,
        PlacementContext, PlacementRegion, PosedShape, Shape, Sphere,
    };
    pub use crate::pack::events::{
        AsEventSink, EventSink, FnSink, MultiSink, PackEvent, PackEventKind, VecSink,
    };
    pub use crate::pack::{
        BuildWarning, CancellationFlag, Environment, EnvironmentBuilder, IngredientReport, JsonWriter,
        OrientationMethod, PackConfig, PackRun, PackResult, PackedInstance, PlaceMethod,
        PriorityTable, Step, StopReason, Writer,
    };
    pub use crate::packed::{InstanceId, PackedObjects};
    pub use crate::recipe::{
        molarity_to_count, GradientSpec, InMemoryMeshStore, JsonMeshStore, MeshStore, Recipe,
    };
    pub use crate::sampling::{HaltonOrientation, OrientationSampling, UniformRandomOrientation};
}
