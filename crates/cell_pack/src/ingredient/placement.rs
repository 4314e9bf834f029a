//! The placement kernel: one attempt to place one instance at one grid point.
//!
//! An attempt picks a rotation, then tries up to `n_jitter_attempts` jittered
//! centers. Each candidate must stay inside the box, satisfy its region rule, keep
//! clear of foreign compartment walls, pass the multi-level test against the
//! distance field and the exact test against already placed instances. The first
//! candidate that passes is returned with the grid deltas its commit would apply.
//! Nothing is mutated here; committing belongs to the scheduler.
use std::collections::BTreeMap;
use std::f32::consts::TAU;

use glam::{Mat3, Vec3};
use rand::RngCore;

use crate::compartment::Compartment;
use crate::geometry::{rotation_about, rotation_between};
use crate::gradient::Gradient;
use crate::grid::periodic::periodic_images;
use crate::grid::Grid;
use crate::ingredient::shape::{PosedShape, Sphere};
use crate::ingredient::{Ingredient, PackingMode, PlacementRegion};
use crate::packed::PackedObjects;
use crate::sampling::{rand01, sample_jitter, OrientationSampling};

/// Read-only view of the environment an attempt runs against.
#[derive(Clone, Copy)]
pub struct PlacementContext<'a> {
    pub grid: &'a Grid,
    pub compartments: &'a [Compartment],
    pub packed: &'a PackedObjects,
    /// Gradient named by the ingredient's packing mode, if any.
    pub gradient: Option<&'a Gradient>,
    pub orientation: &'a dyn OrientationSampling,
    /// Number of rotations drawn from `orientation` so far in this run.
    pub rotation_index: u64,
    /// Extra reach around each instance over which distances are updated.
    pub padding: f32,
    pub use_periodicity: bool,
}

/// Why a candidate was turned down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    OutOfBounds,
    /// Center or covered grid points outside the ingredient's region.
    Region,
    /// Too close to a compartment surface the ingredient may not cross.
    Wall,
    Collision,
    /// No required partner within reach of the grid point.
    NoPartner,
}

/// Result of [`attempt_placement`].
#[derive(Clone, Debug, PartialEq)]
pub enum PlaceOutcome {
    Accepted {
        position: Vec3,
        rotation: Mat3,
        /// Grid points newly inside the instance, with their (negative) signed distance.
        inside_points: BTreeMap<u32, f32>,
        /// Grid points outside the instance whose distance would decrease.
        new_dist_points: BTreeMap<u32, f32>,
        /// Periodic images of `position` that were tested and must be indexed.
        ghosts: Vec<Vec3>,
    },
    Rejected(RejectReason),
}

impl PlaceOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PlaceOutcome::Accepted { .. })
    }
}

/// Attempts to place `ingredient` around `grid_point`.
///
/// Consumes the RNG in a fixed order: rotation first, then one jitter draw per
/// candidate.
pub fn attempt_placement(
    ingredient: &Ingredient,
    ctx: &PlacementContext<'_>,
    grid_point: u32,
    rng: &mut dyn RngCore,
) -> PlaceOutcome {
    let anchor = ctx.grid.position(grid_point);
    if !partner_nearby(ingredient, ctx, anchor) {
        return PlaceOutcome::Rejected(RejectReason::NoPartner);
    }

    let (rotation, normal) = choose_rotation(ingredient, ctx, anchor, rng);
    let spacing = ctx.grid.spacing();
    let mut last = RejectReason::Collision;
    for _ in 0..ingredient.n_jitter_attempts.max(1) {
        let mut delta = sample_jitter(rng, ingredient.jitter_max, spacing);
        if let Some(n) = normal {
            delta -= n * delta.dot(n);
        }
        match try_pose(ingredient, ctx, anchor + delta, rotation) {
            Ok(outcome) => return outcome,
            Err(reason) => last = reason,
        }
    }
    PlaceOutcome::Rejected(last)
}

/// Rotation for this attempt, plus the membrane normal for surface ingredients.
fn choose_rotation(
    ingredient: &Ingredient,
    ctx: &PlacementContext<'_>,
    anchor: Vec3,
    rng: &mut dyn RngCore,
) -> (Mat3, Option<Vec3>) {
    if let PlacementRegion::Surface(k) = ingredient.region {
        if let Some(compartment) = ctx.compartments.get((k as usize).wrapping_sub(1)) {
            let normal = compartment
                .nearest_surface_normal(anchor)
                .try_normalize()
                .unwrap_or(Vec3::Z);
            let align = rotation_between(ingredient.principal_vector, normal);
            let spin = rotation_about(normal, rand01(rng) * TAU);
            return (spin * align, Some(normal));
        }
    }
    if ingredient.use_rotation_axis {
        let angle = rand01(rng) * ingredient.rotation_range;
        return (rotation_about(ingredient.rotation_axis, angle), None);
    }
    if let (PackingMode::Gradient(_), Some(gradient)) = (&ingredient.packing_mode, ctx.gradient) {
        if let Some(dir) = gradient.direction_at(anchor, ctx.compartments) {
            return (rotation_between(ingredient.principal_vector, dir), None);
        }
    }
    let q = ctx.orientation.sample(ctx.rotation_index, rng);
    (Mat3::from_quat(q), None)
}

fn partner_nearby(ingredient: &Ingredient, ctx: &PlacementContext<'_>, anchor: Vec3) -> bool {
    if ingredient.partner_ids.is_empty() {
        return true;
    }
    let reach = ingredient.encapsulating_radius() + ctx.packed.max_radius();
    ctx.packed
        .ball_query(anchor, reach)
        .iter()
        .any(|n| ingredient.partner_ids.contains(&ctx.packed.ingredient_ref(n.index)))
}

fn try_pose(
    ingredient: &Ingredient,
    ctx: &PlacementContext<'_>,
    center: Vec3,
    rotation: Mat3,
) -> Result<PlaceOutcome, RejectReason> {
    let grid = ctx.grid;
    let radius = ingredient.encapsulating_radius();
    let margin = if ctx.use_periodicity {
        0.0
    } else {
        radius + ingredient.cutoff_boundary
    };
    if !grid.inside_bounds(center, margin) {
        return Err(RejectReason::OutOfBounds);
    }
    if !center_in_region(ingredient, ctx, center) {
        return Err(RejectReason::Region);
    }

    let posed = PosedShape::new(&ingredient.shape, center, rotation);
    let covering = posed.covering_spheres();
    if crosses_wall(ingredient, ctx, center, &covering) {
        return Err(RejectReason::Wall);
    }

    let ghosts = if ctx.use_periodicity {
        periodic_images(center, grid.domain(), radius + ingredient.cutoff_boundary)
    } else {
        Vec::new()
    };

    let mut poses = Vec::with_capacity(1 + ghosts.len());
    poses.push((posed, covering));
    for &image in &ghosts {
        let ghost = posed.translated_to(image);
        let cover = ghost.covering_spheres();
        poses.push((ghost, cover));
    }

    let surface = ingredient.region.is_surface();
    for (pose, cover) in &poses {
        if !surface && grid_collides(ctx, pose, radius) {
            return Err(RejectReason::Collision);
        }
        if packed_collides(ctx, cover, pose.position, radius) {
            return Err(RejectReason::Collision);
        }
    }

    let mut inside_points = BTreeMap::new();
    let mut new_dist_points = BTreeMap::new();
    for (pose, _) in &poses {
        collect_deltas(
            ingredient,
            ctx,
            pose,
            radius,
            &mut inside_points,
            &mut new_dist_points,
        )?;
    }

    Ok(PlaceOutcome::Accepted {
        position: center,
        rotation,
        inside_points,
        new_dist_points,
        ghosts,
    })
}

/// Region rule on the center's nearest grid point.
fn center_in_region(ingredient: &Ingredient, ctx: &PlacementContext<'_>, center: Vec3) -> bool {
    let grid = ctx.grid;
    let tag = grid.compartment_id(grid.index_from_point(center));
    if tag != ingredient.region.code() {
        return false;
    }
    if let PlacementRegion::Surface(k) = ingredient.region {
        let Some(compartment) = ctx.compartments.get((k as usize).wrapping_sub(1)) else {
            return false;
        };
        let cutoff = ingredient.cutoff_surface.unwrap_or(grid.spacing());
        return compartment.nearest_surface_distance(center) <= cutoff;
    }
    true
}

/// True when a covering sphere pokes through a compartment surface other than the
/// surface the ingredient sits on.
fn crosses_wall(
    ingredient: &Ingredient,
    ctx: &PlacementContext<'_>,
    center: Vec3,
    covering: &[Sphere],
) -> bool {
    let own_surface = match ingredient.region {
        PlacementRegion::Surface(k) => Some(k),
        _ => None,
    };
    let radius = ingredient.encapsulating_radius();
    ctx.compartments.iter().any(|compartment| {
        if Some(compartment.id()) == own_surface {
            return false;
        }
        if compartment.bounding_box().distance_to(center) > radius {
            return false;
        }
        covering
            .iter()
            .any(|s| compartment.nearest_surface_distance(s.center) < s.radius)
    })
}

/// Multi-level test against the distance field.
///
/// A grid point `p` collides at a level when `distance[p] + sd_level(p) <= 0`. A clean
/// level accepts; a collision descends, and a collision at the deepest level rejects.
fn grid_collides(ctx: &PlacementContext<'_>, pose: &PosedShape<'_>, radius: f32) -> bool {
    let grid = ctx.grid;
    let candidates = grid.points_in_sphere(pose.position, radius + ctx.padding);
    let levels = pose.shape.level_count();
    for level in 0..levels {
        let hit = candidates.iter().any(|&p| {
            grid.distance(p) + pose.level_signed_distance(level, grid.position(p)) <= 0.0
        });
        if !hit {
            return false;
        }
    }
    true
}

/// Exact sphere-cover test against indexed instances and their periodic ghosts.
fn packed_collides(
    ctx: &PlacementContext<'_>,
    covering: &[Sphere],
    center: Vec3,
    radius: f32,
) -> bool {
    let packed = ctx.packed;
    if packed.is_empty() {
        return false;
    }
    packed
        .ball_query(center, radius + packed.max_radius())
        .into_iter()
        .filter(|n| n.distance < radius + packed.encapsulating_radius(n.index))
        .any(|n| {
            let theirs = packed.covering_spheres(n.index);
            covering
                .iter()
                .any(|a| theirs.iter().any(|b| a.overlaps(b)))
        })
}

/// Inside and distance deltas over the padded ball; also enforces the per-point
/// region rule (occupancy for surface ingredients).
fn collect_deltas(
    ingredient: &Ingredient,
    ctx: &PlacementContext<'_>,
    pose: &PosedShape<'_>,
    radius: f32,
    inside_points: &mut BTreeMap<u32, f32>,
    new_dist_points: &mut BTreeMap<u32, f32>,
) -> Result<(), RejectReason> {
    let grid = ctx.grid;
    let surface = ingredient.region.is_surface();
    let code = ingredient.region.code();
    for p in grid.points_in_sphere(pose.position, radius + ctx.padding) {
        let sd = pose.signed_distance(grid.position(p));
        if sd < 0.0 {
            if surface {
                if !grid.is_free(p) {
                    return Err(RejectReason::Collision);
                }
            } else if grid.compartment_id(p) != code {
                return Err(RejectReason::Region);
            }
            let slot = inside_points.entry(p).or_insert(sd);
            *slot = slot.min(sd);
        } else if sd < grid.distance(p) {
            let slot = new_dist_points.entry(p).or_insert(sd);
            *slot = slot.min(sd);
        }
    }
    // A point inside one pose and outside another stays inside.
    new_dist_points.retain(|p, _| !inside_points.contains_key(p));
    Ok(())
}
