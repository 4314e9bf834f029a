//! The main packing loop.
//!
//! A [`PackRun`] borrows an [`Environment`] mutably for the length of one run.
//! Each [`PackRun::step`] picks an ingredient, picks one of its allowed grid
//! points, attempts a placement there and commits it on success. The RNG is
//! consumed in a fixed order (ingredient, point, rotation, jitter), so a seed
//! fully determines the run.
use std::collections::BTreeMap;

use glam::{Mat3, Vec3};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info};

use crate::ingredient::placement::{attempt_placement, PlaceOutcome, PlacementContext, RejectReason};
use crate::ingredient::{IngredientId, PackingMode, PosedShape};
use crate::pack::config::PlaceMethod;
use crate::pack::environment::Environment;
use crate::pack::events::{EventSink, PackEvent, PackEventKind};
use crate::pack::priority::PriorityTable;
use crate::pack::result::{PackResult, PackedInstance};
use crate::pack::CancellationFlag;
use crate::packed::InstanceId;
use crate::sampling::{rand01, OrientationSampling};

/// Why a run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Every ingredient left the active set.
    AllComplete,
    NoFreePoints,
    Cancelled,
    /// `max_iterations` reached.
    IterationLimit,
}

/// Outcome of one scheduler iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Step {
    Placed {
        ingredient: IngredientId,
        instance: InstanceId,
    },
    Rejected {
        ingredient: IngredientId,
        reason: RejectReason,
    },
    /// The ingredient had no allowed grid point left.
    Exhausted(IngredientId),
    Stopped(StopReason),
}

/// One packing run over a borrowed environment.
pub struct PackRun<'e> {
    env: &'e mut Environment,
    seed: u64,
    rng: StdRng,
    orientation: Box<dyn OrientationSampling>,
    table: PriorityTable,
    rotation_index: u64,
    iterations: usize,
    stopped: Option<StopReason>,
}

impl<'e> PackRun<'e> {
    /// Resets `env` and seeds a fresh RNG and orientation sampler.
    pub(crate) fn new(env: &'e mut Environment, seed: u64) -> Self {
        env.reset();
        let table = PriorityTable::build(&env.ingredients);
        let orientation = env.config.orientation.sampler();
        Self {
            env,
            seed,
            rng: StdRng::seed_from_u64(seed),
            orientation,
            table,
            rotation_index: 0,
            iterations: 0,
            stopped: None,
        }
    }

    pub fn environment(&self) -> &Environment {
        &*self.env
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stopped
    }

    /// Current selection table.
    pub fn priorities(&self) -> &PriorityTable {
        &self.table
    }

    /// Runs until a stop condition, checking `cancel` before every iteration.
    pub fn run(mut self, sink: &mut dyn EventSink, cancel: &CancellationFlag) -> PackResult {
        info!(
            seed = self.seed,
            ingredients = self.env.ingredients.len(),
            grid_points = self.env.grid.len(),
            "packing started"
        );
        if sink.wants(PackEventKind::RunStarted) {
            sink.send(PackEvent::RunStarted {
                seed: self.seed,
                config: self.env.config.clone(),
                ingredient_count: self.env.ingredients.len(),
                grid_points: self.env.grid.len(),
            });
        }
        if sink.wants(PackEventKind::Warning) {
            for w in &self.env.warnings {
                sink.send(PackEvent::Warning {
                    context: w.context.clone(),
                    message: w.message.clone(),
                });
            }
        }
        loop {
            if cancel.is_cancelled() {
                self.stop(StopReason::Cancelled);
                break;
            }
            if let Step::Stopped(_) = self.step(sink) {
                break;
            }
        }
        self.finish(sink)
    }

    /// Performs one scheduler iteration.
    pub fn step(&mut self, sink: &mut dyn EventSink) -> Step {
        if let Some(reason) = self.stopped {
            return Step::Stopped(reason);
        }
        if self
            .env
            .config
            .max_iterations
            .is_some_and(|limit| self.iterations >= limit)
        {
            return self.stop(StopReason::IterationLimit);
        }
        if self.env.grid.n_free() == 0 {
            return self.stop(StopReason::NoFreePoints);
        }
        let Some(id) = self.table.pick(rand01(&mut self.rng)) else {
            return self.stop(StopReason::AllComplete);
        };
        self.iterations += 1;

        let allowed = allowed_points(self.env, id);
        if allowed.is_empty() {
            let ingredient = &mut self.env.ingredients[id];
            ingredient.mark_exhausted();
            info!(
                ingredient = %ingredient.name,
                placed = ingredient.placed_count(),
                target = ingredient.target_count,
                "ingredient exhausted: no allowed grid point left"
            );
            self.ingredient_done(id, sink);
            return Step::Exhausted(id);
        }
        let grid_point = pick_point(self.env, id, &allowed, &mut self.rng);

        let outcome = {
            let env = &*self.env;
            let ctx = PlacementContext {
                grid: &env.grid,
                compartments: &env.compartments,
                packed: &env.packed,
                gradient: env.gradient_refs[id].map(|g| &env.gradients[g]),
                orientation: self.orientation.as_ref(),
                rotation_index: self.rotation_index,
                padding: env.padding,
                use_periodicity: env.config.use_periodicity,
            };
            match env.config.place_method {
                PlaceMethod::Jitter => {
                    attempt_placement(&env.ingredients[id], &ctx, grid_point, &mut self.rng)
                }
            }
        };
        self.rotation_index += 1;

        match outcome {
            PlaceOutcome::Accepted {
                position,
                rotation,
                inside_points,
                new_dist_points,
                ghosts,
            } => {
                let instance = self.commit(
                    id,
                    grid_point,
                    position,
                    rotation,
                    &inside_points,
                    &new_dist_points,
                    &ghosts,
                    sink,
                );
                Step::Placed {
                    ingredient: id,
                    instance,
                }
            }
            PlaceOutcome::Rejected(reason) => {
                if sink.wants(PackEventKind::AttemptRejected) {
                    sink.send(PackEvent::AttemptRejected {
                        ingredient: id,
                        grid_point,
                        position: self.env.grid.position(grid_point),
                        reason,
                    });
                }
                let ingredient = &mut self.env.ingredients[id];
                if ingredient.record_rejection() {
                    debug!(
                        ingredient = %ingredient.name,
                        placed = ingredient.placed_count(),
                        rejections = ingredient.rejection_counter(),
                        "rejection threshold reached"
                    );
                    self.ingredient_done(id, sink);
                }
                Step::Rejected {
                    ingredient: id,
                    reason,
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn commit(
        &mut self,
        id: IngredientId,
        grid_point: u32,
        position: Vec3,
        rotation: Mat3,
        inside_points: &BTreeMap<u32, f32>,
        new_dist_points: &BTreeMap<u32, f32>,
        ghosts: &[Vec3],
        sink: &mut dyn EventSink,
    ) -> InstanceId {
        let env = &mut *self.env;
        env.grid.update_distances(inside_points, new_dist_points);

        let instance_id = env.instances.len();
        let ingredient = &env.ingredients[id];
        let radius = ingredient.encapsulating_radius();
        let posed = PosedShape::new(&ingredient.shape, position, rotation);
        env.packed
            .insert(position, radius, id, instance_id, false, posed.covering_spheres());
        for &image in ghosts {
            let cover = posed.translated_to(image).covering_spheres();
            env.packed.insert(image, radius, id, instance_id, true, cover);
        }

        let instance = PackedInstance {
            id: instance_id,
            ingredient_id: id,
            position,
            rotation,
            grid_point,
            rank: self.iterations,
        };
        env.instances.push(instance.clone());
        let filled = env.ingredients[id].record_placement(position);
        if sink.wants(PackEventKind::PlacementMade) {
            sink.send(PackEvent::PlacementMade { instance });
        }

        let committed = env.instances.len();
        if committed % env.config.progress_interval == 0 {
            let placed: u64 = env.ingredients.iter().map(|i| i.placed_count() as u64).sum();
            let target: u64 = env.ingredients.iter().map(|i| i.target_count as u64).sum();
            if env.config.show_progress {
                info!(placed, target, free_points = env.grid.n_free(), "packing progress");
            }
            if sink.wants(PackEventKind::Progress) {
                sink.send(PackEvent::Progress {
                    placed,
                    target,
                    free_points: env.grid.n_free(),
                });
            }
        }

        if filled {
            self.ingredient_done(id, sink);
        }
        instance_id
    }

    /// Drops a no longer active ingredient from the selection table.
    fn ingredient_done(&mut self, id: IngredientId, sink: &mut dyn EventSink) {
        self.table = PriorityTable::build(&self.env.ingredients);
        let ingredient = &self.env.ingredients[id];
        debug!(
            ingredient = %ingredient.name,
            completion = ?ingredient.completion(),
            remaining = self.table.len(),
            "ingredient completed"
        );
        if sink.wants(PackEventKind::IngredientCompleted) {
            sink.send(PackEvent::IngredientCompleted {
                ingredient: id,
                name: ingredient.name.clone(),
                completion: ingredient.completion(),
                placed: ingredient.placed_count(),
                target: ingredient.target_count,
            });
        }
    }

    fn stop(&mut self, reason: StopReason) -> Step {
        if self.stopped.is_none() {
            debug!(?reason, iterations = self.iterations, "packing loop stopped");
            self.stopped = Some(reason);
        }
        Step::Stopped(reason)
    }

    /// Ends the run and reports its result.
    pub fn finish(self, sink: &mut dyn EventSink) -> PackResult {
        let cancelled = self.stopped == Some(StopReason::Cancelled);
        let result = self.env.result(self.seed, self.iterations, cancelled);
        if result.is_complete() {
            info!(
                placed = result.placed_total(),
                iterations = result.iterations,
                free_points = result.free_points,
                "packing complete"
            );
        } else {
            let unmet: Vec<&str> = result
                .ingredients
                .iter()
                .filter(|r| r.placed_count < r.target_count)
                .map(|r| r.name.as_str())
                .collect();
            info!(
                placed = result.placed_total(),
                target = result.target_total(),
                ?unmet,
                cancelled,
                "packing incomplete"
            );
        }
        if sink.wants(PackEventKind::RunFinished) {
            sink.send(PackEvent::RunFinished {
                result: result.clone(),
            });
        }
        result
    }
}

/// Free grid points where `id` could be centered: right region tag, enough
/// clearance in the distance field and far enough from the box faces.
///
/// Clearance and margin are relaxed by the jitter reach, since the jitter can
/// still move the center into a valid pose.
fn allowed_points(env: &Environment, id: IngredientId) -> Vec<u32> {
    let grid = &env.grid;
    let ingredient = &env.ingredients[id];
    let radius = ingredient.encapsulating_radius();
    let reach = ingredient.jitter_reach(grid.spacing());
    let clearance = if ingredient.region.is_surface() {
        f32::NEG_INFINITY
    } else {
        (radius - reach).max(0.0)
    };
    let margin = if env.config.use_periodicity {
        0.0
    } else {
        (radius + ingredient.cutoff_boundary - reach).max(0.0)
    };
    let code = ingredient.region.code();
    grid.free_points()
        .iter()
        .copied()
        .filter(|&p| {
            grid.compartment_id(p) == code
                && grid.distance(p) >= clearance
                && grid.inside_bounds(grid.position(p), margin)
        })
        .collect()
}

/// Picks the grid point for this attempt according to the packing mode.
///
/// Close mode takes the band point nearest the last placement only while the
/// ingredient has no pending rejection. After a rejection it draws uniformly from
/// the band, so a blocked nearest point is not retried until the threshold.
fn pick_point(env: &Environment, id: IngredientId, allowed: &[u32], rng: &mut dyn RngCore) -> u32 {
    let ingredient = &env.ingredients[id];
    match &ingredient.packing_mode {
        PackingMode::Random => pick_uniform(allowed, rng),
        PackingMode::Close => {
            let grid = &env.grid;
            let reach = ingredient.jitter_reach(grid.spacing());
            let radius = ingredient.encapsulating_radius();
            let band_limit = (radius - reach).max(0.0) + radius;
            let band: Vec<u32> = allowed
                .iter()
                .copied()
                .filter(|&p| grid.distance(p) <= band_limit)
                .collect();
            let pool = if band.is_empty() { allowed } else { &band };
            match ingredient.last_position() {
                Some(last) if ingredient.rejection_counter() == 0 => pool
                    .iter()
                    .copied()
                    .min_by(|&a, &b| {
                        grid.position(a)
                            .distance_squared(last)
                            .total_cmp(&grid.position(b).distance_squared(last))
                    })
                    .unwrap_or_else(|| pick_uniform(pool, rng)),
                _ => pick_uniform(pool, rng),
            }
        }
        PackingMode::Gradient(_) => env.gradient_refs[id]
            .and_then(|g| env.gradients[g].pick_point(allowed, rng))
            .unwrap_or_else(|| pick_uniform(allowed, rng)),
    }
}

fn pick_uniform(allowed: &[u32], rng: &mut dyn RngCore) -> u32 {
    let slot = (rand01(rng) * allowed.len() as f32) as usize;
    allowed[slot.min(allowed.len() - 1)]
}

impl std::fmt::Debug for PackRun<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackRun")
            .field("seed", &self.seed)
            .field("iterations", &self.iterations)
            .field("rotation_index", &self.rotation_index)
            .field("active", &self.table.len())
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}
