//! Regular 3D lattice carrying compartment tags, the distance field and the free-point set.
//!
//! Points are stored x-fastest: `index(i, j, k) = k·nx·ny + j·nx + i`. The free set is a
//! swap-remove permutation: `free_points[..n_free]` holds exactly the free indices and
//! `free_slots[p]` records where `p` currently sits, so membership flips in O(1).
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::BoundingBox;

pub mod cache;
pub mod periodic;

/// Compartment tag of a grid point outside every compartment.
pub const EXTERIOR: i32 = 0;

/// How the lattice relates to the packing box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridStyle {
    /// Lattice starts at `min` and covers the box.
    #[default]
    Linspace,
    /// Lattice extended by one spacing beyond each face.
    Cover,
}

/// The packing lattice.
#[derive(Clone, Debug)]
pub struct Grid {
    domain: BoundingBox,
    origin: Vec3,
    spacing: f32,
    dims: [usize; 3],
    style: GridStyle,
    positions: Vec<Vec3>,
    compartment_ids: Vec<i32>,
    distances: Vec<f32>,
    initial_distances: Vec<f32>,
    free_points: Vec<u32>,
    free_slots: Vec<u32>,
    n_free: usize,
}

impl Grid {
    /// Builds the lattice over `domain` with the given spacing and style.
    ///
    /// An axis whose extent does not exceed `spacing` collapses to a single layer
    /// at its mid-plane.
    pub fn new(domain: BoundingBox, spacing: f32, style: GridStyle) -> Result<Self> {
        if !spacing.is_finite() || spacing <= 0.0 {
            return Err(Error::InvalidGrid(format!(
                "spacing must be finite and > 0, got {spacing}"
            )));
        }
        if !domain.min.is_finite() || !domain.max.is_finite() || domain.min.cmpgt(domain.max).any()
        {
            return Err(Error::InvalidGrid(format!(
                "invalid grid bounds {:?}..{:?}",
                domain.min, domain.max
            )));
        }

        let mut origin = Vec3::ZERO;
        let mut dims = [0usize; 3];
        for axis in 0..3 {
            let (o, n) = axis_layout(domain.min[axis], domain.max[axis], spacing, style);
            origin[axis] = o;
            dims[axis] = n;
        }
        let total = dims[0]
            .checked_mul(dims[1])
            .and_then(|v| v.checked_mul(dims[2]))
            .filter(|&n| n <= u32::MAX as usize)
            .ok_or_else(|| {
                Error::InvalidGrid(format!("lattice {dims:?} exceeds u32 indexing"))
            })?;

        let mut positions = Vec::with_capacity(total);
        for k in 0..dims[2] {
            for j in 0..dims[1] {
                for i in 0..dims[0] {
                    positions.push(origin + Vec3::new(i as f32, j as f32, k as f32) * spacing);
                }
            }
        }

        let diagonal = domain.diagonal();
        Ok(Self {
            domain,
            origin,
            spacing,
            dims,
            style,
            positions,
            compartment_ids: vec![EXTERIOR; total],
            distances: vec![diagonal; total],
            initial_distances: vec![diagonal; total],
            free_points: (0..total as u32).collect(),
            free_slots: (0..total as u32).collect(),
            n_free: total,
        })
    }

    pub fn domain(&self) -> &BoundingBox {
        &self.domain
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn spacing(&self) -> f32 {
        self.spacing
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn style(&self) -> GridStyle {
        self.style
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    #[inline]
    pub fn position(&self, index: u32) -> Vec3 {
        self.positions[index as usize]
    }

    pub fn compartment_ids(&self) -> &[i32] {
        &self.compartment_ids
    }

    #[inline]
    pub fn compartment_id(&self, index: u32) -> i32 {
        self.compartment_ids[index as usize]
    }

    pub(crate) fn set_compartment_id(&mut self, index: u32, id: i32) {
        self.compartment_ids[index as usize] = id;
    }

    pub fn distances(&self) -> &[f32] {
        &self.distances
    }

    #[inline]
    pub fn distance(&self, index: u32) -> f32 {
        self.distances[index as usize]
    }

    /// Cold-start distance field captured by [`Grid::freeze_initial_state`].
    pub fn initial_distances(&self) -> &[f32] {
        &self.initial_distances
    }

    #[inline]
    pub fn index_from_ijk(&self, i: usize, j: usize, k: usize) -> u32 {
        (k * self.dims[0] * self.dims[1] + j * self.dims[0] + i) as u32
    }

    #[inline]
    pub fn ijk_from_index(&self, index: u32) -> (usize, usize, usize) {
        let u = index as usize;
        let plane = self.dims[0] * self.dims[1];
        let k = u / plane;
        let rem = u % plane;
        (rem % self.dims[0], rem / self.dims[0], k)
    }

    /// Nearest lattice index; out-of-range coordinates are clamped per axis.
    pub fn index_from_point(&self, p: Vec3) -> u32 {
        let rel = (p - self.origin) / self.spacing;
        let mut ijk = [0usize; 3];
        for axis in 0..3 {
            let max = (self.dims[axis] - 1) as f32;
            ijk[axis] = rel[axis].round().clamp(0.0, max) as usize;
        }
        self.index_from_ijk(ijk[0], ijk[1], ijk[2])
    }

    /// True when `p` lies inside the packing box shrunk by `margin`.
    pub fn inside_bounds(&self, p: Vec3, margin: f32) -> bool {
        self.domain.contains(p, margin)
    }

    /// Per-axis index ranges of lattice points inside `bb`, or `None` when empty.
    fn index_ranges(&self, bb: &BoundingBox) -> Option<[RangeInclusive<usize>; 3]> {
        let mut ranges: [RangeInclusive<usize>; 3] = [0..=0, 0..=0, 0..=0];
        for axis in 0..3 {
            let lo = ((bb.min[axis] - self.origin[axis]) / self.spacing).ceil();
            let hi = ((bb.max[axis] - self.origin[axis]) / self.spacing).floor();
            let max = (self.dims[axis] - 1) as f32;
            if hi < 0.0 || lo > max || lo > hi {
                return None;
            }
            ranges[axis] = (lo.max(0.0) as usize)..=(hi.min(max) as usize);
        }
        Some(ranges)
    }

    /// Lattice points inside the closed box `bb`, by integer index sweep.
    pub fn points_in_box(&self, bb: &BoundingBox) -> Vec<u32> {
        let Some([ri, rj, rk]) = self.index_ranges(bb) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for k in rk {
            for j in rj.clone() {
                for i in ri.clone() {
                    out.push(self.index_from_ijk(i, j, k));
                }
            }
        }
        out
    }

    /// Calls `f(index, distance_to_center)` for every lattice point in the closed ball.
    ///
    /// Points are visited in ascending index order.
    pub fn for_each_point_in_sphere(&self, center: Vec3, radius: f32, mut f: impl FnMut(u32, f32)) {
        let bb = BoundingBox::new(center - Vec3::splat(radius), center + Vec3::splat(radius));
        let Some([ri, rj, rk]) = self.index_ranges(&bb) else {
            return;
        };
        let r2 = radius * radius;
        for k in rk {
            for j in rj.clone() {
                for i in ri.clone() {
                    let index = self.index_from_ijk(i, j, k);
                    let d2 = self.positions[index as usize].distance_squared(center);
                    if d2 <= r2 {
                        f(index, d2.sqrt());
                    }
                }
            }
        }
    }

    /// Lattice points within `radius` of `center`.
    ///
    /// Sweeps the integer index box around the ball instead of querying a tree over
    /// `positions`; on a regular lattice the result is the same ball query.
    pub fn points_in_sphere(&self, center: Vec3, radius: f32) -> Vec<u32> {
        let mut out = Vec::new();
        self.for_each_point_in_sphere(center, radius, |index, _| out.push(index));
        out
    }

    /// 6-connected neighbours of a point.
    pub fn neighbours(&self, index: u32) -> impl Iterator<Item = u32> + '_ {
        let (i, j, k) = self.ijk_from_index(index);
        let [nx, ny, nz] = self.dims;
        let candidates = [
            (i > 0).then(|| (i - 1, j, k)),
            (i + 1 < nx).then(|| (i + 1, j, k)),
            (j > 0).then(|| (i, j - 1, k)),
            (j + 1 < ny).then(|| (i, j + 1, k)),
            (k > 0).then(|| (i, j, k - 1)),
            (k + 1 < nz).then(|| (i, j, k + 1)),
        ];
        candidates
            .into_iter()
            .flatten()
            .map(move |(a, b, c)| self.index_from_ijk(a, b, c))
    }

    pub fn n_free(&self) -> usize {
        self.n_free
    }

    /// Currently free indices, in permutation order.
    pub fn free_points(&self) -> &[u32] {
        &self.free_points[..self.n_free]
    }

    /// Indices removed from the free set.
    pub fn used_points(&self) -> &[u32] {
        &self.free_points[self.n_free..]
    }

    #[inline]
    pub fn is_free(&self, index: u32) -> bool {
        (self.free_slots[index as usize] as usize) < self.n_free
    }

    /// Removes `index` from the free set. Returns `false` if it was already used.
    pub fn free_points_mark_used(&mut self, index: u32) -> bool {
        let slot = self.free_slots[index as usize] as usize;
        if slot >= self.n_free {
            return false;
        }
        let last = self.n_free - 1;
        self.swap_slots(slot, last);
        self.n_free -= 1;
        true
    }

    /// Returns `index` to the free set. Returns `false` if it was already free.
    pub fn free_points_unmark(&mut self, index: u32) -> bool {
        let slot = self.free_slots[index as usize] as usize;
        if slot < self.n_free {
            return false;
        }
        let first_used = self.n_free;
        self.swap_slots(slot, first_used);
        self.n_free += 1;
        true
    }

    fn swap_slots(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.free_points.swap(a, b);
        self.free_slots[self.free_points[a] as usize] = a as u32;
        self.free_slots[self.free_points[b] as usize] = b as u32;
    }

    /// Applies the deltas of an accepted placement.
    ///
    /// Every `(p, d)` in `inside` leaves the free set and takes `distance = d`; every
    /// `(p, d)` in `new_dist` not in `inside` takes `min(distance, d)`. Returns the new
    /// free count.
    pub fn update_distances(
        &mut self,
        inside: &BTreeMap<u32, f32>,
        new_dist: &BTreeMap<u32, f32>,
    ) -> usize {
        for (&p, &d) in inside {
            self.free_points_mark_used(p);
            let slot = &mut self.distances[p as usize];
            *slot = slot.min(d);
        }
        for (&p, &d) in new_dist {
            if inside.contains_key(&p) {
                continue;
            }
            let slot = &mut self.distances[p as usize];
            if d < *slot {
                *slot = d;
            }
        }
        self.n_free
    }

    /// Lowers the distance at `index` to `d` if smaller.
    pub(crate) fn seed_distance(&mut self, index: u32, d: f32) {
        let slot = &mut self.distances[index as usize];
        if d < *slot {
            *slot = d;
        }
    }

    /// Records the current distance field as the cold-start state restored by [`Grid::reset`].
    pub(crate) fn freeze_initial_state(&mut self) {
        self.initial_distances.clone_from(&self.distances);
    }

    /// Restores the cold-start distances and frees every point.
    pub fn reset(&mut self) {
        self.distances.clone_from(&self.initial_distances);
        let total = self.positions.len() as u32;
        self.free_points = (0..total).collect();
        self.free_slots = (0..total).collect();
        self.n_free = self.positions.len();
    }

    /// Replaces tags and cold-start distances wholesale (grid cache restore).
    pub(crate) fn restore_tags(&mut self, compartment_ids: Vec<i32>, distances: Vec<f32>) {
        debug_assert_eq!(compartment_ids.len(), self.len());
        debug_assert_eq!(distances.len(), self.len());
        self.compartment_ids = compartment_ids;
        self.initial_distances.clone_from(&distances);
        self.distances = distances;
    }

    /// True when the free/used halves of the permutation partition `0..N` and the
    /// slot table agrees with it.
    pub fn free_partition_is_consistent(&self) -> bool {
        let mut seen = vec![false; self.positions.len()];
        for (slot, &p) in self.free_points.iter().enumerate() {
            let p = p as usize;
            if p >= seen.len() || seen[p] || self.free_slots[p] as usize != slot {
                return false;
            }
            seen[p] = true;
        }
        seen.into_iter().all(|s| s)
    }
}

fn axis_layout(lo: f32, hi: f32, spacing: f32, style: GridStyle) -> (f32, usize) {
    let extent = hi - lo;
    if extent <= spacing {
        return ((lo + hi) * 0.5, 1);
    }
    let cells = (extent / spacing).ceil() as usize;
    match style {
        GridStyle::Linspace => (lo, cells + 1),
        GridStyle::Cover => (lo - spacing, cells + 3),
    }
}
