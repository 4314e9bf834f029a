//! Classification of grid points against compartment meshes.
//!
//! [`tag_grid`] writes `-id` on interior points and `+id` on surface points of each
//! compartment, parents before children so the innermost compartment wins, then
//! seeds the cold-start distance field from the nearest mesh vertex.
use std::collections::VecDeque;
use std::ops::RangeInclusive;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compartment::{Compartment, CompartmentId};
use crate::error::{Error, Result};
use crate::geometry::primitives::{segment_crosses_triangle, triangle_intersects_aabb};
use crate::geometry::BoundingBox;
use crate::grid::{Grid, EXTERIOR};

/// How interior points are found.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsideMethod {
    /// Jordan test with 1 or 3 rays per point.
    RayCast { rays: u8 },
    /// Flood from the lattice boundary, stopping at edges that cross the mesh.
    FloodFill,
}

impl Default for InsideMethod {
    fn default() -> Self {
        Self::RayCast { rays: 3 }
    }
}

/// How surface points are found.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceMethod {
    /// Interior points within half a voxel diagonal of a mesh vertex.
    NearestVertex,
    /// Points whose voxel is pierced by a mesh triangle.
    #[default]
    VoxelPierce,
}

/// Tags every compartment onto `grid` and seeds initial distances.
///
/// `compartments[i]` must carry id `i + 1`, and parents must refer to existing
/// compartments without cycles. On return each compartment's interior and surface
/// index lists reflect the final tags, and the grid's cold-start state is frozen.
pub fn tag_grid(
    grid: &mut Grid,
    compartments: &mut [Compartment],
    inside: InsideMethod,
    surface: SurfaceMethod,
) -> Result<()> {
    if let InsideMethod::RayCast { rays } = inside {
        if rays != 1 && rays != 3 {
            return Err(Error::InvalidConfig(format!(
                "ray cast needs 1 or 3 rays, got {rays}"
            )));
        }
    }
    let order = depth_order(compartments)?;

    for &slot in &order {
        let compartment = &compartments[slot];
        let id = compartment.id() as i32;
        let interior = match inside {
            InsideMethod::RayCast { rays } => ray_cast_interior(grid, compartment, rays),
            InsideMethod::FloodFill => flood_fill_interior(grid, compartment),
        };
        for &p in &interior {
            grid.set_compartment_id(p, -id);
        }
        let surface_points = match surface {
            SurfaceMethod::NearestVertex => nearest_vertex_surface(grid, compartment, &interior),
            SurfaceMethod::VoxelPierce => pierced_voxels(grid, compartment),
        };
        for &p in &surface_points {
            grid.set_compartment_id(p, id);
        }
        debug!(
            compartment = compartment.name(),
            interior = interior.len(),
            surface = surface_points.len(),
            "tagged compartment"
        );
    }

    for compartment in compartments.iter_mut() {
        compartment.interior_point_indices.clear();
        compartment.surface_point_indices.clear();
    }
    for (p, &tag) in grid.compartment_ids().iter().enumerate() {
        if tag == EXTERIOR {
            continue;
        }
        let slot = tag.unsigned_abs() as usize - 1;
        if tag < 0 {
            compartments[slot].interior_point_indices.push(p as u32);
        } else {
            compartments[slot].surface_point_indices.push(p as u32);
        }
    }

    seed_distances(grid, compartments);
    Ok(())
}

/// Lowers every grid distance to the nearest mesh vertex and freezes the result
/// as the grid's cold-start state.
pub fn seed_distances(grid: &mut Grid, compartments: &[Compartment]) {
    for p in 0..grid.len() as u32 {
        let position = grid.position(p);
        for compartment in compartments {
            grid.seed_distance(p, compartment.nearest_vertex_distance(position));
        }
    }
    grid.freeze_initial_state();
}

/// Compartment slots ordered so every parent precedes its children.
fn depth_order(compartments: &[Compartment]) -> Result<Vec<usize>> {
    let n = compartments.len();
    for (slot, c) in compartments.iter().enumerate() {
        if c.id() as usize != slot + 1 {
            return Err(Error::InvalidRecipe(format!(
                "compartment '{}' has id {} at position {}",
                c.name(),
                c.id(),
                slot + 1
            )));
        }
    }
    let mut depth = vec![0usize; n];
    for (slot, c) in compartments.iter().enumerate() {
        let mut hops = 0usize;
        let mut current: Option<CompartmentId> = c.parent();
        while let Some(parent) = current {
            if parent == 0 || parent as usize > n {
                return Err(Error::InvalidRecipe(format!(
                    "compartment '{}' names unknown parent {parent}",
                    c.name()
                )));
            }
            hops += 1;
            if hops > n {
                return Err(Error::InvalidRecipe(format!(
                    "compartment '{}' is part of a nesting cycle",
                    c.name()
                )));
            }
            current = compartments[parent as usize - 1].parent();
        }
        depth[slot] = hops;
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&slot| (depth[slot], slot));
    Ok(order)
}

fn ray_cast_interior(grid: &Grid, compartment: &Compartment, rays: u8) -> Vec<u32> {
    grid.points_in_box(compartment.bounding_box())
        .into_iter()
        .filter(|&p| compartment.contains_point(grid.position(p), rays))
        .collect()
}

/// Sub-lattice of `grid` covering a box, addressed by local x-fastest indices.
struct Patch {
    ranges: [RangeInclusive<usize>; 3],
    dims: [usize; 3],
}

impl Patch {
    fn covering(grid: &Grid, bb: &BoundingBox) -> Option<Self> {
        let spacing = grid.spacing();
        let origin = grid.origin();
        let grid_dims = grid.dims();
        let mut ranges: [RangeInclusive<usize>; 3] = [0..=0, 0..=0, 0..=0];
        let mut dims = [0usize; 3];
        for axis in 0..3 {
            let max = (grid_dims[axis] - 1) as f32;
            let lo = ((bb.min[axis] - origin[axis]) / spacing).floor().clamp(0.0, max);
            let hi = ((bb.max[axis] - origin[axis]) / spacing).ceil().clamp(0.0, max);
            if lo > hi {
                return None;
            }
            ranges[axis] = (lo as usize)..=(hi as usize);
            dims[axis] = hi as usize - lo as usize + 1;
        }
        Some(Self { ranges, dims })
    }

    fn len(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    fn local(&self, i: usize, j: usize, k: usize) -> usize {
        let (i0, j0, k0) = (
            *self.ranges[0].start(),
            *self.ranges[1].start(),
            *self.ranges[2].start(),
        );
        (k - k0) * self.dims[0] * self.dims[1] + (j - j0) * self.dims[0] + (i - i0)
    }

    fn ijk(&self, local: usize) -> [usize; 3] {
        let plane = self.dims[0] * self.dims[1];
        [
            self.ranges[0].start() + local % self.dims[0],
            self.ranges[1].start() + (local % plane) / self.dims[0],
            self.ranges[2].start() + local / plane,
        ]
    }
}

/// Lattice index range of `lo..hi` along `axis`, clipped to the patch.
fn axis_span(
    grid: &Grid,
    patch: &Patch,
    lo: f32,
    hi: f32,
    axis: usize,
) -> Option<RangeInclusive<usize>> {
    let origin = grid.origin()[axis];
    let spacing = grid.spacing();
    let a = ((lo - origin) / spacing).floor().max(0.0) as usize;
    let b = ((hi - origin) / spacing).ceil().max(0.0) as usize;
    let a = a.max(*patch.ranges[axis].start());
    let b = b.min(*patch.ranges[axis].end());
    (a <= b).then_some(a..=b)
}

/// Interior points as the complement of what a flood from the lattice boundary reaches.
///
/// Seeds are boundary points of the patch that lie outside the mesh bounds. A step
/// between 6-neighbours is blocked when the connecting edge touches any triangle.
fn flood_fill_interior(grid: &Grid, compartment: &Compartment) -> Vec<u32> {
    let spacing = grid.spacing();
    let bounds = compartment.bounding_box();
    let Some(patch) = Patch::covering(grid, &bounds.expanded(spacing)) else {
        return Vec::new();
    };
    let n = patch.len();

    // blocked[3·local + axis]: edge from `local` to its +axis neighbour.
    let mut blocked = vec![false; n * 3];
    let mesh = compartment.mesh();
    for fi in 0..mesh.faces.len() {
        let [a, b, c] = mesh.triangle(fi);
        let lo = a.min(b).min(c);
        let hi = a.max(b).max(c);
        let (Some(si), Some(sj), Some(sk)) = (
            axis_span(grid, &patch, lo.x - spacing, hi.x, 0),
            axis_span(grid, &patch, lo.y - spacing, hi.y, 1),
            axis_span(grid, &patch, lo.z - spacing, hi.z, 2),
        ) else {
            continue;
        };
        let spans = [si, sj, sk];
        for k in spans[2].clone() {
            for j in spans[1].clone() {
                for i in spans[0].clone() {
                    let from = grid.position(grid.index_from_ijk(i, j, k));
                    let ijk = [i, j, k];
                    for axis in 0..3 {
                        if ijk[axis] + 1 > *patch.ranges[axis].end() {
                            continue;
                        }
                        let mut to = from;
                        to[axis] += spacing;
                        if segment_crosses_triangle(from, to, a, b, c) {
                            blocked[patch.local(i, j, k) * 3 + axis] = true;
                        }
                    }
                }
            }
        }
    }

    let mut reached = vec![false; n];
    let mut queue = VecDeque::new();
    for local in 0..n {
        let ijk = patch.ijk(local);
        let on_boundary = (0..3).any(|axis| {
            ijk[axis] == *patch.ranges[axis].start() || ijk[axis] == *patch.ranges[axis].end()
        });
        if !on_boundary {
            continue;
        }
        let p = grid.position(grid.index_from_ijk(ijk[0], ijk[1], ijk[2]));
        if !bounds.contains(p, 0.0) {
            reached[local] = true;
            queue.push_back(local);
        }
    }

    while let Some(local) = queue.pop_front() {
        let ijk = patch.ijk(local);
        for axis in 0..3 {
            if ijk[axis] < *patch.ranges[axis].end() {
                let mut next = ijk;
                next[axis] += 1;
                let nl = patch.local(next[0], next[1], next[2]);
                if !reached[nl] && !blocked[local * 3 + axis] {
                    reached[nl] = true;
                    queue.push_back(nl);
                }
            }
            if ijk[axis] > *patch.ranges[axis].start() {
                let mut prev = ijk;
                prev[axis] -= 1;
                let pl = patch.local(prev[0], prev[1], prev[2]);
                if !reached[pl] && !blocked[pl * 3 + axis] {
                    reached[pl] = true;
                    queue.push_back(pl);
                }
            }
        }
    }

    let mut interior: Vec<u32> = (0..n)
        .filter(|&local| !reached[local])
        .map(|local| {
            let [i, j, k] = patch.ijk(local);
            grid.index_from_ijk(i, j, k)
        })
        .collect();
    interior.sort_unstable();
    interior
}

/// Interior points within half a voxel diagonal of a mesh vertex.
fn nearest_vertex_surface(grid: &Grid, compartment: &Compartment, interior: &[u32]) -> Vec<u32> {
    let cutoff = grid.spacing() * 3f32.sqrt() * 0.5;
    interior
        .iter()
        .copied()
        .filter(|&p| compartment.nearest_vertex_distance(grid.position(p)) <= cutoff)
        .collect()
}

/// Points whose voxel (half extent `spacing/2`) is touched by a mesh triangle.
fn pierced_voxels(grid: &Grid, compartment: &Compartment) -> Vec<u32> {
    let half = Vec3::splat(grid.spacing() * 0.5);
    let mesh = compartment.mesh();
    let mut hit = Vec::new();
    for fi in 0..mesh.faces.len() {
        let [a, b, c] = mesh.triangle(fi);
        let bb = BoundingBox::new(a.min(b).min(c) - half, a.max(b).max(c) + half);
        for p in grid.points_in_box(&bb) {
            if triangle_intersects_aabb(grid.position(p), half, a, b, c) {
                hit.push(p);
            }
        }
    }
    hit.sort_unstable();
    hit.dedup();
    hit
}
