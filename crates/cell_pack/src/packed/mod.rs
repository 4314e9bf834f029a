//! Spatial index over placed instances.
//!
//! Centers live in an immutable k-d tree covering the first `indexed` entries;
//! entries inserted since the last rebuild sit in a short tail that queries scan
//! linearly. While the index holds fewer than `bulk_threshold` entries it is
//! rebuilt on every insert, afterwards once the tail reaches `rebuild_every`.
use glam::Vec3;
use kiddo::{ImmutableKdTree, SquaredEuclidean};

use crate::ingredient::{IngredientId, Sphere};

/// Position of an instance in the authoritative result list.
pub type InstanceId = usize;

/// Query hit: entry index and Euclidean center distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbour {
    pub index: usize,
    pub distance: f32,
}

/// k-d tree over instance centers with parallel per-entry arrays.
pub struct PackedObjects {
    positions: Vec<Vec3>,
    encapsulating_radii: Vec<f32>,
    ingredient_refs: Vec<IngredientId>,
    instance_refs: Vec<InstanceId>,
    ghosts: Vec<bool>,
    covering: Vec<Vec<Sphere>>,
    tree: Option<ImmutableKdTree<f32, 3>>,
    indexed: usize,
    bulk_threshold: usize,
    rebuild_every: usize,
    max_radius: f32,
}

impl std::fmt::Debug for PackedObjects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackedObjects")
            .field("len", &self.positions.len())
            .field("indexed", &self.indexed)
            .field("bulk_threshold", &self.bulk_threshold)
            .field("rebuild_every", &self.rebuild_every)
            .field("max_radius", &self.max_radius)
            .finish()
    }
}

impl Default for PackedObjects {
    fn default() -> Self {
        Self::new(1000, 64)
    }
}

impl PackedObjects {
    pub fn new(bulk_threshold: usize, rebuild_every: usize) -> Self {
        Self {
            positions: Vec::new(),
            encapsulating_radii: Vec::new(),
            ingredient_refs: Vec::new(),
            instance_refs: Vec::new(),
            ghosts: Vec::new(),
            covering: Vec::new(),
            tree: None,
            indexed: 0,
            bulk_threshold,
            rebuild_every: rebuild_every.max(1),
            max_radius: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Entries currently covered by the tree.
    pub fn indexed(&self) -> usize {
        self.indexed
    }

    pub fn position(&self, index: usize) -> Vec3 {
        self.positions[index]
    }

    pub fn encapsulating_radius(&self, index: usize) -> f32 {
        self.encapsulating_radii[index]
    }

    pub fn ingredient_ref(&self, index: usize) -> IngredientId {
        self.ingredient_refs[index]
    }

    pub fn instance_ref(&self, index: usize) -> InstanceId {
        self.instance_refs[index]
    }

    /// True for periodic images of an instance.
    pub fn is_ghost(&self, index: usize) -> bool {
        self.ghosts[index]
    }

    pub fn covering_spheres(&self, index: usize) -> &[Sphere] {
        &self.covering[index]
    }

    /// Largest encapsulating radius inserted so far.
    pub fn max_radius(&self) -> f32 {
        self.max_radius
    }

    /// Appends an entry and applies the rebuild policy. Returns its index.
    pub fn insert(
        &mut self,
        position: Vec3,
        encapsulating_radius: f32,
        ingredient: IngredientId,
        instance: InstanceId,
        ghost: bool,
        covering: Vec<Sphere>,
    ) -> usize {
        self.positions.push(position);
        self.encapsulating_radii.push(encapsulating_radius);
        self.ingredient_refs.push(ingredient);
        self.instance_refs.push(instance);
        self.ghosts.push(ghost);
        self.covering.push(covering);
        self.max_radius = self.max_radius.max(encapsulating_radius);

        let tail = self.positions.len() - self.indexed;
        if self.positions.len() < self.bulk_threshold || tail >= self.rebuild_every {
            self.rebuild();
        }
        self.positions.len() - 1
    }

    /// Rebuilds the tree over every entry.
    pub fn rebuild(&mut self) {
        if self.positions.is_empty() {
            self.tree = None;
            self.indexed = 0;
            return;
        }
        let entries: Vec<[f32; 3]> = self.positions.iter().map(|p| p.to_array()).collect();
        self.tree = Some(ImmutableKdTree::new_from_slice(&entries));
        self.indexed = self.positions.len();
    }

    pub fn clear(&mut self) {
        self.positions.clear();
        self.encapsulating_radii.clear();
        self.ingredient_refs.clear();
        self.instance_refs.clear();
        self.ghosts.clear();
        self.covering.clear();
        self.tree = None;
        self.indexed = 0;
        self.max_radius = 0.0;
    }

    /// The `k` entries closest to `center`, nearest first.
    pub fn k_nearest(&self, center: Vec3, k: usize) -> Vec<Neighbour> {
        if k == 0 || self.positions.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<Neighbour> = match &self.tree {
            Some(tree) => tree
                .nearest_n::<SquaredEuclidean>(&center.to_array(), k)
                .into_iter()
                .map(|n| Neighbour {
                    index: n.item as usize,
                    distance: n.distance.sqrt(),
                })
                .collect(),
            None => Vec::new(),
        };
        hits.extend(self.tail_hits(center, f32::INFINITY));
        sort_hits(&mut hits);
        hits.truncate(k);
        hits
    }

    /// Every entry whose center lies within `radius` of `center`, nearest first.
    pub fn ball_query(&self, center: Vec3, radius: f32) -> Vec<Neighbour> {
        if self.positions.is_empty() || radius < 0.0 {
            return Vec::new();
        }
        let mut hits: Vec<Neighbour> = match &self.tree {
            Some(tree) => tree
                .within_unsorted::<SquaredEuclidean>(&center.to_array(), radius * radius)
                .into_iter()
                .map(|n| Neighbour {
                    index: n.item as usize,
                    distance: n.distance.sqrt(),
                })
                .collect(),
            None => Vec::new(),
        };
        hits.extend(self.tail_hits(center, radius));
        sort_hits(&mut hits);
        hits
    }

    fn tail_hits(&self, center: Vec3, radius: f32) -> impl Iterator<Item = Neighbour> + '_ {
        (self.indexed..self.positions.len()).filter_map(move |index| {
            let distance = self.positions[index].distance(center);
            (distance <= radius).then_some(Neighbour { index, distance })
        })
    }
}

fn sort_hits(hits: &mut [Neighbour]) {
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.index.cmp(&b.index)));
}
