//! On-disk cache of a tagged grid.
//!
//! Tagging a large lattice against detailed meshes dominates environment setup, so
//! the tags, the seeded cold-start distances and each compartment's point lists
//! can be written once and reloaded while the key still matches.
//!
//! Typical usage:
//! - Build a [`GridCacheKey`] with [`GridCacheKey::new`] from the current setup.
//! - Try [`GridCache::load_matching`]; on [`Error::CacheMismatch`] rebuild the grid
//!   and [`GridCache::save`] a fresh [`GridCache::capture`].
use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::compartment::{Compartment, CompartmentTags, InsideMethod, SurfaceMethod};
use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use crate::grid::{Grid, GridStyle};

/// Identity of a tagged grid: any change invalidates the cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridCacheKey {
    pub bounding_box: BoundingBox,
    pub spacing: f32,
    pub style: GridStyle,
    pub compartments_fingerprint: u64,
}

impl GridCacheKey {
    pub fn new(
        grid: &Grid,
        compartments: &[Compartment],
        inside: InsideMethod,
        surface: SurfaceMethod,
    ) -> Self {
        Self {
            bounding_box: *grid.domain(),
            spacing: grid.spacing(),
            style: grid.style(),
            compartments_fingerprint: fingerprint(compartments, inside, surface),
        }
    }

    fn describe(&self) -> String {
        format!(
            "bb={:?}..{:?} spacing={} style={:?} compartments={:016x}",
            self.bounding_box.min,
            self.bounding_box.max,
            self.spacing,
            self.style,
            self.compartments_fingerprint
        )
    }
}

/// Serialized tagging state of a grid and its compartments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridCache {
    pub key: GridCacheKey,
    pub positions: Vec<Vec3>,
    pub compartment_ids: Vec<i32>,
    pub distances: Vec<f32>,
    pub compartments: Vec<CompartmentTags>,
}

impl GridCache {
    /// Snapshots a freshly tagged grid (cold-start distances).
    pub fn capture(key: GridCacheKey, grid: &Grid, compartments: &[Compartment]) -> Self {
        Self {
            key,
            positions: grid.positions().to_vec(),
            compartment_ids: grid.compartment_ids().to_vec(),
            distances: grid.initial_distances().to_vec(),
            compartments: compartments.iter().map(CompartmentTags::capture).collect(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Loads the cache and checks it against `key`.
    pub fn load_matching(path: impl AsRef<Path>, key: &GridCacheKey) -> Result<Self> {
        let cache = Self::load(path)?;
        if &cache.key != key {
            return Err(Error::CacheMismatch {
                expected: key.describe(),
                found: cache.key.describe(),
            });
        }
        Ok(cache)
    }

    /// Writes the cached tags and distances back into `grid` and `compartments`.
    pub fn apply(self, grid: &mut Grid, compartments: &mut [Compartment]) -> Result<()> {
        if self.positions.len() != grid.len()
            || self.compartment_ids.len() != grid.len()
            || self.distances.len() != grid.len()
        {
            return Err(Error::InvalidGrid(format!(
                "cached grid has {} points, lattice has {}",
                self.positions.len(),
                grid.len()
            )));
        }
        if self.compartments.len() != compartments.len() {
            return Err(Error::InvalidGrid(format!(
                "cached grid has {} compartments, environment has {}",
                self.compartments.len(),
                compartments.len()
            )));
        }
        for (tags, compartment) in self.compartments.into_iter().zip(compartments.iter_mut()) {
            if tags.id != compartment.id() {
                return Err(Error::InvalidGrid(format!(
                    "cached compartment {} does not match {}",
                    tags.id,
                    compartment.id()
                )));
            }
            compartment.interior_point_indices = tags.interior_point_indices;
            compartment.surface_point_indices = tags.surface_point_indices;
        }
        grid.restore_tags(self.compartment_ids, self.distances);
        Ok(())
    }
}

fn fingerprint(compartments: &[Compartment], inside: InsideMethod, surface: SurfaceMethod) -> u64 {
    let mut hasher = DefaultHasher::new();

    match inside {
        InsideMethod::RayCast { rays } => {
            0u8.hash(&mut hasher);
            rays.hash(&mut hasher);
        }
        InsideMethod::FloodFill => 1u8.hash(&mut hasher),
    }
    let surface_tag: u8 = match surface {
        SurfaceMethod::NearestVertex => 0,
        SurfaceMethod::VoxelPierce => 1,
    };
    surface_tag.hash(&mut hasher);

    for compartment in compartments {
        compartment.id().hash(&mut hasher);
        compartment.parent().hash(&mut hasher);
        let mesh = compartment.mesh();
        mesh.vertices.len().hash(&mut hasher);
        for v in &mesh.vertices {
            v.x.to_bits().hash(&mut hasher);
            v.y.to_bits().hash(&mut hasher);
            v.z.to_bits().hash(&mut hasher);
        }
        mesh.faces.hash(&mut hasher);
    }

    hasher.finish()
}
