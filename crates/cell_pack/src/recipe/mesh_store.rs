//! Mesh lookup for compartment objects.
//!
//! Recipes refer to compartment boundaries by an opaque path. A [`MeshStore`] turns
//! that path into a [`Mesh`]; the inside and nearest-surface queries have default
//! implementations on top of [`MeshStore::read_mesh`].
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use glam::Vec3;

use crate::compartment::RAY_DIRECTIONS;
use crate::error::{Error, Result};
use crate::geometry::{Mesh, SurfaceHit};

/// Source of compartment meshes.
pub trait MeshStore {
    fn read_mesh(&self, path: &str) -> Result<Mesh>;

    /// Jordan test with three skewed rays; inside when at least two see an odd count.
    fn contains_point(&self, path: &str, p: Vec3) -> Result<bool> {
        let mesh = self.read_mesh(path)?;
        if !mesh.bounding_box().contains(p, 0.0) {
            return Ok(false);
        }
        let odd = RAY_DIRECTIONS
            .iter()
            .filter(|&&dir| mesh.ray_crossings(p, dir) % 2 == 1)
            .count();
        Ok(odd >= 2)
    }

    fn nearest_surface(&self, path: &str, p: Vec3) -> Result<SurfaceHit> {
        Ok(self.read_mesh(path)?.closest_point(p))
    }
}

/// Meshes registered up front under their recipe path.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMeshStore {
    meshes: HashMap<String, Mesh>,
}

impl InMemoryMeshStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, mesh: Mesh) {
        self.meshes.insert(path.into(), mesh);
    }

    pub fn with_mesh(mut self, path: impl Into<String>, mesh: Mesh) -> Self {
        self.insert(path, mesh);
        self
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

impl MeshStore for InMemoryMeshStore {
    fn read_mesh(&self, path: &str) -> Result<Mesh> {
        self.meshes
            .get(path)
            .cloned()
            .ok_or_else(|| Error::MeshNotFound { path: path.into() })
    }
}

/// Reads meshes stored as JSON [`Mesh`] documents relative to a root directory.
#[derive(Clone, Debug)]
pub struct JsonMeshStore {
    root: PathBuf,
}

impl JsonMeshStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl MeshStore for JsonMeshStore {
    fn read_mesh(&self, path: &str) -> Result<Mesh> {
        let full = self.root.join(path);
        if !full.is_file() {
            return Err(Error::MeshNotFound {
                path: full.display().to_string(),
            });
        }
        let reader = BufReader::new(File::open(&full)?);
        let mesh: Mesh = serde_json::from_reader(reader)?;
        mesh.validate()?;
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_answers_queries() {
        let store = InMemoryMeshStore::new()
            .with_mesh("cube", Mesh::cuboid(Vec3::ZERO, Vec3::splat(10.0)));
        assert_eq!(store.len(), 1);
        assert!(store.contains_point("cube", Vec3::splat(5.0)).expect("query"));
        assert!(!store.contains_point("cube", Vec3::splat(12.0)).expect("query"));
        let hit = store
            .nearest_surface("cube", Vec3::new(5.0, 5.0, 12.0))
            .expect("query");
        assert!((hit.distance - 2.0).abs() < 1e-5);
        assert_eq!(hit.normal, Vec3::Z);
    }

    #[test]
    fn unknown_path_is_mesh_not_found() {
        let store = InMemoryMeshStore::new();
        assert!(matches!(
            store.read_mesh("missing"),
            Err(Error::MeshNotFound { .. })
        ));
    }

    #[test]
    fn json_store_reads_from_disk() {
        let dir = std::env::temp_dir().join(format!("cell_pack_meshes_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("dir");
        let mesh = Mesh::cuboid(Vec3::ZERO, Vec3::ONE);
        std::fs::write(
            dir.join("box.json"),
            serde_json::to_string(&mesh).expect("json"),
        )
        .expect("write");
        let store = JsonMeshStore::new(&dir);
        assert_eq!(store.read_mesh("box.json").expect("mesh"), mesh);
        assert!(matches!(
            store.read_mesh("nope.json"),
            Err(Error::MeshNotFound { .. })
        ));
        std::fs::remove_dir_all(&dir).ok();
    }
}
