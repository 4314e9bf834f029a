//! Closed-mesh compartments and the nearest-surface queries used by placement.
//!
//! A [`Compartment`] owns its boundary mesh, a cached bounding box and a k-d tree
//! over the mesh vertices. After [`tagging::tag_grid`] has run it also carries the
//! grid indices of its interior and surface points.
use glam::Vec3;
use kiddo::{ImmutableKdTree, SquaredEuclidean};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, Mesh, SurfaceHit};

pub mod tagging;

pub use tagging::{tag_grid, InsideMethod, SurfaceMethod};

/// Stable compartment id; `1..=n` in environment order.
pub type CompartmentId = u32;

/// Slightly skewed ray directions so rays never run exactly along mesh edges.
pub(crate) const RAY_DIRECTIONS: [Vec3; 3] = [
    Vec3::new(1.0, 0.000123, 0.000371),
    Vec3::new(0.000213, 1.0, 0.000157),
    Vec3::new(0.000311, 0.000179, 1.0),
];

/// A closed region bounded by a triangle mesh.
pub struct Compartment {
    id: CompartmentId,
    name: String,
    mesh: Mesh,
    parent: Option<CompartmentId>,
    bounding_box: BoundingBox,
    vertex_normals: Vec<Vec3>,
    vertex_tree: ImmutableKdTree<f32, 3>,
    pub(crate) interior_point_indices: Vec<u32>,
    pub(crate) surface_point_indices: Vec<u32>,
}

impl std::fmt::Debug for Compartment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compartment")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("bounding_box", &self.bounding_box)
            .field("vertices", &self.mesh.vertices.len())
            .field("faces", &self.mesh.faces.len())
            .field("interior_points", &self.interior_point_indices.len())
            .field("surface_points", &self.surface_point_indices.len())
            .finish()
    }
}

impl Compartment {
    /// Validates the mesh and builds the vertex index.
    pub fn new(id: CompartmentId, name: impl Into<String>, mesh: Mesh) -> Result<Self> {
        if id == 0 {
            return Err(Error::InvalidRecipe(
                "compartment ids start at 1; 0 is the exterior".into(),
            ));
        }
        mesh.validate()?;
        let bounding_box = mesh.bounding_box();
        let vertex_normals = match &mesh.normals {
            Some(normals) => normals.iter().map(|n| n.normalize_or_zero()).collect(),
            None => mesh.vertex_normals(),
        };
        let entries: Vec<[f32; 3]> = mesh.vertices.iter().map(|v| v.to_array()).collect();
        let vertex_tree = ImmutableKdTree::new_from_slice(&entries);
        Ok(Self {
            id,
            name: name.into(),
            mesh,
            parent: None,
            bounding_box,
            vertex_normals,
            vertex_tree,
            interior_point_indices: Vec::new(),
            surface_point_indices: Vec::new(),
        })
    }

    /// Declares the enclosing compartment (builder-style).
    pub fn with_parent(mut self, parent: CompartmentId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn id(&self) -> CompartmentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn parent(&self) -> Option<CompartmentId> {
        self.parent
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    /// Grid points tagged `-id`, ascending.
    pub fn interior_point_indices(&self) -> &[u32] {
        &self.interior_point_indices
    }

    /// Grid points tagged `+id`, ascending.
    pub fn surface_point_indices(&self) -> &[u32] {
        &self.surface_point_indices
    }

    /// Enclosed mesh volume.
    pub fn volume(&self) -> f32 {
        self.mesh.volume()
    }

    /// Jordan test: odd number of crossings means inside.
    ///
    /// With 3 rays the point is inside when at least two rays agree.
    pub fn contains_point(&self, p: Vec3, ray_count: u8) -> bool {
        if !self.bounding_box.contains(p, 0.0) {
            return false;
        }
        let odd = |dir: Vec3| self.mesh.ray_crossings(p, dir) % 2 == 1;
        if ray_count <= 1 {
            return odd(RAY_DIRECTIONS[0]);
        }
        let votes = RAY_DIRECTIONS.iter().filter(|&&dir| odd(dir)).count();
        votes >= 2
    }

    /// Closest point on the mesh surface with its outward normal.
    pub fn nearest_surface(&self, p: Vec3) -> SurfaceHit {
        self.mesh.closest_point(p)
    }

    pub fn nearest_surface_distance(&self, p: Vec3) -> f32 {
        self.mesh.closest_point(p).distance
    }

    /// Outward normal at the nearest surface point.
    ///
    /// Uses the normal of the closest vertex when the mesh carries per-vertex
    /// normals, otherwise the normal of the closest face.
    pub fn nearest_surface_normal(&self, p: Vec3) -> Vec3 {
        if self.mesh.normals.is_some() {
            let (_, vertex) = self.nearest_vertex(p);
            let n = self.vertex_normals[vertex];
            if n != Vec3::ZERO {
                return n;
            }
        }
        self.mesh.closest_point(p).normal
    }

    /// Distance to, and index of, the closest mesh vertex.
    pub fn nearest_vertex(&self, p: Vec3) -> (f32, usize) {
        let hit = self
            .vertex_tree
            .nearest_one::<SquaredEuclidean>(&p.to_array());
        (hit.distance.sqrt(), hit.item as usize)
    }

    pub fn nearest_vertex_distance(&self, p: Vec3) -> f32 {
        self.nearest_vertex(p).0
    }

    /// Distance to the surface, negative inside (3-ray containment).
    pub fn signed_distance(&self, p: Vec3) -> f32 {
        let d = self.nearest_surface_distance(p);
        if self.contains_point(p, 3) {
            -d
        } else {
            d
        }
    }
}

/// Serializable snapshot of a compartment's tagging results (grid cache payload).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompartmentTags {
    pub id: CompartmentId,
    pub surface_point_indices: Vec<u32>,
    pub interior_point_indices: Vec<u32>,
    pub vertices: Vec<Vec3>,
}

impl CompartmentTags {
    pub fn capture(compartment: &Compartment) -> Self {
        Self {
            id: compartment.id,
            surface_point_indices: compartment.surface_point_indices.clone(),
            interior_point_indices: compartment.interior_point_indices.clone(),
            vertices: compartment.mesh.vertices.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(min: f32, max: f32) -> Compartment {
        Compartment::new(1, "cube", Mesh::cuboid(Vec3::splat(min), Vec3::splat(max)))
            .expect("valid mesh")
    }

    #[test]
    fn rejects_exterior_id_and_empty_mesh() {
        let mesh = Mesh::cuboid(Vec3::ZERO, Vec3::ONE);
        assert!(matches!(
            Compartment::new(0, "bad", mesh),
            Err(Error::InvalidRecipe(_))
        ));
        assert!(matches!(
            Compartment::new(1, "empty", Mesh::default()),
            Err(Error::InvalidGrid(_))
        ));
    }

    #[test]
    fn ray_cast_containment_on_cube() {
        let c = cube(25.0, 75.0);
        for rays in [1, 3] {
            assert!(c.contains_point(Vec3::splat(50.0), rays));
            assert!(c.contains_point(Vec3::new(26.0, 74.0, 30.0), rays));
            assert!(!c.contains_point(Vec3::splat(10.0), rays));
            assert!(!c.contains_point(Vec3::new(50.0, 50.0, 80.0), rays));
        }
    }

    #[test]
    fn containment_on_icosphere() {
        let mesh = Mesh::icosphere(Vec3::splat(5.0), 4.0, 2);
        let c = Compartment::new(2, "ball", mesh).expect("valid mesh");
        assert!(c.contains_point(Vec3::splat(5.0), 3));
        assert!(!c.contains_point(Vec3::new(5.0, 5.0, 9.9), 3));
        assert!(!c.contains_point(Vec3::new(1.5, 1.5, 1.5), 3));
    }

    #[test]
    fn surface_queries() {
        let c = cube(0.0, 10.0);
        let p = Vec3::new(5.0, 5.0, 8.0);
        assert!((c.nearest_surface_distance(p) - 2.0).abs() < 1e-5);
        assert!((c.nearest_surface_normal(p) - Vec3::Z).length() < 1e-5);
        assert!((c.signed_distance(p) + 2.0).abs() < 1e-5);
        assert!((c.signed_distance(Vec3::new(5.0, 5.0, 13.0)) - 3.0).abs() < 1e-5);
    }

    #[test]
    fn nearest_vertex_is_a_corner() {
        let c = cube(0.0, 10.0);
        let (d, _) = c.nearest_vertex(Vec3::new(1.0, 1.0, 1.0));
        assert!((d - 3f32.sqrt()).abs() < 1e-5);
    }
}
