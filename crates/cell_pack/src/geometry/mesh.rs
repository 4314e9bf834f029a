//! Closed triangle meshes used as compartment boundaries.
use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::primitives::{closest_point_on_triangle, ray_triangle};
use crate::geometry::BoundingBox;

/// Nearest point on a mesh surface relative to a query point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceHit {
    /// Unsigned distance from the query point to `point`.
    pub distance: f32,
    /// Closest surface point.
    pub point: Vec3,
    /// Outward face normal at `point`.
    pub normal: Vec3,
}

/// Closed triangle mesh with optional per-vertex normals.
///
/// Faces are expected to wind counter-clockwise when seen from outside.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<[u32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normals: Option<Vec<Vec3>>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vec3>, faces: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = Some(normals);
        self
    }

    /// Checks that the mesh is non-empty, finite and indexes only existing vertices.
    pub fn validate(&self) -> Result<()> {
        if self.vertices.is_empty() || self.faces.is_empty() {
            return Err(Error::InvalidGrid("compartment mesh is empty".into()));
        }
        if self.vertices.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidGrid(
                "compartment mesh has non-finite vertices".into(),
            ));
        }
        let n = self.vertices.len() as u32;
        if let Some(face) = self.faces.iter().find(|f| f.iter().any(|&i| i >= n)) {
            return Err(Error::InvalidGrid(format!(
                "face {face:?} references a vertex outside 0..{n}"
            )));
        }
        if let Some(normals) = &self.normals {
            if normals.len() != self.vertices.len() {
                return Err(Error::InvalidGrid(format!(
                    "mesh has {} normals for {} vertices",
                    normals.len(),
                    self.vertices.len()
                )));
            }
        }
        Ok(())
    }

    /// Axis-aligned box spanning all vertices (degenerate at the origin for an empty mesh).
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.vertices)
            .unwrap_or(BoundingBox::new(Vec3::ZERO, Vec3::ZERO))
    }

    #[inline]
    pub fn triangle(&self, face: usize) -> [Vec3; 3] {
        let [a, b, c] = self.faces[face];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    /// Unit normal of `face` following its winding order.
    pub fn face_normal(&self, face: usize) -> Vec3 {
        let [a, b, c] = self.triangle(face);
        (b - a).cross(c - a).normalize_or_zero()
    }

    /// Per-vertex normals: the stored ones, or area-weighted face normals.
    pub fn vertex_normals(&self) -> Vec<Vec3> {
        if let Some(normals) = &self.normals {
            return normals.clone();
        }
        let mut acc = vec![Vec3::ZERO; self.vertices.len()];
        for (fi, face) in self.faces.iter().enumerate() {
            let [a, b, c] = self.triangle(fi);
            let weighted = (b - a).cross(c - a);
            for &i in face {
                acc[i as usize] += weighted;
            }
        }
        acc.into_iter().map(Vec3::normalize_or_zero).collect()
    }

    /// Enclosed volume from the divergence theorem.
    pub fn volume(&self) -> f32 {
        let signed: f32 = (0..self.faces.len())
            .map(|fi| {
                let [a, b, c] = self.triangle(fi);
                a.dot(b.cross(c)) / 6.0
            })
            .sum();
        signed.abs()
    }

    /// Number of faces crossed by the ray `origin + t·dir`, `t > 0`.
    pub fn ray_crossings(&self, origin: Vec3, dir: Vec3) -> usize {
        (0..self.faces.len())
            .filter(|&fi| {
                let [a, b, c] = self.triangle(fi);
                ray_triangle(origin, dir, a, b, c).is_some()
            })
            .count()
    }

    /// Exact closest surface point by scanning all faces, pruned by face bounds.
    pub fn closest_point(&self, p: Vec3) -> SurfaceHit {
        let mut best = SurfaceHit {
            distance: f32::INFINITY,
            point: p,
            normal: Vec3::ZERO,
        };
        for fi in 0..self.faces.len() {
            let [a, b, c] = self.triangle(fi);
            let lo = a.min(b).min(c);
            let hi = a.max(b).max(c);
            if BoundingBox::new(lo, hi).distance_to(p) >= best.distance {
                continue;
            }
            let q = closest_point_on_triangle(p, a, b, c);
            let d = (q - p).length();
            if d < best.distance {
                best = SurfaceHit {
                    distance: d,
                    point: q,
                    normal: self.face_normal(fi),
                };
            }
        }
        best
    }

    /// Axis-aligned box mesh with outward-facing triangles.
    pub fn cuboid(min: Vec3, max: Vec3) -> Self {
        let vertices = (0..8u32)
            .map(|i| {
                Vec3::new(
                    if i & 1 == 0 { min.x } else { max.x },
                    if i & 2 == 0 { min.y } else { max.y },
                    if i & 4 == 0 { min.z } else { max.z },
                )
            })
            .collect();
        let quads: [[u32; 4]; 6] = [
            [0, 4, 6, 2],
            [1, 3, 7, 5],
            [0, 1, 5, 4],
            [2, 6, 7, 3],
            [0, 2, 3, 1],
            [4, 5, 7, 6],
        ];
        let faces = quads
            .iter()
            .flat_map(|&[a, b, c, d]| [[a, b, c], [a, c, d]])
            .collect();
        Self::new(vertices, faces)
    }

    /// Geodesic sphere built by subdividing an icosahedron.
    pub fn icosphere(center: Vec3, radius: f32, subdivisions: u32) -> Self {
        let t = (1.0 + 5.0f32.sqrt()) / 2.0;
        let mut vertices: Vec<Vec3> = [
            (-1.0, t, 0.0),
            (1.0, t, 0.0),
            (-1.0, -t, 0.0),
            (1.0, -t, 0.0),
            (0.0, -1.0, t),
            (0.0, 1.0, t),
            (0.0, -1.0, -t),
            (0.0, 1.0, -t),
            (t, 0.0, -1.0),
            (t, 0.0, 1.0),
            (-t, 0.0, -1.0),
            (-t, 0.0, 1.0),
        ]
        .iter()
        .map(|&(x, y, z)| Vec3::new(x, y, z).normalize())
        .collect();
        let mut faces: Vec<[u32; 3]> = vec![
            [0, 11, 5],
            [0, 5, 1],
            [0, 1, 7],
            [0, 7, 10],
            [0, 10, 11],
            [1, 5, 9],
            [5, 11, 4],
            [11, 10, 2],
            [10, 7, 6],
            [7, 1, 8],
            [3, 9, 4],
            [3, 4, 2],
            [3, 2, 6],
            [3, 6, 8],
            [3, 8, 9],
            [4, 9, 5],
            [2, 4, 11],
            [6, 2, 10],
            [8, 6, 7],
            [9, 8, 1],
        ];

        for _ in 0..subdivisions {
            let mut midpoints: HashMap<(u32, u32), u32> = HashMap::new();
            let mut midpoint = |a: u32, b: u32, vertices: &mut Vec<Vec3>| -> u32 {
                let key = (a.min(b), a.max(b));
                *midpoints.entry(key).or_insert_with(|| {
                    let m = ((vertices[a as usize] + vertices[b as usize]) * 0.5).normalize();
                    vertices.push(m);
                    (vertices.len() - 1) as u32
                })
            };
            let mut next = Vec::with_capacity(faces.len() * 4);
            for [a, b, c] in faces {
                let ab = midpoint(a, b, &mut vertices);
                let bc = midpoint(b, c, &mut vertices);
                let ca = midpoint(c, a, &mut vertices);
                next.extend([[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
            }
            faces = next;
        }

        let normals = vertices.clone();
        let vertices = vertices.into_iter().map(|v| center + v * radius).collect();
        Self::new(vertices, faces).with_normals(normals)
    }
}
