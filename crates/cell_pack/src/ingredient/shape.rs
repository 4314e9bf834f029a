//! Ingredient geometry and posed signed distances.
//!
//! All shapes are defined in a local frame whose origin is the instance center.
//! Level 0 of the collision hierarchy is always the encapsulating sphere; deeper
//! levels refine towards the exact geometry.
use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One refinement level of a sphere tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SphereLevel {
    pub centers: Vec<Vec3>,
    pub radii: Vec<f32>,
}

/// Capped cylinder segment in the local frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CylinderSegment {
    pub bottom: Vec3,
    pub top: Vec3,
    pub radius: f32,
}

/// Sphere in world or local coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    #[inline]
    pub fn overlaps(&self, other: &Sphere) -> bool {
        self.center.distance(other.center) < self.radius + other.radius
    }
}

#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    SingleSphere { radius: f32 },
    /// Sphere tree; the last level is the exact geometry.
    MultiSphere { levels: Vec<SphereLevel> },
    SingleCylinder(CylinderSegment),
    MultiCylinder { segments: Vec<CylinderSegment> },
    SingleCube { half_extents: Vec3 },
}

impl Shape {
    pub fn sphere(radius: f32) -> Self {
        Self::SingleSphere { radius }
    }

    /// Single-level sphere aggregate.
    pub fn multi_sphere(centers: Vec<Vec3>, radii: Vec<f32>) -> Self {
        Self::MultiSphere {
            levels: vec![SphereLevel { centers, radii }],
        }
    }

    pub fn cylinder(bottom: Vec3, top: Vec3, radius: f32) -> Self {
        Self::SingleCylinder(CylinderSegment {
            bottom,
            top,
            radius,
        })
    }

    pub fn cube(half_extents: Vec3) -> Self {
        Self::SingleCube { half_extents }
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(Error::InvalidRecipe(msg));
        let positive = |r: f32| r.is_finite() && r > 0.0;
        match self {
            Shape::SingleSphere { radius } => {
                if !positive(*radius) {
                    return bad(format!("sphere radius must be > 0, got {radius}"));
                }
            }
            Shape::MultiSphere { levels } => {
                if levels.is_empty() {
                    return bad("multi-sphere needs at least one level".into());
                }
                for (i, level) in levels.iter().enumerate() {
                    if level.centers.is_empty() || level.centers.len() != level.radii.len() {
                        return bad(format!(
                            "multi-sphere level {i} has {} centers and {} radii",
                            level.centers.len(),
                            level.radii.len()
                        ));
                    }
                    if level.radii.iter().any(|&r| !positive(r))
                        || level.centers.iter().any(|c| !c.is_finite())
                    {
                        return bad(format!("multi-sphere level {i} has invalid spheres"));
                    }
                }
            }
            Shape::SingleCylinder(segment) => validate_segment(segment)?,
            Shape::MultiCylinder { segments } => {
                if segments.is_empty() {
                    return bad("multi-cylinder needs at least one segment".into());
                }
                for segment in segments {
                    validate_segment(segment)?;
                }
            }
            Shape::SingleCube { half_extents } => {
                if !half_extents.is_finite() || half_extents.min_element() <= 0.0 {
                    return bad(format!("cube half extents must be > 0, got {half_extents}"));
                }
            }
        }
        Ok(())
    }

    /// Radius of the smallest origin-centered sphere enclosing every sub-geometry.
    pub fn encapsulating_radius(&self) -> f32 {
        match self {
            Shape::SingleSphere { radius } => *radius,
            Shape::MultiSphere { levels } => levels
                .iter()
                .flat_map(|l| l.centers.iter().zip(&l.radii))
                .map(|(c, r)| c.length() + r)
                .fold(0.0, f32::max),
            Shape::SingleCylinder(s) => s.bottom.length().max(s.top.length()) + s.radius,
            Shape::MultiCylinder { segments } => segments
                .iter()
                .map(|s| s.bottom.length().max(s.top.length()) + s.radius)
                .fold(0.0, f32::max),
            Shape::SingleCube { half_extents } => half_extents.length(),
        }
    }

    /// Smallest characteristic radius; bounds the grid spacing from above.
    pub fn min_radius(&self) -> f32 {
        match self {
            Shape::SingleSphere { radius } => *radius,
            Shape::MultiSphere { levels } => levels
                .last()
                .map(|l| l.radii.iter().copied().fold(f32::INFINITY, f32::min))
                .unwrap_or(0.0),
            Shape::SingleCylinder(s) => s.radius,
            Shape::MultiCylinder { segments } => segments
                .iter()
                .map(|s| s.radius)
                .fold(f32::INFINITY, f32::min),
            Shape::SingleCube { half_extents } => half_extents.min_element(),
        }
    }

    /// Number of collision levels, the encapsulating sphere included.
    pub fn level_count(&self) -> usize {
        match self {
            Shape::SingleSphere { .. } => 1,
            Shape::MultiSphere { levels } => levels.len() + 1,
            _ => 2,
        }
    }

    /// Signed distance from local point `q` at `level`; the last level is exact.
    pub fn level_signed_distance(&self, level: usize, q: Vec3) -> f32 {
        if level == 0 {
            return q.length() - self.encapsulating_radius();
        }
        match self {
            Shape::MultiSphere { levels } => {
                let l = &levels[(level - 1).min(levels.len() - 1)];
                sphere_union_distance(&l.centers, &l.radii, q)
            }
            _ => self.signed_distance(q),
        }
    }

    /// Exact signed distance from local point `q` (negative inside).
    pub fn signed_distance(&self, q: Vec3) -> f32 {
        match self {
            Shape::SingleSphere { radius } => q.length() - radius,
            Shape::MultiSphere { levels } => match levels.last() {
                Some(l) => sphere_union_distance(&l.centers, &l.radii, q),
                None => f32::INFINITY,
            },
            Shape::SingleCylinder(s) => capped_cylinder_distance(s, q),
            Shape::MultiCylinder { segments } => segments
                .iter()
                .map(|s| capped_cylinder_distance(s, q))
                .fold(f32::INFINITY, f32::min),
            Shape::SingleCube { half_extents } => box_distance(*half_extents, q),
        }
    }

    /// Local spheres whose union contains the shape; exact for sphere shapes.
    pub fn covering_spheres(&self) -> Vec<Sphere> {
        match self {
            Shape::SingleSphere { radius } => vec![Sphere::new(Vec3::ZERO, *radius)],
            Shape::MultiSphere { levels } => levels
                .last()
                .map(|l| {
                    l.centers
                        .iter()
                        .zip(&l.radii)
                        .map(|(&c, &r)| Sphere::new(c, r))
                        .collect()
                })
                .unwrap_or_default(),
            Shape::SingleCylinder(s) => cylinder_cover(s),
            Shape::MultiCylinder { segments } => segments.iter().flat_map(cylinder_cover).collect(),
            Shape::SingleCube { half_extents } => box_cover(*half_extents),
        }
    }
}

fn validate_segment(s: &CylinderSegment) -> Result<()> {
    if !(s.radius.is_finite() && s.radius > 0.0) {
        return Err(Error::InvalidRecipe(format!(
            "cylinder radius must be > 0, got {}",
            s.radius
        )));
    }
    if !s.bottom.is_finite() || !s.top.is_finite() || s.bottom.distance(s.top) <= 0.0 {
        return Err(Error::InvalidRecipe(format!(
            "cylinder axis {}..{} is degenerate",
            s.bottom, s.top
        )));
    }
    Ok(())
}

fn sphere_union_distance(centers: &[Vec3], radii: &[f32], q: Vec3) -> f32 {
    centers
        .iter()
        .zip(radii)
        .map(|(c, r)| q.distance(*c) - r)
        .fold(f32::INFINITY, f32::min)
}

fn capped_cylinder_distance(s: &CylinderSegment, q: Vec3) -> f32 {
    let ba = s.top - s.bottom;
    let pa = q - s.bottom;
    let baba = ba.dot(ba);
    let paba = pa.dot(ba);
    let x = (pa * baba - ba * paba).length() - s.radius * baba;
    let y = (paba - baba * 0.5).abs() - baba * 0.5;
    let x2 = x * x;
    let y2 = y * y * baba;
    let d = if x.max(y) < 0.0 {
        -x2.min(y2)
    } else {
        (if x > 0.0 { x2 } else { 0.0 }) + (if y > 0.0 { y2 } else { 0.0 })
    };
    d.signum() * d.abs().sqrt() / baba
}

fn box_distance(half_extents: Vec3, q: Vec3) -> f32 {
    let d = q.abs() - half_extents;
    d.max(Vec3::ZERO).length() + d.max_element().min(0.0)
}

/// Spheres at most `radius` apart along the axis, inflated to cover the gaps.
fn cylinder_cover(s: &CylinderSegment) -> Vec<Sphere> {
    let length = s.bottom.distance(s.top);
    let n = (length / s.radius).ceil().max(1.0) as usize + 1;
    let step = length / (n - 1) as f32;
    let radius = (s.radius * s.radius + step * step * 0.25).sqrt();
    (0..n)
        .map(|i| Sphere::new(s.bottom.lerp(s.top, i as f32 / (n - 1) as f32), radius))
        .collect()
}

/// Sub-boxes no longer than twice the smallest half extent, each covered by its circumsphere.
fn box_cover(half_extents: Vec3) -> Vec<Sphere> {
    let cell = half_extents.min_element() * 2.0;
    let counts = (half_extents * 2.0 / cell).ceil().max(Vec3::ONE);
    let (nx, ny, nz) = (counts.x as usize, counts.y as usize, counts.z as usize);
    let size = half_extents * 2.0 / counts;
    let radius = (size * 0.5).length();
    let mut spheres = Vec::with_capacity(nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let center = -half_extents
                    + size * (Vec3::new(i as f32, j as f32, k as f32) + Vec3::splat(0.5));
                spheres.push(Sphere::new(center, radius));
            }
        }
    }
    spheres
}

/// A shape placed at `position` with orientation `rotation`.
#[derive(Clone, Copy, Debug)]
pub struct PosedShape<'a> {
    pub shape: &'a Shape,
    pub position: Vec3,
    pub rotation: Mat3,
    inverse: Mat3,
}

impl<'a> PosedShape<'a> {
    pub fn new(shape: &'a Shape, position: Vec3, rotation: Mat3) -> Self {
        Self {
            shape,
            position,
            rotation,
            inverse: rotation.transpose(),
        }
    }

    /// Same shape and rotation at another position.
    pub fn translated_to(&self, position: Vec3) -> Self {
        Self { position, ..*self }
    }

    #[inline]
    pub fn to_local(&self, p: Vec3) -> Vec3 {
        self.inverse * (p - self.position)
    }

    #[inline]
    pub fn signed_distance(&self, p: Vec3) -> f32 {
        self.shape.signed_distance(self.to_local(p))
    }

    #[inline]
    pub fn level_signed_distance(&self, level: usize, p: Vec3) -> f32 {
        self.shape.level_signed_distance(level, self.to_local(p))
    }

    pub fn covering_spheres(&self) -> Vec<Sphere> {
        self.shape
            .covering_spheres()
            .into_iter()
            .map(|s| Sphere::new(self.position + self.rotation * s.center, s.radius))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    #[test]
    fn encapsulating_radius_uses_farthest_extent() {
        let shape = Shape::multi_sphere(
            vec![Vec3::ZERO, Vec3::new(6.0, 0.0, 0.0)],
            vec![5.0, 2.0],
        );
        assert_eq!(shape.encapsulating_radius(), 8.0);
        assert_eq!(shape.min_radius(), 2.0);

        let cyl = Shape::cylinder(Vec3::new(0.0, 0.0, -10.0), Vec3::new(0.0, 0.0, 10.0), 3.0);
        assert_eq!(cyl.encapsulating_radius(), 13.0);
        let cube = Shape::cube(Vec3::new(3.0, 4.0, 0.0001));
        assert!((cube.encapsulating_radius() - 5.0).abs() < 1e-3);
    }

    #[test]
    fn validation_rejects_degenerate_shapes() {
        assert!(Shape::sphere(0.0).validate().is_err());
        assert!(Shape::multi_sphere(vec![Vec3::ZERO], vec![]).validate().is_err());
        assert!(Shape::cylinder(Vec3::ONE, Vec3::ONE, 1.0).validate().is_err());
        assert!(Shape::cube(Vec3::new(1.0, 0.0, 1.0)).validate().is_err());
        assert!(Shape::sphere(2.0).validate().is_ok());
    }

    #[test]
    fn cylinder_signed_distance() {
        let cyl = Shape::cylinder(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, 5.0), 2.0);
        assert!((cyl.signed_distance(Vec3::ZERO) + 2.0).abs() < 1e-5);
        assert!((cyl.signed_distance(Vec3::new(4.0, 0.0, 0.0)) - 2.0).abs() < 1e-4);
        assert!((cyl.signed_distance(Vec3::new(0.0, 0.0, 8.0)) - 3.0).abs() < 1e-4);
        assert!((cyl.signed_distance(Vec3::new(0.0, 0.0, 4.5)) + 0.5).abs() < 1e-4);
    }

    #[test]
    fn box_signed_distance_is_linf_inside() {
        let cube = Shape::cube(Vec3::new(2.0, 3.0, 4.0));
        assert!((cube.signed_distance(Vec3::ZERO) + 2.0).abs() < 1e-6);
        assert!((cube.signed_distance(Vec3::new(5.0, 0.0, 0.0)) - 3.0).abs() < 1e-6);
        assert!((cube.signed_distance(Vec3::new(5.0, 7.0, 0.0)) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn level_zero_bounds_deeper_levels() {
        let shape = Shape::MultiSphere {
            levels: vec![
                SphereLevel {
                    centers: vec![Vec3::ZERO],
                    radii: vec![7.0],
                },
                SphereLevel {
                    centers: vec![Vec3::new(-3.0, 0.0, 0.0), Vec3::new(3.0, 0.0, 0.0)],
                    radii: vec![3.0, 3.0],
                },
            ],
        };
        assert_eq!(shape.level_count(), 3);
        for q in [
            Vec3::ZERO,
            Vec3::new(0.0, 4.0, 0.0),
            Vec3::new(9.0, 1.0, 0.0),
            Vec3::new(-2.0, -2.0, 2.0),
        ] {
            let l0 = shape.level_signed_distance(0, q);
            let l1 = shape.level_signed_distance(1, q);
            let l2 = shape.level_signed_distance(2, q);
            assert!(l0 <= l1 + 1e-6 && l1 <= l2 + 1e-6, "{q}: {l0} {l1} {l2}");
        }
    }

    #[test]
    fn covering_spheres_contain_surface_samples() {
        for shape in [
            Shape::cylinder(Vec3::new(0.0, 0.0, -6.0), Vec3::new(0.0, 0.0, 6.0), 2.0),
            Shape::cube(Vec3::new(1.0, 2.0, 5.0)),
        ] {
            let cover = shape.covering_spheres();
            let r = shape.encapsulating_radius();
            for i in 0..20 {
                for j in 0..20 {
                    let q = Vec3::new(
                        -r + 2.0 * r * i as f32 / 19.0,
                        -r + 2.0 * r * j as f32 / 19.0,
                        -r + 2.0 * r * ((i + j) % 20) as f32 / 19.0,
                    );
                    if shape.signed_distance(q) <= 0.0 {
                        assert!(
                            cover.iter().any(|s| q.distance(s.center) <= s.radius + 1e-4),
                            "{q} not covered"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn posed_shape_applies_rotation() {
        let cyl = Shape::cylinder(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, 5.0), 1.0);
        let posed = PosedShape::new(&cyl, Vec3::splat(10.0), Mat3::from_rotation_y(FRAC_PI_2));
        // The axis now runs along x.
        assert!(posed.signed_distance(Vec3::new(14.5, 10.0, 10.0)) < 0.0);
        assert!(posed.signed_distance(Vec3::new(10.0, 10.0, 14.5)) > 0.0);
        let cover = posed.covering_spheres();
        assert!(cover.iter().all(|s| (s.center.y - 10.0).abs() < 1e-4));
    }
}
