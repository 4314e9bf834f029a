//! Geometric building blocks shared by the grid, compartments and ingredients.
//!
//! - [`BoundingBox`]: axis-aligned box used for the packing domain and mesh bounds.
//! - [`mesh`]: closed triangle meshes with inside and nearest-surface queries.
//! - [`primitives`]: ray, segment, triangle and box intersection routines.
use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub mod mesh;
pub mod primitives;

pub use mesh::{Mesh, SurfaceHit};

/// Axis-aligned bounding box `(min, max)` with `min <= max` componentwise.
///
/// Serialized as `[[min.x, min.y, min.z], [max.x, max.y, max.z]]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[Vec3; 2]", into = "[Vec3; 2]")]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// Creates a box from two corners without validation.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Creates a box, rejecting non-finite corners and inverted or zero-volume extents.
    pub fn try_new(min: Vec3, max: Vec3) -> Result<Self> {
        let bb = Self { min, max };
        bb.validate()?;
        Ok(bb)
    }

    /// Smallest box enclosing all points. Returns `None` for an empty slice.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let first = *points.first()?;
        let (min, max) = points
            .iter()
            .fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
        Some(Self { min, max })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(Error::InvalidRecipe(
                "bounding box corners must be finite".into(),
            ));
        }
        if self.volume() <= 0.0 {
            return Err(Error::InvalidRecipe(format!(
                "bounding box {:?}..{:?} has non-positive volume",
                self.min, self.max
            )));
        }
        Ok(())
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn diagonal(&self) -> f32 {
        self.extent().length()
    }

    pub fn volume(&self) -> f32 {
        let e = self.extent();
        if e.x < 0.0 || e.y < 0.0 || e.z < 0.0 {
            return 0.0;
        }
        e.x * e.y * e.z
    }

    /// Smallest of the three extents.
    pub fn min_extent(&self) -> f32 {
        self.extent().min_element()
    }

    /// True when `p` lies inside the box shrunk by `margin` on every face.
    pub fn contains(&self, p: Vec3, margin: f32) -> bool {
        let lo = self.min + Vec3::splat(margin);
        let hi = self.max - Vec3::splat(margin);
        p.cmpge(lo).all() && p.cmple(hi).all()
    }

    /// Box grown by `amount` on every face.
    pub fn expanded(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(amount),
            max: self.max + Vec3::splat(amount),
        }
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// Euclidean distance from `p` to the box (zero inside).
    pub fn distance_to(&self, p: Vec3) -> f32 {
        let d = (self.min - p).max(p - self.max).max(Vec3::ZERO);
        d.length()
    }
}

impl From<[Vec3; 2]> for BoundingBox {
    fn from(value: [Vec3; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<BoundingBox> for [Vec3; 2] {
    fn from(value: BoundingBox) -> Self {
        [value.min, value.max]
    }
}

/// Rotation taking direction `from` onto direction `to`.
///
/// Degenerate (zero-length) inputs yield the identity.
pub fn rotation_between(from: Vec3, to: Vec3) -> Mat3 {
    let (Some(a), Some(b)) = (from.try_normalize(), to.try_normalize()) else {
        return Mat3::IDENTITY;
    };
    Mat3::from_quat(Quat::from_rotation_arc(a, b))
}

/// Rotation of `angle` radians about `axis`. A zero axis yields the identity.
pub fn rotation_about(axis: Vec3, angle: f32) -> Mat3 {
    match axis.try_normalize() {
        Some(a) => Mat3::from_axis_angle(a, angle),
        None => Mat3::IDENTITY,
    }
}
