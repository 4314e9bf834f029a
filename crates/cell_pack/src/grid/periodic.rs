//! Periodic images of candidates near the faces of the packing box.
use glam::Vec3;

use crate::geometry::BoundingBox;

/// Mirrored copies of `center` for a periodic box.
///
/// For each axis on which `center` lies within `cutoff` of a face, the image is
/// shifted by the box extent towards the opposite face. Combining the wrapped axes
/// yields up to 7 images (3 faces, 3 edges, 1 corner). The original position is not
/// included.
pub fn periodic_images(center: Vec3, domain: &BoundingBox, cutoff: f32) -> Vec<Vec3> {
    let extent = domain.extent();
    let mut shifts = [0.0f32; 3];
    for axis in 0..3 {
        let to_min = center[axis] - domain.min[axis];
        let to_max = domain.max[axis] - center[axis];
        if to_min < cutoff && to_min <= to_max {
            shifts[axis] = extent[axis];
        } else if to_max < cutoff {
            shifts[axis] = -extent[axis];
        }
    }

    let mut images = Vec::new();
    for mask in 1u8..8 {
        let mut offset = Vec3::ZERO;
        let mut valid = true;
        for (axis, shift) in shifts.iter().enumerate() {
            if mask & (1 << axis) != 0 {
                if *shift == 0.0 {
                    valid = false;
                    break;
                }
                offset[axis] = *shift;
            }
        }
        if valid {
            images.push(center + offset);
        }
    }
    images
}
