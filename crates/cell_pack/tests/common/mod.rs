#![allow(dead_code)]

use cell_pack::prelude::*;
use glam::Vec3;

pub fn cube_box(size: f32) -> BoundingBox {
    BoundingBox::new(Vec3::ZERO, Vec3::splat(size))
}

pub fn sphere(name: &str, radius: f32, count: u32) -> Ingredient {
    Ingredient::new(name, Shape::sphere(radius)).with_count(count)
}

/// Smallest center distance minus radius sum over all pairs of instances.
pub fn min_sphere_gap(result: &PackResult, radius_of: impl Fn(IngredientId) -> f32) -> f32 {
    let mut gap = f32::INFINITY;
    for (i, a) in result.instances.iter().enumerate() {
        for b in &result.instances[i + 1..] {
            let d = a.position.distance(b.position)
                - radius_of(a.ingredient_id)
                - radius_of(b.ingredient_id);
            gap = gap.min(d);
        }
    }
    gap
}

/// Depth of the deepest sampled point that lies inside two instances at once.
///
/// Each pair with overlapping encapsulating spheres is sampled on a lattice
/// spanning the smaller of the two spheres. Zero when no sample is shared.
pub fn deepest_shared_point(env: &Environment, result: &PackResult) -> f32 {
    const STEPS: usize = 9;
    let posed: Vec<(PosedShape<'_>, f32)> = result
        .instances
        .iter()
        .map(|i| {
            let ingredient = env.ingredient(i.ingredient_id);
            (
                PosedShape::new(&ingredient.shape, i.position, i.rotation),
                ingredient.encapsulating_radius(),
            )
        })
        .collect();

    let mut deepest = 0.0f32;
    for (i, (a, ra)) in posed.iter().enumerate() {
        for (b, rb) in &posed[i + 1..] {
            if a.position.distance(b.position) >= ra + rb {
                continue;
            }
            let (center, radius) = if ra <= rb {
                (a.position, *ra)
            } else {
                (b.position, *rb)
            };
            for ix in 0..STEPS {
                for iy in 0..STEPS {
                    for iz in 0..STEPS {
                        let t = Vec3::new(ix as f32, iy as f32, iz as f32) / (STEPS - 1) as f32;
                        let p = center + (t * 2.0 - Vec3::ONE) * radius;
                        let depth = (-a.signed_distance(p)).min(-b.signed_distance(p));
                        deepest = deepest.max(depth);
                    }
                }
            }
        }
    }
    deepest
}

/// Smallest gap between two spheres under the minimum-image convention of `domain`.
pub fn min_wrapped_sphere_gap(result: &PackResult, domain: &BoundingBox, radius: f32) -> f32 {
    let extent = domain.extent();
    let mut gap = f32::INFINITY;
    for (i, a) in result.instances.iter().enumerate() {
        for b in &result.instances[i + 1..] {
            let d = b.position - a.position;
            let wrapped = d - extent * (d / extent).round();
            gap = gap.min(wrapped.length() - 2.0 * radius);
        }
    }
    gap
}
