mod common;

use cell_pack::prelude::*;
use common::{cube_box, min_sphere_gap, sphere};
use glam::Vec3;

#[test]
fn one_sphere_in_a_box() {
    let mut env = Environment::builder(cube_box(100.0))
        .with_config(PackConfig::new().with_spacing(10.0))
        .with_ingredient(sphere("big", 25.0, 1))
        .build()
        .expect("env");
    let result = env.pack(42);

    assert_eq!(result.report("big").map(|r| r.placed_count), Some(1));
    let center = result.instances[0].position;
    assert!(center.cmpge(Vec3::splat(25.0)).all(), "{center}");
    assert!(center.cmple(Vec3::splat(75.0)).all(), "{center}");

    let covered = env
        .grid()
        .positions()
        .iter()
        .filter(|p| p.distance(center) < 25.0)
        .count();
    assert_eq!(result.total_points - result.free_points, covered);
}

#[test]
fn quota_caps_placements() {
    let mut env = Environment::builder(cube_box(100.0))
        .with_config(PackConfig::new().with_spacing(5.0))
        .with_ingredient(sphere("ball", 5.0, 10))
        .build()
        .expect("env");
    let result = env.pack(7);

    assert_eq!(result.instances.len(), 10);
    assert_eq!(result.report("ball").map(|r| r.placed_count), Some(10));
    assert!(result.is_complete());
    assert!(min_sphere_gap(&result, |_| 5.0) >= -1e-4);
}

#[test]
fn two_ingredients_exclude_each_other() {
    let mut env = Environment::builder(cube_box(100.0))
        .with_ingredient(sphere("a", 10.0, 5))
        .with_ingredient(sphere("b", 10.0, 5))
        .build()
        .expect("env");
    let result = env.pack(3);

    assert_eq!(result.placed_total(), 10);
    assert!(min_sphere_gap(&result, |_| 10.0) >= -1e-3);
}

#[test]
fn negative_priorities_run_first_in_order() {
    let mut env = Environment::builder(cube_box(100.0))
        .with_config(PackConfig::new().with_spacing(5.0))
        .with_ingredient(sphere("x", 5.0, 3).with_priority(-2.0))
        .with_ingredient(sphere("y", 5.0, 3).with_priority(-1.0))
        .with_ingredient(sphere("z", 5.0, 100).with_priority(0.0))
        .build()
        .expect("env");
    let result = env.pack(5);

    let order: Vec<IngredientId> = result.instances.iter().map(|i| i.ingredient_id).collect();
    assert!(order.len() > 6);
    assert_eq!(&order[..6], &[0, 0, 0, 1, 1, 1]);
    assert!(order[6..].iter().all(|&id| id == 2));
}

#[test]
fn interior_ingredient_stays_inside_its_compartment() {
    let mut env = Environment::builder(cube_box(100.0))
        .with_config(PackConfig::new().with_spacing(5.0))
        .with_compartment(
            "cube",
            Mesh::cuboid(Vec3::splat(25.0), Vec3::splat(75.0)),
        )
        .with_ingredient(sphere("inner", 5.0, 20).with_region(PlacementRegion::Interior(1)))
        .build()
        .expect("env");
    let result = env.pack(11);

    assert_eq!(result.instances.len(), 20);
    for instance in &result.instances {
        let c = instance.position;
        assert!(c.cmpgt(Vec3::splat(25.0)).all(), "{c}");
        assert!(c.cmplt(Vec3::splat(75.0)).all(), "{c}");
    }
}

#[test]
fn axis_gradient_biases_placements_toward_high_x() {
    let midpoint = 50.0;
    let mut means = Vec::new();
    for seed in 1..=5u64 {
        let mut env = Environment::builder(cube_box(100.0))
            .with_config(PackConfig::new().with_spacing(5.0))
            .with_gradient(
                GradientSpec::new(
                    "x",
                    GradientMode::AxisLinear {
                        axis: Vec3::X,
                        exponent: 1.0,
                    },
                )
                .with_selection(WeightSelection::RandomWeighted),
            )
            .with_ingredient(
                sphere("ball", 5.0, 200).with_packing_mode(PackingMode::Gradient("x".into())),
            )
            .build()
            .expect("env");
        let result = env.pack(seed);
        assert!(result.instances.len() >= 50, "seed {seed}: {}", result.instances.len());
        let mean =
            result.instances.iter().map(|i| i.position.x).sum::<f32>() / result.instances.len() as f32;
        means.push(mean);
    }

    // One-sided t-test over the per-seed means, 4 degrees of freedom, α = 0.01.
    let n = means.len() as f32;
    let mean = means.iter().sum::<f32>() / n;
    let var = means.iter().map(|m| (m - mean).powi(2)).sum::<f32>() / (n - 1.0);
    let t = (mean - midpoint) / (var.sqrt() / n.sqrt()).max(1e-6);
    assert!(mean > midpoint, "means {means:?}");
    assert!(t > 3.747, "t = {t}, means {means:?}");
}
