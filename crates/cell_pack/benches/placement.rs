mod common;

use std::hint::black_box;

use cell_pack::prelude::{
    attempt_placement, BoundingBox, Environment, Ingredient, PackConfig, PlacementContext, Shape,
    UniformRandomOrientation,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Environment with `count` spheres already packed, plus probe ingredients.
fn crowded(count: u32) -> Environment {
    let mut env = Environment::builder(BoundingBox::new(Vec3::ZERO, Vec3::splat(150.0)))
        .with_config(PackConfig::new().with_spacing(3.0))
        .with_ingredient(Ingredient::new("filler", Shape::sphere(4.0)).with_count(count))
        .with_ingredient(Ingredient::new("probe_sphere", Shape::sphere(5.0)))
        .with_ingredient(Ingredient::new(
            "probe_rod",
            Shape::cylinder(Vec3::new(0.0, 0.0, -8.0), Vec3::new(0.0, 0.0, 8.0), 2.0),
        ))
        .build()
        .expect("env");
    env.pack(0xC311);
    env
}

fn bench_attempts(c: &mut Criterion) {
    let mut group = c.benchmark_group("placement_attempt");
    for count in [0u32, 400, 1600] {
        let env = crowded(count);
        let orientation = UniformRandomOrientation::new();
        let ctx = PlacementContext {
            grid: env.grid(),
            compartments: env.compartments(),
            packed: env.packed(),
            gradient: None,
            orientation: &orientation,
            rotation_index: 0,
            padding: env.padding(),
            use_periodicity: false,
        };
        let points: Vec<u32> = env.grid().free_points().iter().step_by(97).copied().collect();
        group.throughput(common::elements_throughput(points.len()));

        for probe in ["probe_sphere", "probe_rod"] {
            let id = env.ingredient_id(probe).expect("probe");
            let ingredient = env.ingredient(id);
            group.bench_with_input(BenchmarkId::new(probe, count), &points, |b, points| {
                let mut rng = StdRng::seed_from_u64(7);
                b.iter(|| {
                    let accepted = points
                        .iter()
                        .filter(|&&p| attempt_placement(ingredient, &ctx, p, &mut rng).is_accepted())
                        .count();
                    black_box(accepted);
                });
            });
        }
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = common::default_criterion();
    targets = bench_attempts
}
criterion_main!(benches);
