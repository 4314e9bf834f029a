mod common;

use std::collections::BTreeMap;
use std::hint::black_box;

use cell_pack::prelude::{
    tag_grid, BoundingBox, Compartment, Grid, GridStyle, InsideMethod, Mesh, SurfaceMethod,
};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use glam::Vec3;

fn domain() -> BoundingBox {
    BoundingBox::new(Vec3::ZERO, Vec3::splat(200.0))
}

fn cell() -> Compartment {
    Compartment::new(1, "cell", Mesh::icosphere(Vec3::splat(100.0), 70.0, 3)).expect("mesh")
}

fn bench_tagging(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_tagging");
    let grid = Grid::new(domain(), 4.0, GridStyle::Linspace).expect("grid");
    group.throughput(common::elements_throughput(grid.len()));

    for (label, inside, surface) in [
        ("ray_cast_3", InsideMethod::RayCast { rays: 3 }, SurfaceMethod::VoxelPierce),
        ("ray_cast_1", InsideMethod::RayCast { rays: 1 }, SurfaceMethod::VoxelPierce),
        ("flood_fill", InsideMethod::FloodFill, SurfaceMethod::NearestVertex),
    ] {
        group.bench_function(label, |b| {
            b.iter_batched(
                || (grid.clone(), vec![cell()]),
                |(mut grid, mut compartments)| {
                    tag_grid(&mut grid, &mut compartments, inside, surface).expect("tagging");
                    black_box(grid.n_free());
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_distance_updates(c: &mut Criterion) {
    let grid = Grid::new(domain(), 2.0, GridStyle::Linspace).expect("grid");
    let centers: Vec<Vec3> = (0..64)
        .map(|i| {
            let t = i as f32 / 64.0;
            Vec3::new(20.0 + 160.0 * t, 100.0 + 60.0 * (t * 9.0).sin(), 100.0)
        })
        .collect();

    let mut group = c.benchmark_group("grid_distance_updates");
    group.throughput(common::elements_throughput(centers.len()));
    group.bench_function("sphere_r6_pad4", |b| {
        b.iter_batched(
            || grid.clone(),
            |mut grid| {
                for &center in &centers {
                    let mut inside = BTreeMap::new();
                    let mut near = BTreeMap::new();
                    grid.for_each_point_in_sphere(center, 10.0, |p, d| {
                        let sd = d - 6.0;
                        if sd < 0.0 {
                            inside.insert(p, sd);
                        } else {
                            near.insert(p, sd);
                        }
                    });
                    grid.update_distances(&inside, &near);
                }
                black_box(grid.n_free());
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group! {
    name = benches;
    config = common::default_criterion();
    targets = bench_tagging, bench_distance_updates
}
criterion_main!(benches);
