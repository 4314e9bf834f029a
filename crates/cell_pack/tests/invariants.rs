mod common;

use cell_pack::pack::events::{FnSink, VecSink};
use cell_pack::prelude::*;
use common::{
    cube_box, deepest_shared_point, min_sphere_gap, min_wrapped_sphere_gap, sphere,
};
use glam::Vec3;

/// Box with one cube compartment and an ingredient in each region.
fn layered_env(config: PackConfig) -> Environment {
    Environment::builder(cube_box(100.0))
        .with_config(config)
        .with_compartment("cell", Mesh::cuboid(Vec3::splat(30.0), Vec3::splat(70.0)))
        .with_ingredient(sphere("outside", 4.0, 30))
        .with_ingredient(sphere("inside", 3.0, 15).with_region(PlacementRegion::Interior(1)))
        .with_ingredient(
            Ingredient::new("membrane", Shape::cylinder(Vec3::ZERO, Vec3::new(0.0, 0.0, 4.0), 1.5))
                .with_count(10)
                .with_region(PlacementRegion::Surface(1)),
        )
        .build()
        .expect("env")
}

#[test]
fn free_set_stays_a_partition_and_distances_only_shrink() {
    let mut env = layered_env(PackConfig::new().with_spacing(4.0));
    let mut run = env.start(21);
    let mut commits = 0;
    loop {
        let before = run.environment().grid().distances().to_vec();
        let step = run.step(&mut ());
        let grid = run.environment().grid();
        assert!(grid.free_partition_is_consistent());
        for (p, (&now, &was)) in grid.distances().iter().zip(&before).enumerate() {
            assert!(now <= was, "distance at {p} grew from {was} to {now}");
        }
        match step {
            Step::Placed { .. } => commits += 1,
            Step::Stopped(_) => break,
            _ => {}
        }
    }
    assert!(commits > 0);
}

#[test]
fn instances_conform_to_their_regions() {
    let mut env = layered_env(PackConfig::new().with_spacing(4.0));
    let result = env.pack(8);
    let grid = env.grid();
    for instance in &result.instances {
        let region = env.ingredient(instance.ingredient_id).region;
        let tag = grid.compartment_id(grid.index_from_point(instance.position));
        assert_eq!(tag, region.code(), "instance {instance:?}");
    }
}

#[test]
fn placed_counts_match_instances() {
    let mut env = layered_env(PackConfig::new().with_spacing(4.0));
    let result = env.pack(13);
    for report in &result.ingredients {
        assert_eq!(report.placed_count as usize, result.instances_of(report.id).count());
        assert_eq!(report.placed_count, env.ingredient(report.id).placed_count());
    }
    for (i, instance) in result.instances.iter().enumerate() {
        assert_eq!(instance.id, i);
        if i > 0 {
            assert!(instance.rank > result.instances[i - 1].rank);
        }
    }
}

#[test]
fn spheres_of_mixed_sizes_never_overlap() {
    let radii = [2.0, 3.5, 6.0];
    let mut env = Environment::builder(cube_box(80.0))
        .with_config(PackConfig::new().with_spacing(2.5))
        .with_ingredient(sphere("small", radii[0], 60))
        .with_ingredient(sphere("medium", radii[1], 30))
        .with_ingredient(sphere("large", radii[2], 12))
        .build()
        .expect("env");
    let result = env.pack(99);
    assert!(result.placed_total() > 0);
    let gap = min_sphere_gap(&result, |id| radii[id]);
    assert!(gap >= -1e-6 * 6.0 - 1e-4, "gap {gap}");
}

#[test]
fn mixed_shapes_never_share_volume() {
    let center = Vec3::splat(50.0);
    let mut env = Environment::builder(cube_box(100.0))
        .with_config(PackConfig::new().with_spacing(3.0))
        .with_compartment("vesicle", Mesh::icosphere(center, 25.0, 2))
        .with_ingredient(
            Ingredient::new(
                "rod",
                Shape::cylinder(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, 5.0), 2.0),
            )
            .with_count(20),
        )
        .with_ingredient(
            Ingredient::new("block", Shape::cube(Vec3::new(3.0, 2.0, 1.5))).with_count(20),
        )
        .with_ingredient(
            Ingredient::new(
                "dimer",
                Shape::multi_sphere(
                    vec![Vec3::new(-3.0, 0.0, 0.0), Vec3::new(3.0, 0.0, 0.0)],
                    vec![3.0, 2.5],
                ),
            )
            .with_count(20),
        )
        .with_ingredient(
            Ingredient::new(
                "cargo",
                Shape::multi_sphere(
                    vec![Vec3::new(0.0, -2.0, 0.0), Vec3::new(0.0, 2.0, 0.0)],
                    vec![2.0, 2.0],
                ),
            )
            .with_count(15)
            .with_region(PlacementRegion::Interior(1)),
        )
        .with_ingredient(
            Ingredient::new("channel", Shape::cylinder(Vec3::ZERO, Vec3::new(0.0, 0.0, 6.0), 1.5))
                .with_count(20)
                .with_region(PlacementRegion::Surface(1)),
        )
        .build()
        .expect("env");
    let result = env.pack(31);

    assert!(result.placed_total() >= 20, "{}", result.placed_total());
    let depth = deepest_shared_point(&env, &result);
    assert!(depth <= 1e-3, "instances share volume {depth} deep");
}

#[test]
fn periodic_pack_wraps_without_duplicates() {
    let radius = 4.0;
    let mut env = Environment::builder(cube_box(40.0))
        .with_config(PackConfig::new().with_spacing(2.0).with_periodicity(true))
        .with_ingredient(sphere("ball", radius, 40))
        .build()
        .expect("env");
    let result = env.pack(12);

    assert!(!result.instances.is_empty());
    assert_eq!(result.instances.len() as u64, result.placed_total());
    let gap = min_wrapped_sphere_gap(&result, env.grid().domain(), radius);
    assert!(gap >= -1e-3, "wrapped gap {gap}");

    let packed = env.packed();
    let extent = env.grid().domain().extent();
    let mut ghosts = 0;
    for entry in 0..packed.len() {
        let instance = &result.instances[packed.instance_ref(entry)];
        if packed.is_ghost(entry) {
            ghosts += 1;
            // Images sit a whole box extent away on every shifted axis.
            let shift = (packed.position(entry) - instance.position) / extent;
            assert!(shift.abs_diff_eq(shift.round(), 1e-4), "shift {shift}");
            assert!(shift.abs().max_element() >= 0.999);
        } else {
            assert_eq!(packed.position(entry), instance.position);
        }
    }
    assert_eq!(packed.len() - ghosts, result.instances.len());
    assert!(ghosts > 0);
}

#[test]
fn replay_is_deterministic() {
    let config = PackConfig::new()
        .with_spacing(4.0)
        .with_orientation(OrientationMethod::Halton);
    let mut a = layered_env(config.clone());
    let mut b = layered_env(config);
    let first = a.pack(1234);
    assert_eq!(first, b.pack(1234));
    // Re-running the same environment starts from the cold state again.
    assert_eq!(first, a.pack(1234));
    assert_ne!(first.instances, a.pack(4321).instances);
}

#[test]
fn grid_cache_round_trips_tags_and_distances() {
    let dir = std::env::temp_dir().join(format!("cell_pack_cache_rt_{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("dir");
    let path = dir.join("grid.json");

    let env = layered_env(PackConfig::new().with_spacing(5.0));
    let key = GridCacheKey::new(
        env.grid(),
        env.compartments(),
        env.config().inside_method,
        env.config().surface_method,
    );
    GridCache::capture(key.clone(), env.grid(), env.compartments())
        .save(&path)
        .expect("save");

    let loaded = GridCache::load_matching(&path, &key).expect("load");
    assert_eq!(loaded.positions.as_slice(), env.grid().positions());
    assert_eq!(loaded.compartment_ids.as_slice(), env.grid().compartment_ids());
    let bits = |v: &[f32]| v.iter().map(|d| d.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&loaded.distances), bits(env.grid().initial_distances()));

    let mut other = key.clone();
    other.spacing = 4.0;
    assert!(matches!(
        GridCache::load_matching(&path, &other),
        Err(Error::CacheMismatch { .. })
    ));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn thin_box_gives_single_layer_and_terminates() {
    let mut env = Environment::builder(BoundingBox::new(Vec3::ZERO, Vec3::new(100.0, 100.0, 4.0)))
        .with_config(PackConfig::new().with_spacing(5.0))
        .with_ingredient(sphere("disc", 1.5, 50))
        .build()
        .expect("env");
    assert_eq!(env.grid().dims()[2], 1);
    let result = env.pack(2);
    assert!(result.iterations > 0);
    for instance in &result.instances {
        assert!((1.5..=2.5).contains(&instance.position.z));
    }
}

#[test]
fn oversized_ingredient_is_exhausted_before_placing() {
    let mut env = Environment::builder(cube_box(100.0))
        .with_config(PackConfig::new().with_spacing(5.0))
        .with_ingredient(sphere("giant", 60.0, 1))
        .build()
        .expect("env");
    let mut sink = VecSink::only([PackEventKind::IngredientCompleted]);
    let result = env.pack_with_events(1, &mut sink, &CancellationFlag::new());

    assert!(result.instances.is_empty());
    assert_eq!(result.ingredients[0].completion, Completion::Exhausted);
    assert_eq!(result.ingredients[0].total_rejections, 0);
    assert!(matches!(
        sink.as_slice(),
        [PackEvent::IngredientCompleted {
            completion: Completion::Exhausted,
            placed: 0,
            ..
        }]
    ));
}

#[test]
fn compartment_filling_the_box_leaves_no_exterior() {
    let mut env = Environment::builder(cube_box(100.0))
        .with_config(
            PackConfig::new()
                .with_spacing(10.0)
                .with_inside_method(InsideMethod::FloodFill),
        )
        .with_compartment("all", Mesh::cuboid(Vec3::ZERO, Vec3::splat(100.0)))
        .with_ingredient(sphere("outside", 5.0, 5))
        .with_ingredient(sphere("inside", 5.0, 5).with_region(PlacementRegion::Interior(1)))
        .build()
        .expect("env");
    let grid = env.grid();
    assert!(grid.compartment_ids().iter().all(|&t| t != EXTERIOR));
    assert_eq!(grid.compartment_ids().iter().filter(|&&t| t == -1).count(), 9 * 9 * 9);
    assert!(env.warnings().iter().any(|w| w.context == "outside"));

    let result = env.pack(6);
    assert_eq!(result.report("outside").map(|r| r.placed_count), Some(0));
    assert_eq!(
        result.report("outside").map(|r| r.completion),
        Some(Completion::Exhausted)
    );
    assert!(result.instances.iter().all(|i| i.ingredient_id == 1));
}

#[test]
fn cancellation_keeps_committed_work() {
    let mut env = Environment::builder(cube_box(100.0))
        .with_config(PackConfig::new().with_spacing(5.0))
        .with_ingredient(sphere("ball", 4.0, 50))
        .build()
        .expect("env");
    let cancel = CancellationFlag::new();
    let trigger = cancel.clone();
    let mut placed = 0;
    let mut sink = FnSink::new(|event| {
        if let PackEvent::PlacementMade { .. } = event {
            placed += 1;
            if placed == 3 {
                trigger.cancel();
            }
        }
    });
    let result = env.pack_with_events(17, &mut sink, &cancel);

    assert!(result.cancelled);
    assert_eq!(result.instances.len(), 3);
    assert_eq!(env.instances().len(), 3);
    assert!(!result.is_complete());
}

#[test]
fn run_emits_lifecycle_events() {
    let mut env = Environment::builder(cube_box(60.0))
        .with_config(PackConfig::new().with_spacing(4.0))
        .with_ingredient(sphere("ball", 4.0, 4))
        .build()
        .expect("env");
    let mut sink = VecSink::new();
    let result = env.pack_with_events(3, &mut sink, &CancellationFlag::new());
    let events = sink.into_inner();

    assert!(matches!(events.first(), Some(PackEvent::RunStarted { seed: 3, .. })));
    assert!(matches!(events.last(), Some(PackEvent::RunFinished { .. })));
    let placements = events
        .iter()
        .filter(|e| e.kind() == PackEventKind::PlacementMade)
        .count();
    assert_eq!(placements, result.instances.len());
}
