use cell_pack::pack::events::{FnSink, MultiSink};
use cell_pack::prelude::*;
use cell_pack_examples::{init_tracing, print_summary};
use glam::Vec3;

fn main() -> anyhow::Result<()> {
    init_tracing();

    let center = Vec3::splat(100.0);
    let mut env = Environment::builder(BoundingBox::new(Vec3::ZERO, Vec3::splat(200.0)))
        .with_config(PackConfig::new().with_spacing(3.0))
        .with_compartment("cell", Mesh::icosphere(center, 80.0, 3))
        .with_child_compartment("nucleus", Mesh::icosphere(center, 30.0, 2), 1)
        .with_ingredient(Ingredient::new("serum", Shape::sphere(5.0)).with_count(150))
        .with_ingredient(
            Ingredient::new("ribosome", Shape::sphere(6.0))
                .with_count(120)
                .with_region(PlacementRegion::Interior(1)),
        )
        .with_ingredient(
            Ingredient::new(
                "actin",
                Shape::cylinder(Vec3::new(0.0, 0.0, -10.0), Vec3::new(0.0, 0.0, 10.0), 2.0),
            )
            .with_count(60)
            .with_region(PlacementRegion::Interior(1))
            .with_packing_mode(PackingMode::Close),
        )
        .with_ingredient(
            Ingredient::new(
                "channel",
                Shape::cylinder(Vec3::ZERO, Vec3::new(0.0, 0.0, 8.0), 2.5),
            )
            .with_count(80)
            .with_region(PlacementRegion::Surface(1)),
        )
        .with_ingredient(
            Ingredient::new("histone", Shape::sphere(3.0))
                .with_count(60)
                .with_region(PlacementRegion::Interior(2)),
        )
        .build()?;

    let mut rejected = 0usize;
    let mut sinks: MultiSink<Box<dyn EventSink + '_>> = MultiSink::new();
    sinks.push(Box::new(FnSink::new(|event| {
        if let PackEvent::IngredientCompleted {
            name,
            completion,
            placed,
            target,
            ..
        } = event
        {
            println!("{name}: {completion:?} at {placed}/{target}");
        }
    })));
    sinks.push(Box::new(FnSink::new(|event| {
        if let PackEvent::AttemptRejected { .. } = event {
            rejected += 1;
        }
    })));
    let result = env.pack_with_events(7, &mut sinks, &CancellationFlag::new());
    drop(sinks);

    print_summary(&env, &result);
    println!("{rejected} rejected attempts");
    Ok(())
}
