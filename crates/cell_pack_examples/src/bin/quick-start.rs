use cell_pack::prelude::*;
use cell_pack_examples::{init_tracing, print_summary};
use glam::Vec3;

fn main() -> anyhow::Result<()> {
    init_tracing();

    // Three sphere sizes in an empty 200 Å box.
    let mut env = Environment::builder(BoundingBox::new(Vec3::ZERO, Vec3::splat(200.0)))
        .with_config(PackConfig::new().with_progress(50))
        .with_ingredient(Ingredient::new("small", Shape::sphere(4.0)).with_count(300))
        .with_ingredient(Ingredient::new("medium", Shape::sphere(8.0)).with_count(80))
        .with_ingredient(
            Ingredient::new("large", Shape::sphere(16.0))
                .with_count(10)
                .with_priority(-1.0),
        )
        .build()?;

    let result = env.pack(42);
    print_summary(&env, &result);
    Ok(())
}
