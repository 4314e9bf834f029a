use cell_pack::prelude::*;
use cell_pack_examples::init_tracing;
use glam::Vec3;

const BINS: usize = 10;

fn main() -> anyhow::Result<()> {
    init_tracing();

    for selection in [
        WeightSelection::RandomWeighted,
        WeightSelection::SubWeighted,
        WeightSelection::MaxWeight,
    ] {
        let mut env = Environment::builder(BoundingBox::new(Vec3::ZERO, Vec3::splat(100.0)))
            .with_config(PackConfig::new().with_spacing(4.0))
            .with_gradient(
                GradientSpec::new(
                    "along_x",
                    GradientMode::AxisLinear {
                        axis: Vec3::X,
                        exponent: 2.0,
                    },
                )
                .with_selection(selection),
            )
            .with_ingredient(
                Ingredient::new("ball", Shape::sphere(4.0))
                    .with_count(300)
                    .with_packing_mode(PackingMode::Gradient("along_x".into())),
            )
            .build()?;
        let result = env.pack(3);

        let mut histogram = [0usize; BINS];
        for instance in &result.instances {
            let bin = ((instance.position.x / 100.0) * BINS as f32) as usize;
            histogram[bin.min(BINS - 1)] += 1;
        }
        println!("{selection:?}: {} placed", result.instances.len());
        for (i, n) in histogram.iter().enumerate() {
            println!("  x {:>3}..{:<3} {}", i * 10, (i + 1) * 10, "#".repeat(n / 2));
        }
    }
    Ok(())
}
