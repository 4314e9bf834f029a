#![forbid(unsafe_code)]

use cell_pack::prelude::{Environment, PackResult};
use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber; `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second call (tests, repeated demos) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Prints per-ingredient counters and the grid occupancy of a finished run.
pub fn print_summary(env: &Environment, result: &PackResult) {
    println!(
        "seed {}: {} / {} placed in {} iterations{}",
        result.seed,
        result.placed_total(),
        result.target_total(),
        result.iterations,
        if result.cancelled { " (cancelled)" } else { "" }
    );
    println!(
        "grid: {} points, {} free ({:.1}% used), spacing {:.2}",
        result.total_points,
        result.free_points,
        100.0 * (1.0 - result.free_points as f64 / result.total_points.max(1) as f64),
        env.grid().spacing()
    );
    for report in &result.ingredients {
        let ingredient = env.ingredient(report.id);
        println!(
            "  {:<16} {:>5} / {:<5} {:>6} rejections  {:?}  region {:?}",
            report.name,
            report.placed_count,
            report.target_count,
            report.total_rejections,
            report.completion,
            ingredient.region
        );
    }
}
