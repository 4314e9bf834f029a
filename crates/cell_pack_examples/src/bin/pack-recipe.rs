//! Packs a JSON recipe and writes the result as JSON.
//!
//! Usage:
//!   pack-recipe recipe.json --meshes meshes/ --seed 7 --out result.json
//!   pack-recipe recipe.json --grid-cache grid.json   Reuse tagging across runs

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::Context;
use cell_pack::prelude::*;
use cell_pack_examples::{init_tracing, print_summary};
use clap::Parser;

#[derive(Parser)]
#[command(name = "pack-recipe")]
#[command(about = "Pack a cell_pack recipe and write the placed instances as JSON")]
struct Args {
    /// Recipe file
    recipe: PathBuf,

    /// Directory mesh paths in the recipe are resolved against
    #[arg(long, default_value = ".")]
    meshes: PathBuf,

    /// Random seed
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Grid spacing (default: derived from the smallest ingredient)
    #[arg(long)]
    spacing: Option<f32>,

    /// Grid cache file, read when it matches and written after tagging
    #[arg(long)]
    grid_cache: Option<PathBuf>,

    /// Wrap placements across box faces
    #[arg(long)]
    periodic: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let recipe = Recipe::from_path(&args.recipe)
        .with_context(|| format!("loading {}", args.recipe.display()))?;
    let store = JsonMeshStore::new(&args.meshes);

    let mut config = PackConfig::new()
        .with_periodicity(args.periodic)
        .with_progress(500);
    if let Some(spacing) = args.spacing {
        config = config.with_spacing(spacing);
    }
    if let Some(path) = &args.grid_cache {
        config = config.with_grid_file(path);
    }

    let mut env = Environment::from_recipe(&recipe, &store, config)?;
    let result = env.pack(args.seed);
    print_summary(&env, &result);

    match &args.out {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            write_result(JsonWriter::new(BufWriter::new(file)), args.pretty, &result)?;
        }
        None => write_result(JsonWriter::new(io::stdout().lock()), args.pretty, &result)?,
    }
    Ok(())
}

fn write_result<W: io::Write>(writer: JsonWriter<W>, pretty: bool, result: &PackResult) -> anyhow::Result<()> {
    let mut writer = if pretty { writer.pretty() } else { writer };
    writer.write(result)?;
    Ok(())
}
