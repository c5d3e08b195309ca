//! Offline global map refinement tool.
//!
//! Loads a submap store, runs the requested refinement stages, and saves
//! the summary plus the refined trajectory and map data.
//!
//! # Usage
//!
//! ```bash
//! # all three stages with default parameters
//! refine-map --map map.json --output results/
//!
//! # custom config, pose-graph optimization only
//! refine-map --map map.json --config refinement.json --output results/ \
//!     --skip-refinement --skip-alignment
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;

use vishva_map::{io, GlobalMapRefinement, RefinementConfig};

#[derive(Parser)]
#[command(name = "refine-map")]
#[command(about = "Refine a submap-based global map offline")]
struct Args {
    /// Submap store JSON file
    #[arg(short, long)]
    map: PathBuf,

    /// Pipeline configuration JSON file (defaults used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for results and diagnostic dumps
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip the submap refinement stage
    #[arg(long)]
    skip_refinement: bool,

    /// Skip the submap alignment stage
    #[arg(long)]
    skip_alignment: bool,

    /// Skip the pose-graph optimization stage
    #[arg(long)]
    skip_pose_graph: bool,

    /// Include initial poses in the exported trajectory
    #[arg(long)]
    save_initial: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> vishva_map::Result<()> {
    let config = match &args.config {
        Some(path) => RefinementConfig::from_json_file(path)?,
        None => RefinementConfig::default(),
    };

    let store = io::load_store(&args.map)?;
    println!("Loaded {} submaps from {}", store.len(), args.map.display());

    let mut pipeline = GlobalMapRefinement::new(store, config)?;

    let stage_dir = |name: &str| -> vishva_map::Result<Option<PathBuf>> {
        match &args.output {
            None => Ok(None),
            Some(base) => {
                let dir = base.join(name);
                fs::create_dir_all(&dir)?;
                Ok(Some(dir))
            }
        }
    };

    if !args.skip_refinement {
        println!("Running submap refinement");
        pipeline.run_submap_refinement(stage_dir("submap_refinement")?.as_deref())?;
    }
    if !args.skip_alignment {
        println!("Running submap alignment");
        pipeline.run_submap_alignment(stage_dir("submap_alignment")?.as_deref())?;
    }
    if !args.skip_pose_graph {
        println!("Running pose-graph optimization");
        pipeline.run_pose_graph_optimization(stage_dir("pose_graph")?.as_deref())?;
    }

    if let Some(output) = &args.output {
        save_all(&pipeline, output, args.save_initial)?;
        println!("Results saved to {}", output.display());
    }

    println!(
        "Done: {} refinement deltas, {} alignment deltas recorded",
        pipeline.summary().refinement().len(),
        pipeline.summary().alignment().len()
    );
    Ok(())
}

fn save_all(
    pipeline: &GlobalMapRefinement,
    output: &Path,
    save_initial: bool,
) -> vishva_map::Result<()> {
    fs::create_dir_all(output)?;
    pipeline.save_results(output, save_initial)?;
    pipeline.save_map_data(output)?;
    Ok(())
}
