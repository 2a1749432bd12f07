use std::path::PathBuf;

use candle_core::Device;
use clap::Parser;
use ghost::{run_validation, GhostError, ValidationConfig};

fn main() {
    if let Err(err) = run() {
        eprintln!("validation failed: {}", err);
        std::process::exit(1);
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Compare ghost per-sample gradients against per-sample backward passes",
    long_about = None
)]
struct Args {
    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Path to a TOML or JSON validation config (defaults to the built-in scenario)"
    )]
    config: Option<PathBuf>,

    #[arg(long, help = "Override data.seed")]
    seed: Option<u64>,

    #[arg(long, help = "Override data.batch_size")]
    batch_size: Option<usize>,

    #[arg(long, help = "Override the maximum allowed absolute difference")]
    tolerance: Option<f64>,

    #[arg(long, help = "Print both gradient matrices")]
    print_grads: bool,
}

fn run() -> Result<(), GhostError> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ValidationConfig::from_path(path)?,
        None => ValidationConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.data.seed = seed;
    }
    if let Some(batch_size) = args.batch_size {
        config.data.batch_size = batch_size;
    }
    if let Some(tolerance) = args.tolerance {
        config.tolerance = tolerance;
    }

    let report = run_validation(&config, &Device::Cpu)?;

    println!("Ghost gradients shape: {:?}", report.ghost.dims());
    println!("Reference gradients shape: {:?}", report.reference.dims());
    println!("Trainable parameters: {}", report.parameter_count);
    if args.print_grads {
        println!("Ghost gradients: {}\n", report.ghost);
        println!("Reference gradients: {}\n", report.reference);
    }
    println!(
        "Timing: ghost={:.3?} reference={:.3?}",
        report.ghost_elapsed, report.reference_elapsed
    );
    println!("Max difference: {:e}", report.comparison.max_abs_diff);

    if !report.passed() {
        return Err(GhostError::Validation(vec![format!(
            "max difference {:e} exceeds tolerance {:e}",
            report.comparison.max_abs_diff, report.tolerance
        )]));
    }
    println!("Done");
    Ok(())
}
