//! TICA - Main entry point
//!
//! Runs time-lagged independent component analysis on a synthetic,
//! linearly mixed AR(1) process with known relaxation times.

use anyhow::Result;
use clap::{Parser, Subcommand};
use ndarray::{Array1, Array2};
use serde::Serialize;
use tica::prelude::*;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "tica")]
#[command(about = "Time-lagged independent component analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a synthetic mixed AR(1) process
    Ar1 {
        /// Decay constants of the hidden coordinates
        #[arg(long, value_delimiter = ',', default_value = "0.9,0.5,0.1")]
        decay: Vec<f64>,

        /// Number of frames to generate
        #[arg(long, default_value = "20000")]
        steps: usize,

        /// Lag time in frames
        #[arg(long, default_value = "1")]
        lag: usize,

        /// Fixed output dimension
        #[arg(long, conflicts_with = "var_cutoff")]
        dim: Option<usize>,

        /// Cumulative kinetic variance cutoff
        #[arg(long)]
        var_cutoff: Option<f64>,

        /// Scale the output by the commute map instead of the kinetic map
        #[arg(long, conflicts_with = "no_kinetic_map")]
        commute_map: bool,

        /// Disable kinetic map scaling
        #[arg(long)]
        no_kinetic_map: bool,

        /// Use equilibrium-corrected TICA, starting the trajectory out of equilibrium
        #[arg(long)]
        equilibrium: bool,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default configuration as JSON
    Config,
}

/// Result of one analysis run
#[derive(Debug, Serialize)]
struct TicaSummary {
    kind: TicaKind,
    description: String,
    lag: usize,
    dimension: usize,
    eigenvalues: Vec<f64>,
    timescales: Vec<f64>,
    expected_timescales: Vec<f64>,
    cumvar: Vec<f64>,
    output_shape: (usize, usize),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Ar1 {
            decay,
            steps,
            lag,
            dim,
            var_cutoff,
            commute_map,
            no_kinetic_map,
            equilibrium,
            seed,
            json,
        } => {
            let mut config = TicaConfig::with_lag(lag);
            config.dim = dim;
            config.var_cutoff = var_cutoff;
            config.kinetic_map = !no_kinetic_map && !commute_map;
            config.commute_map = commute_map;
            if equilibrium {
                config = config.unscaled();
            }

            let summary = analyze_ar1(&decay, steps, seed, config, equilibrium)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&TicaConfig::default())?);
        }
    }

    Ok(())
}

/// Upper bidiagonal mixing, invertible for any dimension
fn mixing_matrix(dim: usize) -> Array2<f64> {
    Array2::from_shape_fn((dim, dim), |(i, j)| match j.checked_sub(i) {
        Some(0) => 1.0,
        Some(1) => 0.5,
        _ => 0.0,
    })
}

fn analyze_ar1(
    decay: &[f64],
    steps: usize,
    seed: u64,
    config: TicaConfig,
    equilibrium: bool,
) -> Result<TicaSummary> {
    if decay.iter().any(|a| a.abs() >= 1.0) {
        anyhow::bail!("decay constants must lie in (-1, 1)");
    }

    let process = Ar1Process::new(decay.to_vec()).with_mixing(mixing_matrix(decay.len()));
    let data = if equilibrium {
        process.generate_from(Array1::from_elem(decay.len(), 3.0), steps, seed)
    } else {
        process.generate(steps, seed)
    };
    info!("Generated {} frames with {} features", data.nrows(), data.ncols());

    let mut tica = if equilibrium {
        Tica::equilibrium_corrected(config)?
    } else {
        Tica::new(config)?
    };
    tica.estimate(&data)?;

    let projected = tica.transform(data.view())?;
    let dimension = tica.dimension()?;
    let eigenvalues = tica.eigenvalues()?.iter().map(|v| v.re).collect();
    let timescales = tica.timescales()?.to_vec();
    let cumvar = tica.cumvar()?.to_vec();
    info!("{}", tica);

    Ok(TicaSummary {
        kind: tica.kind(),
        description: tica.describe(),
        lag: tica.lag(),
        dimension,
        eigenvalues,
        timescales,
        expected_timescales: process.relaxation_times(tica.lag()).to_vec(),
        cumvar,
        output_shape: projected.dim(),
    })
}

fn print_summary(summary: &TicaSummary) {
    println!("\n{}", summary.description);
    println!("{}", "=".repeat(50));
    println!("Variant:          {:?}", summary.kind);
    println!("Output shape:     {:?}", summary.output_shape);
    println!();
    println!("{:>4} {:>12} {:>14} {:>10}", "#", "eigenvalue", "timescale", "cumvar");
    for (i, ((ev, ts), cv)) in summary
        .eigenvalues
        .iter()
        .zip(&summary.timescales)
        .zip(&summary.cumvar)
        .enumerate()
    {
        let marker = if i < summary.dimension { "*" } else { " " };
        println!("{:>3}{} {:>12.6} {:>14.4} {:>10.4}", i + 1, marker, ev, ts, cv);
    }

    println!("\nExpected relaxation times:");
    for (i, t) in summary.expected_timescales.iter().enumerate() {
        println!("  process {}: {:.4}", i + 1, t);
    }
}
