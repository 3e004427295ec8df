//! dp-tradeoff CLI entry point
//!
//! Runs single-query simulations or a full analysis of a trade dataset.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dp_tradeoff::experiment::{run_analysis, run_query};
use dp_tradeoff::noise::{noise_rng, Mechanism, PrivacyParams, QueryDescriptor};
use dp_tradeoff::query::load_trades;
use dp_tradeoff::{report, ExperimentConfig};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "dp-tradeoff")]
#[command(version)]
#[command(about = "Simulate the privacy/utility trade-off of Laplace and Gaussian noise")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate repeated noisy releases of a single aggregate
    Simulate {
        /// Laplace or Gaussian
        #[arg(short, long, default_value = "Laplace")]
        mechanism: String,

        /// True aggregate value
        #[arg(long, allow_hyphen_values = true)]
        true_value: f64,

        /// Maximum change from adding or removing one record
        #[arg(short, long)]
        sensitivity: f64,

        /// Privacy budget (repeat for several)
        #[arg(short, long, required = true, num_args = 1..)]
        epsilon: Vec<f64>,

        /// Failure probability, required for Gaussian
        #[arg(short, long)]
        delta: Option<f64>,

        /// Number of noisy releases
        #[arg(short = 'n', long, default_value = "1000")]
        runs: usize,

        /// Seed for reproducible draws
        #[arg(long, env = "DP_TRADEOFF_SEED")]
        seed: Option<u64>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Run the full analysis over a trade CSV
    Analyze {
        /// Path to the trades CSV
        #[arg(short = 'i', long)]
        data: PathBuf,

        /// Path to a TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seed for reproducible draws (overrides the config file)
        #[arg(long, env = "DP_TRADEOFF_SEED")]
        seed: Option<u64>,

        /// Write the volume result rows to this CSV for plotting
        #[arg(long)]
        export: Option<PathBuf>,

        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Print a configuration file with every default
    ExampleConfig,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::ExampleConfig => {
            print!("{}", ExperimentConfig::example_toml());
        }

        Commands::Simulate {
            mechanism,
            true_value,
            sensitivity,
            epsilon,
            delta,
            runs,
            seed,
            json,
        } => {
            let mechanism: Mechanism = mechanism.parse()?;
            let query = QueryDescriptor::new(mechanism, true_value, sensitivity);
            let mut rng = noise_rng(seed);

            let mut rows = Vec::with_capacity(epsilon.len());
            for eps in epsilon {
                let params = match mechanism {
                    Mechanism::Laplace => PrivacyParams::pure(eps),
                    Mechanism::Gaussian => PrivacyParams { epsilon: eps, delta },
                };
                rows.push(run_query(&query, &params, runs, &mut rng)?);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("True value: {}", report::format_grouped(true_value, 0));
                println!("{}", report::results_table(&rows));
            }
        }

        Commands::Analyze {
            data,
            config,
            seed,
            export,
            json,
        } => {
            let mut config = match &config {
                Some(path) => ExperimentConfig::from_file(path)
                    .with_context(|| format!("Failed to load config from {}", path.display()))?,
                None => ExperimentConfig::default(),
            };
            if seed.is_some() {
                config.seed = seed;
            }

            let trades = load_trades(&data)
                .with_context(|| format!("Failed to load trades from {}", data.display()))?;
            let mut rng = noise_rng(config.seed);
            let analysis = run_analysis(&trades, &config, &mut rng)?;

            if let Some(path) = export {
                let file = File::create(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                report::write_results_csv(&analysis.volume.rows, file)?;
                info!("Wrote {} result rows to {}", analysis.volume.rows.len(), path.display());
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                print!("{}", report::render_analysis(&analysis));
            }
        }
    }

    Ok(())
}
