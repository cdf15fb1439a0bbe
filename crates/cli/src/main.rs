//! NEO Risk CLI
//!
//! Trains, evaluates and inspects the collision-risk scoring model, scores
//! single objects and generates synthetic datasets.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{dataset, evaluate, inspect, score, train};
use risk_lib::synthetic::GenerationMode;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// NEO Risk CLI
#[derive(Parser)]
#[command(name = "neorisk")]
#[command(author, version, about = "CLI for NEO collision-risk scoring", long_about = None)]
pub struct Cli {
    /// Artifact directory (can also be set via NEORISK_ARTIFACT_DIR env var)
    #[arg(long, global = true, env = "NEORISK_ARTIFACT_DIR")]
    pub artifact_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Sampling strategy for generated datasets
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ModeArg {
    /// Stratified over risk bands
    #[default]
    Balanced,
    /// Straight from the population distributions
    Unbiased,
}

impl From<ModeArg> for GenerationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Balanced => GenerationMode::Balanced,
            ModeArg::Unbiased => GenerationMode::Unbiased,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a model on synthetic data and save it
    Train {
        /// Number of synthetic samples
        #[arg(long, default_value_t = 5000)]
        samples: usize,

        /// Maximum training epochs
        #[arg(long, default_value_t = 150)]
        epochs: usize,

        /// Random seed for data and initialization
        #[arg(long)]
        seed: Option<u64>,

        /// Sampling strategy
        #[arg(long, value_enum, default_value_t = ModeArg::Balanced)]
        mode: ModeArg,

        /// Train without writing the artifact
        #[arg(long)]
        no_save: bool,
    },

    /// Evaluate the saved model on a fresh test set
    Evaluate {
        /// Number of test samples
        #[arg(long, default_value_t = 1000)]
        samples: usize,

        /// Seed for the test set
        #[arg(long, default_value_t = 1337)]
        seed: u64,

        /// Sampling strategy
        #[arg(long, value_enum, default_value_t = ModeArg::Unbiased)]
        mode: ModeArg,
    },

    /// Score one object
    Score {
        /// Estimated diameter in meters
        #[arg(long)]
        size: f64,

        /// Relative velocity in km/s
        #[arg(long)]
        velocity: f64,

        /// Miss distance in AU
        #[arg(long)]
        miss_distance: f64,

        /// Potentially Hazardous Asteroid
        #[arg(long)]
        pha: bool,

        /// Show features and oracle factors
        #[arg(long)]
        explain: bool,

        /// Train a bootstrap model when none is saved
        #[arg(long)]
        train: bool,
    },

    /// Show metadata of the saved model
    Inspect,

    /// Generate a synthetic dataset
    Dataset {
        /// Number of samples
        #[arg(long, default_value_t = 1000)]
        samples: usize,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Sampling strategy
        #[arg(long, value_enum, default_value_t = ModeArg::Balanced)]
        mode: ModeArg,

        /// Write samples as JSON to this file
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

const DEFAULT_SEED: u64 = 42;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = config::Config::load()?;
    let artifact_dir = config.artifact_dir(cli.artifact_dir);

    match cli.command {
        Commands::Train {
            samples,
            epochs,
            seed,
            mode,
            no_save,
        } => {
            let options = train::TrainOptions {
                samples,
                epochs,
                seed: config.seed(seed, DEFAULT_SEED),
                mode: mode.into(),
                save: !no_save,
            };
            train::run(&artifact_dir, options, cli.format).await?;
        }
        Commands::Evaluate {
            samples,
            seed,
            mode,
        } => {
            evaluate::run(&artifact_dir, samples, seed, mode.into(), cli.format).await?;
        }
        Commands::Score {
            size,
            velocity,
            miss_distance,
            pha,
            explain,
            train: allow_training,
        } => {
            let params = risk_lib::models::ObjectParams::new(size, velocity, miss_distance, pha);
            score::run(&artifact_dir, params, explain, allow_training, cli.format).await?;
        }
        Commands::Inspect => {
            inspect::run(&artifact_dir, cli.format).await?;
        }
        Commands::Dataset {
            samples,
            seed,
            mode,
            output,
        } => {
            let seed = config.seed(seed, DEFAULT_SEED);
            dataset::run(samples, seed, mode.into(), output, cli.format).await?;
        }
    }

    Ok(())
}
