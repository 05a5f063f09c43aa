mod config;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pipeline::{InspectArgs, TrainArgs};

/// tabpretrain: self-supervised masked-reconstruction pretraining for tabular data.
#[derive(Parser)]
#[command(name = "tabpretrain", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for pretraining and table inspection.
#[derive(Subcommand)]
enum Command {
    /// Pretrain an autoencoder on a Parquet table.
    Train {
        /// Path to pretrain config TOML file.
        #[arg(long, default_value = "configs/pretrain.toml")]
        config: PathBuf,
        /// Path to the input Parquet table.
        #[arg(long)]
        input: PathBuf,
        /// Output directory for checkpoints, history, importance and weights.
        #[arg(long)]
        output: PathBuf,
        /// Override the number of epochs.
        #[arg(long)]
        epochs: Option<usize>,
        /// Override the random seed.
        #[arg(long)]
        seed: Option<u64>,
        /// Override the number of background loader workers.
        #[arg(long)]
        num_workers: Option<usize>,
    },
    /// Print column statistics from a Parquet table.
    Inspect {
        /// Path to the input Parquet table.
        #[arg(long)]
        input: PathBuf,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            config,
            input,
            output,
            epochs,
            seed,
            num_workers,
        } => pipeline::run_train(TrainArgs {
            config,
            input,
            output,
            epochs,
            seed,
            num_workers,
        }),
        Command::Inspect { input, json } => pipeline::run_inspect(InspectArgs { input, json }),
    }
}
