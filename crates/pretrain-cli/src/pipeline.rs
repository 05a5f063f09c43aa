//! Pretraining pipeline and dataset inspection.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use burn::backend::ndarray::{NdArray, NdArrayDevice};
use burn::backend::Autodiff;
use burn::config::Config;
use burn::module::{AutodiffModule, Module};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use pretrain::{Devices, PretrainOutcome, Pretrainer, TabularAutoencoder};
use tabular::{FeatureLayout, TabularReader};

use crate::config::{build_network_config, load_pretrain_toml};

type TrainBackend = Autodiff<NdArray<f32>>;

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    /// Path to the pretrain config TOML file.
    pub config: PathBuf,
    /// Input Parquet table.
    pub input: PathBuf,
    /// Output directory for checkpoints, history, importance and weights.
    pub output: PathBuf,
    /// Optional CLI override for the number of epochs.
    pub epochs: Option<usize>,
    /// Optional CLI override for the random seed.
    pub seed: Option<u64>,
    /// Optional CLI override for background loader workers.
    pub num_workers: Option<usize>,
}

/// Arguments for the `inspect` subcommand.
#[derive(Debug)]
pub struct InspectArgs {
    /// Input Parquet table.
    pub input: PathBuf,
    /// Output as JSON instead of human-readable text.
    pub json: bool,
}

/// Pretrain the reference autoencoder on a Parquet table and write results.
///
/// Output layout:
/// ```text
/// {output}/checkpoints/epoch_{k}.mpk
/// {output}/history.json
/// {output}/importance.json
/// {output}/network.json
/// {output}/model.mpk
/// ```
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Load config, CLI overrides take highest priority
    let toml = load_pretrain_toml(&args.config)?;
    let mut config = toml.pretrain;
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(n) = args.num_workers {
        config.num_workers = n;
    }

    // 2. Load dataset
    let dataset = Arc::new(TabularReader::read_all(&args.input)?);
    let layout = FeatureLayout::of(&dataset);
    let network_config = build_network_config(&layout, &toml.network, &config);
    tracing::info!(
        rows = dataset.n_rows(),
        cols = dataset.n_cols(),
        categorical = layout.cat_idxs.len(),
        embedded_dim = network_config.embedded_dim(),
        "Loaded dataset"
    );

    // 3. Train
    let devices = Devices::<TrainBackend>::cpu_only(NdArrayDevice::Cpu);
    let outcome = Pretrainer::<TrainBackend, TabularAutoencoder<TrainBackend>>::new(&config, devices)
        .fit(Arc::clone(&dataset), |_, _, device| network_config.init(device))?;

    // 4. Write outputs
    std::fs::create_dir_all(&args.output)?;
    let checkpoint_count = write_outcome(&outcome, &args.output)?;
    network_config.save(args.output.join("network.json"))?;

    // 5. Print summary
    let elapsed = start.elapsed();
    println!("\n--- Pretraining Summary ---");
    println!("Epochs run: {}/{}", outcome.history.len(), config.epochs);
    println!("Stop reason: {}", outcome.stop_reason);
    if let Some(last) = outcome.history.last() {
        println!("Final train loss: {:.5}", last.train_loss().unwrap_or(f64::NAN));
        if let Some(valid) = last.valid_loss() {
            println!("Final valid loss: {valid:.5}");
        }
    }
    println!("Checkpoints: {checkpoint_count}");
    println!("Feature importance:");
    for (name, value) in outcome.importance.iter() {
        println!("  {name:<24} {value:.4}");
    }
    println!("Output: {}", args.output.display());
    println!("Elapsed: {:.1}s", elapsed.as_secs_f64());

    Ok(())
}

/// Write checkpoints, history, importance and final weights.
///
/// Returns the number of checkpoint files written.
fn write_outcome(
    outcome: &PretrainOutcome<TabularAutoencoder<TrainBackend>>,
    output: &std::path::Path,
) -> anyhow::Result<usize> {
    let checkpoint_dir = output.join("checkpoints");
    if !outcome.checkpoints.is_empty() {
        std::fs::create_dir_all(&checkpoint_dir)?;
    }
    for checkpoint in outcome.checkpoints.iter() {
        let path = checkpoint_dir.join(format!("epoch_{}.mpk", checkpoint.epoch()));
        std::fs::write(&path, checkpoint.bytes())?;
        tracing::debug!(path = %path.display(), "Wrote checkpoint");
    }

    serde_json::to_writer_pretty(
        std::fs::File::create(output.join("history.json"))?,
        &outcome.history,
    )?;
    serde_json::to_writer_pretty(
        std::fs::File::create(output.join("importance.json"))?,
        &outcome.importance,
    )?;

    let model_path = output.join("model");
    outcome
        .network
        .valid()
        .save_file(&model_path, &NamedMpkFileRecorder::<FullPrecisionSettings>::new())
        .map_err(|e| anyhow::anyhow!("Failed to save final model: {e}"))?;

    tracing::info!(
        checkpoints = outcome.checkpoints.len(),
        output = %output.display(),
        "Wrote pretraining outputs"
    );
    Ok(outcome.checkpoints.len())
}

/// Print column statistics from a Parquet table.
pub fn run_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let dataset = TabularReader::read_all(&args.input)?;
    let summary = dataset.summary();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("--- Table Summary ---");
    println!("File: {}", args.input.display());
    println!("Rows: {}", dataset.n_rows());
    println!("Columns: {}", dataset.n_cols());
    for column in &summary {
        let levels = column
            .levels
            .map(|n| format!(", {n} levels"))
            .unwrap_or_default();
        println!(
            "  {:<24} {:<12} missing {}{levels}",
            column.name,
            column.kind.to_string(),
            column.missing
        );
    }

    Ok(())
}
