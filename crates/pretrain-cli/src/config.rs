//! TOML config loading for the pretraining CLI.
//!
//! Deserializes `configs/pretrain.toml`, which has `[pretrain]` and
//! `[network]` sections, then merges with CLI overrides.

use std::path::Path;

use pretrain::{PretrainConfig, TabularAutoencoderConfig};
use serde::Deserialize;
use tabular::FeatureLayout;

/// Top-level structure matching `configs/pretrain.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct PretrainToml {
    /// Training loop parameters.
    #[serde(default)]
    pub pretrain: PretrainConfig,
    /// Architecture hyperparameters for the reference autoencoder.
    #[serde(default)]
    pub network: NetworkOverrides,
}

/// Optional overrides for `TabularAutoencoderConfig` fields.
///
/// The categorical layout always comes from the dataset and
/// `pretraining_ratio` from `[pretrain]`; only sizes can be set here.
#[derive(Debug, Default, Deserialize)]
pub struct NetworkOverrides {
    /// Embedding width per categorical column.
    pub cat_emb_dim: Option<usize>,
    /// Hidden layer width.
    pub n_hidden: Option<usize>,
    /// Linear layers in each of the encoder and decoder.
    pub n_layers: Option<usize>,
    pub dropout: Option<f64>,
}

/// Load and deserialize a `PretrainToml` from a TOML file.
pub fn load_pretrain_toml(path: &Path) -> anyhow::Result<PretrainToml> {
    let contents = std::fs::read_to_string(path)?;
    let config: PretrainToml = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "Loaded pretrain config");
    Ok(config)
}

/// Build the autoencoder config for a dataset layout.
///
/// Priority chain: `TabularAutoencoderConfig` defaults < `[network]` values.
pub fn build_network_config(
    layout: &FeatureLayout,
    overrides: &NetworkOverrides,
    pretrain: &PretrainConfig,
) -> TabularAutoencoderConfig {
    let mut config = TabularAutoencoderConfig::from_pretrain_config(layout, pretrain);
    if let Some(n) = overrides.cat_emb_dim {
        config.cat_emb_dim = n;
    }
    if let Some(n) = overrides.n_hidden {
        config.n_hidden = n;
    }
    if let Some(n) = overrides.n_layers {
        config.n_layers = n;
    }
    if let Some(p) = overrides.dropout {
        config.dropout = p;
    }
    config
}
