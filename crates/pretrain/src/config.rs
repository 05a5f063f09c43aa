//! Pretraining configuration.

use serde::{Deserialize, Serialize};

use crate::error::{PretrainError, Result};

/// Where training runs. Resolved once before the first epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceChoice {
    /// Accelerator if the backend offers one, CPU otherwise.
    Auto,
    Cpu,
    /// Accelerator; setup fails if the backend has none.
    Accelerator,
}

impl std::fmt::Display for DeviceChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Accelerator => write!(f, "accelerator"),
        }
    }
}

/// Quantity watched by early stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarlyStoppingMonitor {
    ValidLoss,
    TrainLoss,
}

/// Pretraining configuration loaded from TOML.
///
/// Read-only for the lifetime of a run; the trainer keeps its own copy so
/// callers can reuse theirs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PretrainConfig {
    /// Optimizer name: `adam`, `adamw` or `sgd`.
    #[serde(default = "default_optimizer")]
    pub optimizer: String,

    /// Base learning rate.
    #[serde(default = "default_learn_rate")]
    pub learn_rate: f64,

    /// Learning-rate scheduler: `step`, `reduce_on_plateau`, or absent.
    #[serde(default)]
    pub lr_scheduler: Option<String>,

    /// Epochs between decays (`step`), or plateau patience (`reduce_on_plateau`).
    #[serde(default = "default_step_size")]
    pub step_size: usize,

    /// Multiplicative decay applied by the scheduler.
    #[serde(default = "default_lr_decay")]
    pub lr_decay: f64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Drop the trailing partial training batch.
    #[serde(default)]
    pub drop_last: bool,

    #[serde(default = "default_epochs")]
    pub epochs: usize,

    #[serde(default = "default_device")]
    pub device: DeviceChoice,

    /// Fraction of rows held out for validation, in `[0, 1)`.
    #[serde(default)]
    pub valid_split: f64,

    /// Fraction of feature values obfuscated per forward pass.
    #[serde(default = "default_pretraining_ratio")]
    pub pretraining_ratio: f64,

    /// Epochs between in-memory checkpoints. 0 disables checkpointing.
    #[serde(default = "default_checkpoint_epochs")]
    pub checkpoint_epochs: usize,

    /// Global gradient-norm threshold. Absent disables clipping.
    #[serde(default)]
    pub clip_value: Option<f64>,

    #[serde(default)]
    pub early_stopping: bool,

    #[serde(default = "default_early_stopping_monitor")]
    pub early_stopping_monitor: EarlyStoppingMonitor,

    /// Relative loss change above which an epoch counts as "no improvement".
    #[serde(default)]
    pub early_stopping_tolerance: f64,

    /// Consecutive non-improving epochs before stopping.
    #[serde(default)]
    pub early_stopping_patience: usize,

    /// Rows sampled for feature importance. Absent samples every row, capped
    /// at [`IMPORTANCE_SAMPLE_CAP`](crate::training::importance::IMPORTANCE_SAMPLE_CAP).
    #[serde(default)]
    pub importance_sample_size: Option<usize>,

    /// Background batch-resolution workers. 0 resolves on the training thread.
    #[serde(default)]
    pub num_workers: usize,

    /// Log per-epoch summaries at info level.
    #[serde(default)]
    pub verbose: bool,

    /// Seed for splitting, shuffling, sampling and backend randomness.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_optimizer() -> String {
    "adam".to_string()
}
fn default_learn_rate() -> f64 {
    2e-2
}
fn default_step_size() -> usize {
    10
}
fn default_lr_decay() -> f64 {
    0.1
}
fn default_batch_size() -> usize {
    256
}
fn default_epochs() -> usize {
    5
}
fn default_device() -> DeviceChoice {
    DeviceChoice::Auto
}
fn default_pretraining_ratio() -> f64 {
    0.5
}
fn default_checkpoint_epochs() -> usize {
    10
}
fn default_early_stopping_monitor() -> EarlyStoppingMonitor {
    EarlyStoppingMonitor::ValidLoss
}

impl Default for PretrainConfig {
    fn default() -> Self {
        Self {
            optimizer: default_optimizer(),
            learn_rate: default_learn_rate(),
            lr_scheduler: None,
            step_size: default_step_size(),
            lr_decay: default_lr_decay(),
            batch_size: default_batch_size(),
            drop_last: false,
            epochs: default_epochs(),
            device: default_device(),
            valid_split: 0.0,
            pretraining_ratio: default_pretraining_ratio(),
            checkpoint_epochs: default_checkpoint_epochs(),
            clip_value: None,
            early_stopping: false,
            early_stopping_monitor: default_early_stopping_monitor(),
            early_stopping_tolerance: 0.0,
            early_stopping_patience: 0,
            importance_sample_size: None,
            num_workers: 0,
            verbose: false,
            seed: None,
        }
    }
}

impl PretrainConfig {
    /// Reject out-of-range values; warn on legal but suspicious ones.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PretrainError::InvalidConfig("batch_size must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.valid_split) {
            return Err(PretrainError::InvalidConfig(format!(
                "valid_split must be in [0, 1), got {}",
                self.valid_split
            )));
        }
        if !(0.0..=1.0).contains(&self.pretraining_ratio) {
            return Err(PretrainError::InvalidConfig(format!(
                "pretraining_ratio must be in [0, 1], got {}",
                self.pretraining_ratio
            )));
        }
        if !(self.learn_rate.is_finite() && self.learn_rate > 0.0) {
            return Err(PretrainError::InvalidConfig(format!(
                "learn_rate must be positive, got {}",
                self.learn_rate
            )));
        }
        if let Some(clip) = self.clip_value {
            if !(clip.is_finite() && clip > 0.0) {
                return Err(PretrainError::InvalidConfig(format!(
                    "clip_value must be positive, got {clip}"
                )));
            }
        }
        if self.importance_sample_size == Some(0) {
            return Err(PretrainError::InvalidConfig(
                "importance_sample_size must be > 0 when set".into(),
            ));
        }

        if self.early_stopping
            && self.early_stopping_monitor == EarlyStoppingMonitor::ValidLoss
            && self.valid_split == 0.0
        {
            tracing::warn!(
                "early_stopping monitors valid_loss but valid_split = 0; falling back to training loss"
            );
        }
        if self.early_stopping && self.early_stopping_patience == 0 {
            tracing::warn!("early_stopping_patience = 0; training stops at the first non-improving epoch");
        }
        if self.pretraining_ratio == 0.0 {
            tracing::warn!("pretraining_ratio = 0; no values are obfuscated and the training loss is always 0");
        }
        Ok(())
    }

    /// True when early stopping should read the validation loss.
    pub fn monitors_valid_loss(&self) -> bool {
        self.early_stopping_monitor == EarlyStoppingMonitor::ValidLoss && self.valid_split > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let cfg = PretrainConfig::default();
        assert_eq!(cfg.optimizer, "adam");
        assert!((cfg.learn_rate - 2e-2).abs() < 1e-12);
        assert!(cfg.lr_scheduler.is_none());
        assert_eq!(cfg.batch_size, 256);
        assert_eq!(cfg.epochs, 5);
        assert_eq!(cfg.device, DeviceChoice::Auto);
        assert_eq!(cfg.checkpoint_epochs, 10);
        assert!(cfg.clip_value.is_none());
        assert!(!cfg.early_stopping);
        assert_eq!(cfg.early_stopping_monitor, EarlyStoppingMonitor::ValidLoss);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
            epochs = 12
            lr_scheduler = "step"
            device = "cpu"
            early_stopping_monitor = "train_loss"
            clip_value = 1.5
        "#;
        let cfg: PretrainConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.epochs, 12);
        assert_eq!(cfg.lr_scheduler.as_deref(), Some("step"));
        assert_eq!(cfg.device, DeviceChoice::Cpu);
        assert_eq!(cfg.early_stopping_monitor, EarlyStoppingMonitor::TrainLoss);
        assert_eq!(cfg.clip_value, Some(1.5));
        // Defaults for unspecified fields
        assert_eq!(cfg.batch_size, 256);
        assert!((cfg.pretraining_ratio - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_validate_rejects_bad_valid_split() {
        let cfg = PretrainConfig {
            valid_split: 1.0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(PretrainError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let cfg = PretrainConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_clip() {
        let cfg = PretrainConfig {
            clip_value: Some(0.0),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_monitor_falls_back_without_valid_split() {
        let cfg = PretrainConfig {
            early_stopping: true,
            valid_split: 0.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
        assert!(!cfg.monitors_valid_loss());

        let cfg = PretrainConfig {
            valid_split: 0.2,
            ..cfg
        };
        assert!(cfg.monitors_valid_loss());
    }
}
