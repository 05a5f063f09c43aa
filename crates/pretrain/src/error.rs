//! Error type for pretraining setup and execution.

use tabular::{DatasetError, ResolveError};

/// Errors surfaced by the pretraining engine.
///
/// Setup errors (optimizer, scheduler, config, device) are reported before the
/// first epoch runs. Resolver failures during an epoch propagate unchanged.
#[derive(Debug, thiserror::Error)]
pub enum PretrainError {
    /// Optimizer name is not one of the supported optimizers.
    #[error("unsupported optimizer '{0}' (expected one of: adam, adamw, sgd)")]
    UnsupportedOptimizer(String),

    /// Scheduler name is not one of the supported schedulers.
    #[error("unsupported lr_scheduler '{0}' (expected one of: step, reduce_on_plateau)")]
    UnsupportedScheduler(String),

    /// A config value is outside its valid range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The dataset has no rows or no columns.
    #[error("dataset is empty")]
    EmptyDataset,

    /// The configured device is not available for this backend.
    #[error("device '{0}' is not available")]
    DeviceUnavailable(String),

    /// Serialising or restoring a checkpoint failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Requested checkpoint index does not exist (indices are 1-based).
    #[error("checkpoint {index} out of range ({count} stored)")]
    CheckpointIndex { index: usize, count: usize },

    /// The batch resolver failed.
    #[error("batch resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    /// The dataset could not be built.
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),
}

pub type Result<T> = std::result::Result<T, PretrainError>;
