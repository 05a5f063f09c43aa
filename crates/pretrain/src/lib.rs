//! Self-supervised pretraining for tabular networks.
//!
//! A network learns to reconstruct randomly obfuscated cells of its embedded
//! input. This crate drives that loop: train/validation split, batch loading
//! with optional prefetch, masked reconstruction loss, optimizer and
//! scheduler steps, periodic checkpoints, early stopping, and a final
//! permutation-importance pass over the input columns.

pub mod config;
pub mod error;
pub mod model;
pub mod training;

pub use config::{DeviceChoice, EarlyStoppingMonitor, PretrainConfig};
pub use error::{PretrainError, Result};
pub use model::autoencoder::{TabularAutoencoder, TabularAutoencoderConfig};
pub use model::network::{NetworkOutput, PretrainNetwork};
pub use training::trainer::{CancellationToken, Devices, PretrainOutcome, Pretrainer, StopReason};
