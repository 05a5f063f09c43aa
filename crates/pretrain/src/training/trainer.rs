//! Pretraining loop: split, train, checkpoint, validate, early-stop, then
//! score feature importance on the trained network.
//!
//! Ties together the loader, step executors, metric aggregation, scheduler
//! and checkpoint store. The network is consumed and returned (on the CPU
//! device) inside a [`PretrainOutcome`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tabular::{BatchResolver, DefaultResolver, FeatureLayout, TabularDataset};

use crate::config::{DeviceChoice, PretrainConfig};
use crate::error::{PretrainError, Result};
use crate::model::bridge::Batch;
use crate::model::network::PretrainNetwork;
use crate::training::checkpoint::{Checkpoint, Checkpoints};
use crate::training::data::{split_indices, BatchLoader, LoaderOptions};
use crate::training::early_stopping::{EarlyStopDecision, EarlyStopping};
use crate::training::importance::{
    importance_sample_rows, FeatureImportance, ImportanceEstimator, PermutationImportance,
};
use crate::training::loss::DEFAULT_LOSS_EPS;
use crate::training::metrics::{transpose_metrics, EpochMetrics};
use crate::training::optim::OptimizerSpec;
use crate::training::schedule::SchedulerSpec;
use crate::training::step::{train_step, valid_step, StepSettings};

/// Devices a backend offers. The CPU device is always present; it holds
/// checkpoints and the returned network.
#[derive(Debug, Clone)]
pub struct Devices<B: Backend> {
    pub cpu: B::Device,
    pub accelerator: Option<B::Device>,
}

impl<B: Backend> Devices<B> {
    pub fn cpu_only(cpu: B::Device) -> Self {
        Self { cpu, accelerator: None }
    }

    pub fn with_accelerator(mut self, device: B::Device) -> Self {
        self.accelerator = Some(device);
        self
    }

    /// Pick the training device. Called once, before the first epoch.
    pub fn resolve(&self, choice: DeviceChoice) -> Result<B::Device> {
        match (choice, &self.accelerator) {
            (DeviceChoice::Cpu, _) | (DeviceChoice::Auto, None) => Ok(self.cpu.clone()),
            (DeviceChoice::Auto | DeviceChoice::Accelerator, Some(device)) => Ok(device.clone()),
            (DeviceChoice::Accelerator, None) => Err(PretrainError::DeviceUnavailable(choice.to_string())),
        }
    }
}

/// Cooperative stop signal, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the epoch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every configured epoch ran.
    Completed,
    /// Early stopping triggered after this epoch.
    EarlyStopped { epoch: usize },
    /// Cancelled during this epoch; the epoch was discarded.
    Cancelled { epoch: usize },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::EarlyStopped { epoch } => write!(f, "early stopped after epoch {epoch}"),
            Self::Cancelled { epoch } => write!(f, "cancelled during epoch {epoch}"),
        }
    }
}

/// Everything a run produces.
#[derive(Debug)]
pub struct PretrainOutcome<M> {
    /// Trained network, on the CPU device.
    pub network: M,
    /// One entry per completed epoch.
    pub history: Vec<EpochMetrics>,
    pub checkpoints: Checkpoints,
    pub importance: FeatureImportance,
    pub stop_reason: StopReason,
}

/// Run state fixed at setup: a private config copy plus resolved devices.
struct ExecutionContext<B: Backend> {
    config: PretrainConfig,
    device: B::Device,
    cpu: B::Device,
    loss_eps: f64,
}

/// Builder for one pretraining run.
///
/// ```ignore
/// let outcome = Pretrainer::<TrainBackend, TabularAutoencoder<TrainBackend>>::new(&config, devices)
///     .fit(dataset, |layout, config, device| {
///         TabularAutoencoderConfig::from_pretrain_config(layout, config).init(device)
///     })?;
/// ```
pub struct Pretrainer<B, M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    config: PretrainConfig,
    devices: Devices<B>,
    optimizer: OptimizerSpec<M, B>,
    scheduler: SchedulerSpec,
    resolver: Arc<dyn BatchResolver>,
    cancel: CancellationToken,
    loss_eps: f64,
}

impl<B, M> Pretrainer<B, M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + PretrainNetwork<B> + 'static,
    M::InnerModule: PretrainNetwork<B::InnerBackend>,
{
    /// The optimizer and scheduler default to the names in `config`.
    pub fn new(config: &PretrainConfig, devices: Devices<B>) -> Self {
        Self {
            config: config.clone(),
            devices,
            optimizer: OptimizerSpec::Named(config.optimizer.clone()),
            scheduler: SchedulerSpec::FromConfig,
            resolver: Arc::new(DefaultResolver),
            cancel: CancellationToken::new(),
            loss_eps: DEFAULT_LOSS_EPS,
        }
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerSpec<M, B>) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerSpec) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn BatchResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_loss_eps(mut self, eps: f64) -> Self {
        self.loss_eps = eps;
        self
    }

    /// Train with the default permutation importance estimator.
    ///
    /// `build_network` receives the dataset layout and the run config, so it
    /// can carry `pretraining_ratio` into the network.
    pub fn fit<F>(self, dataset: Arc<TabularDataset>, build_network: F) -> Result<PretrainOutcome<M>>
    where
        F: FnOnce(&FeatureLayout, &PretrainConfig, &B::Device) -> M,
    {
        let seed = self.config.seed;
        let eps = self.loss_eps;
        self.fit_inner(dataset, build_network, |rng| {
            PermutationImportance::new(seed.unwrap_or_else(|| rng.gen()), eps)
        })
    }

    /// Train, then score importance with `estimator`.
    pub fn fit_with_estimator<F, E>(
        self,
        dataset: Arc<TabularDataset>,
        build_network: F,
        estimator: E,
    ) -> Result<PretrainOutcome<M>>
    where
        F: FnOnce(&FeatureLayout, &PretrainConfig, &B::Device) -> M,
        E: ImportanceEstimator<B::InnerBackend, M::InnerModule>,
    {
        self.fit_inner(dataset, build_network, |_| estimator)
    }

    fn fit_inner<F, E, G>(
        self,
        dataset: Arc<TabularDataset>,
        build_network: F,
        make_estimator: G,
    ) -> Result<PretrainOutcome<M>>
    where
        F: FnOnce(&FeatureLayout, &PretrainConfig, &B::Device) -> M,
        E: ImportanceEstimator<B::InnerBackend, M::InnerModule>,
        G: FnOnce(&mut StdRng) -> E,
    {
        // Setup: everything that can fail without training fails here
        self.config.validate()?;
        if dataset.n_rows() == 0 || dataset.n_cols() == 0 {
            return Err(PretrainError::EmptyDataset);
        }
        let ctx = ExecutionContext::<B> {
            device: self.devices.resolve(self.config.device)?,
            cpu: self.devices.cpu.clone(),
            config: self.config,
            loss_eps: self.loss_eps,
        };
        let cfg = &ctx.config;
        let mut optimizer = self.optimizer.build()?;
        let mut scheduler = self.scheduler.build(cfg)?;

        let mut rng = match cfg.seed {
            Some(seed) => {
                B::seed(seed);
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_entropy(),
        };

        let split = split_indices(dataset.n_rows(), cfg.valid_split, &mut rng);
        let train_loader = BatchLoader::new(
            Arc::clone(&dataset),
            split.train,
            Arc::clone(&self.resolver),
            LoaderOptions::training(cfg.batch_size, cfg.drop_last, cfg.num_workers),
        );
        let valid_loader = (!split.valid.is_empty()).then(|| {
            BatchLoader::new(
                Arc::clone(&dataset),
                split.valid,
                Arc::clone(&self.resolver),
                LoaderOptions::validation(cfg.batch_size, cfg.num_workers),
            )
        });
        if train_loader.is_empty() {
            tracing::warn!(
                train_rows = train_loader.num_rows(),
                batch_size = cfg.batch_size,
                "drop_last leaves no training batches; the network will not be updated"
            );
        }
        if cfg.monitors_valid_loss() && valid_loader.is_none() {
            tracing::warn!("valid_split selects no rows; early stopping monitors training loss");
        }

        let layout = FeatureLayout::of(&dataset);
        let mut network = build_network(&layout, cfg, &ctx.device);

        tracing::info!(
            device = %cfg.device,
            optimizer = %cfg.optimizer,
            epochs = cfg.epochs,
            batch_size = cfg.batch_size,
            train_rows = train_loader.num_rows(),
            valid_rows = valid_loader.as_ref().map_or(0, BatchLoader::num_rows),
            input_dim = layout.input_dim,
            n_categorical = layout.cat_idxs.len(),
            "Starting pretraining"
        );

        let mut early_stopping = cfg
            .early_stopping
            .then(|| EarlyStopping::new(cfg.early_stopping_tolerance, cfg.early_stopping_patience));
        let mut history = Vec::with_capacity(cfg.epochs);
        let mut checkpoints = Checkpoints::default();
        let mut stop_reason = StopReason::Completed;
        let train_start = Instant::now();

        'epochs: for epoch in 1..=cfg.epochs {
            let settings = StepSettings {
                learning_rate: scheduler.lr(),
                clip_value: cfg.clip_value,
                loss_eps: ctx.loss_eps,
            };

            // 1. Training batches
            let mut train_records = Vec::with_capacity(train_loader.num_batches());
            for resolved in train_loader.epoch(&mut rng) {
                if self.cancel.is_cancelled() {
                    stop_reason = StopReason::Cancelled { epoch };
                    break 'epochs;
                }
                let batch = Batch::<B>::from_resolved(&resolved?, &ctx.device);
                let (next, record) = train_step(network, optimizer.as_mut(), batch, &settings);
                network = next;
                train_records.push(record);
            }
            if self.cancel.is_cancelled() {
                stop_reason = StopReason::Cancelled { epoch };
                break 'epochs;
            }
            let train = transpose_metrics(&train_records);

            // 2. Checkpoint from a CPU-resident copy
            if cfg.checkpoint_epochs > 0 && epoch % cfg.checkpoint_epochs == 0 {
                network = network.fork(&ctx.cpu);
                checkpoints.push(Checkpoint::capture::<B, M>(&network, epoch)?);
                network = network.fork(&ctx.device);
                tracing::debug!(epoch, stored = checkpoints.len(), "Checkpoint captured");
            }

            // 3. Validation batches on the evaluation network
            let valid = match &valid_loader {
                Some(loader) => {
                    let eval_network = network.valid();
                    let mut records = Vec::with_capacity(loader.num_batches());
                    for resolved in loader.epoch(&mut rng) {
                        if self.cancel.is_cancelled() {
                            checkpoints.discard_from(epoch);
                            stop_reason = StopReason::Cancelled { epoch };
                            break 'epochs;
                        }
                        let batch = Batch::<B::InnerBackend>::from_resolved(&resolved?, &ctx.device);
                        records.push(valid_step(&eval_network, batch, ctx.loss_eps));
                    }
                    Some(transpose_metrics(&records))
                }
                None => None,
            };

            let metrics = EpochMetrics {
                epoch,
                train,
                valid,
                learning_rate: settings.learning_rate,
            };

            // 4. Monitored loss
            let current_loss = if cfg.monitors_valid_loss() && metrics.valid.is_some() {
                metrics.valid_loss()
            } else {
                metrics.train_loss()
            }
            .unwrap_or(f64::NAN);

            // 5. Early stopping
            let decision = early_stopping.as_mut().map(|es| es.update(current_loss));

            // 6. Scheduler
            scheduler.step(current_loss);

            let train_loss = metrics.train_loss().unwrap_or(f64::NAN);
            let valid_loss = metrics.valid_loss();
            if cfg.verbose {
                tracing::info!(
                    epoch,
                    train_loss = format!("{train_loss:.5}"),
                    valid_loss = ?valid_loss,
                    lr = settings.learning_rate,
                    "Epoch complete"
                );
            } else {
                tracing::debug!(
                    epoch,
                    train_loss,
                    valid_loss = ?valid_loss,
                    lr = settings.learning_rate,
                    "Epoch complete"
                );
            }
            history.push(metrics);

            match decision {
                Some(EarlyStopDecision::Stop) => {
                    let best = early_stopping.as_ref().and_then(|es| es.state().value);
                    tracing::info!(
                        epoch,
                        best_loss = ?best,
                        patience = cfg.early_stopping_patience,
                        "Early stopping triggered"
                    );
                    stop_reason = StopReason::EarlyStopped { epoch };
                    break;
                }
                Some(EarlyStopDecision::NotImproved { patience_counter }) => {
                    tracing::debug!(epoch, patience_counter, "No improvement");
                }
                _ => {}
            }
        }

        tracing::info!(
            epochs_run = history.len(),
            checkpoints = checkpoints.len(),
            stop_reason = %stop_reason,
            elapsed_secs = format!("{:.1}", train_start.elapsed().as_secs_f64()),
            "Training loop finished"
        );

        // Importance on the CPU-resident evaluation network
        let network = network.fork(&ctx.cpu);
        let rows = importance_sample_rows(dataset.n_rows(), cfg.importance_sample_size, &mut rng);
        let resolved = self.resolver.resolve(&dataset, &rows)?;
        let batch = Batch::<B::InnerBackend>::from_resolved(&resolved, &ctx.cpu);
        let estimator = make_estimator(&mut rng);
        let values = estimator.estimate(&network.valid(), batch.features, batch.missing_mask);
        let importance = FeatureImportance::new(dataset.column_names(), values)?;
        tracing::debug!(rows = rows.len(), "Feature importance computed");

        Ok(PretrainOutcome {
            network,
            history,
            checkpoints,
            importance,
            stop_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_device_resolution() {
        let cpu_only = Devices::<TestAutodiffBackend>::cpu_only(Default::default());
        assert!(cpu_only.resolve(DeviceChoice::Auto).is_ok());
        assert!(cpu_only.resolve(DeviceChoice::Cpu).is_ok());
        assert!(matches!(
            cpu_only.resolve(DeviceChoice::Accelerator),
            Err(PretrainError::DeviceUnavailable(_))
        ));

        let both = cpu_only.with_accelerator(Default::default());
        assert!(both.resolve(DeviceChoice::Accelerator).is_ok());
    }

    #[test]
    fn test_cancellation_token_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::Completed.to_string(), "completed");
        assert_eq!(
            StopReason::EarlyStopped { epoch: 3 }.to_string(),
            "early stopped after epoch 3"
        );
    }
}
