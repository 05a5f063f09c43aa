//! Learning-rate schedulers stepped once per epoch.

use crate::config::PretrainConfig;
use crate::error::{PretrainError, Result};

/// Per-epoch learning-rate policy.
pub trait LrScheduler: Send {
    /// Learning rate for the next epoch.
    fn lr(&self) -> f64;

    /// Advance one epoch. `monitored_loss` is the epoch's early-stopping
    /// quantity (validation loss when available, training loss otherwise).
    fn step(&mut self, monitored_loss: f64);
}

/// Factory for a caller-supplied scheduler; receives the base learning rate.
pub type SchedulerFactory = Box<dyn FnOnce(f64) -> Box<dyn LrScheduler>>;

/// How the trainer obtains its scheduler.
pub enum SchedulerSpec {
    /// Use `lr_scheduler` from the config (absent means constant).
    FromConfig,
    /// Build from a caller-supplied factory.
    Factory(SchedulerFactory),
}

impl std::fmt::Debug for SchedulerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FromConfig => write!(f, "FromConfig"),
            Self::Factory(_) => write!(f, "Factory(..)"),
        }
    }
}

impl SchedulerSpec {
    pub fn build(self, config: &PretrainConfig) -> Result<Box<dyn LrScheduler>> {
        match self {
            Self::Factory(factory) => Ok(factory(config.learn_rate)),
            Self::FromConfig => match config.lr_scheduler.as_deref() {
                None => Ok(Box::new(ConstantLr::new(config.learn_rate))),
                Some(name) => match name.to_ascii_lowercase().as_str() {
                    "step" => Ok(Box::new(StepLr::new(
                        config.learn_rate,
                        config.step_size,
                        config.lr_decay,
                    )?)),
                    "reduce_on_plateau" => Ok(Box::new(ReduceOnPlateau::new(
                        config.learn_rate,
                        config.lr_decay,
                        config.step_size,
                    )?)),
                    _ => Err(PretrainError::UnsupportedScheduler(name.to_string())),
                },
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConstantLr {
    lr: f64,
}

impl ConstantLr {
    pub fn new(lr: f64) -> Self {
        Self { lr }
    }
}

impl LrScheduler for ConstantLr {
    fn lr(&self) -> f64 {
        self.lr
    }

    fn step(&mut self, _monitored_loss: f64) {}
}

/// Multiply the rate by `gamma` every `step_size` epochs.
#[derive(Debug, Clone)]
pub struct StepLr {
    base_lr: f64,
    step_size: usize,
    gamma: f64,
    epoch: usize,
}

impl StepLr {
    pub fn new(base_lr: f64, step_size: usize, gamma: f64) -> Result<Self> {
        if step_size == 0 {
            return Err(PretrainError::InvalidConfig("step scheduler needs step_size > 0".into()));
        }
        Ok(Self {
            base_lr,
            step_size,
            gamma,
            epoch: 0,
        })
    }
}

impl LrScheduler for StepLr {
    fn lr(&self) -> f64 {
        self.base_lr * self.gamma.powi((self.epoch / self.step_size) as i32)
    }

    fn step(&mut self, _monitored_loss: f64) {
        self.epoch += 1;
    }
}

/// Multiply the rate by `factor` after `patience` epochs without a new
/// minimum of the monitored loss.
#[derive(Debug, Clone)]
pub struct ReduceOnPlateau {
    lr: f64,
    factor: f64,
    patience: usize,
    best: f64,
    bad_epochs: usize,
}

impl ReduceOnPlateau {
    pub fn new(lr: f64, factor: f64, patience: usize) -> Result<Self> {
        if !(factor > 0.0 && factor < 1.0) {
            return Err(PretrainError::InvalidConfig(format!(
                "reduce_on_plateau needs lr_decay in (0, 1), got {factor}"
            )));
        }
        Ok(Self {
            lr,
            factor,
            patience,
            best: f64::INFINITY,
            bad_epochs: 0,
        })
    }
}

impl LrScheduler for ReduceOnPlateau {
    fn lr(&self) -> f64 {
        self.lr
    }

    fn step(&mut self, monitored_loss: f64) {
        if monitored_loss < self.best {
            self.best = monitored_loss;
            self.bad_epochs = 0;
            return;
        }
        self.bad_epochs += 1;
        if self.bad_epochs > self.patience {
            self.lr *= self.factor;
            self.bad_epochs = 0;
            tracing::debug!(lr = self.lr, "Reduced learning rate on plateau");
        }
    }
}
