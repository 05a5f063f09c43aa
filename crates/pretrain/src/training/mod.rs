//! Pretraining pipeline: loss, step executors, metric aggregation, data
//! loading, early stopping, schedulers, checkpoints, importance and the
//! epoch loop.

pub mod checkpoint;
pub mod data;
pub mod early_stopping;
pub mod importance;
pub mod loss;
pub mod metrics;
pub mod optim;
pub mod schedule;
pub mod step;
pub mod trainer;
