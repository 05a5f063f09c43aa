//! Per-batch metric records and their per-epoch aggregation.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Named scalar metrics produced by one step, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricRecord {
    entries: Vec<(String, f64)>,
}

impl MetricRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Replaces an existing value with the same name.
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: f64) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Metric name to the sequence of its per-batch values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnarMetrics {
    columns: Vec<(String, Vec<f64>)>,
}

impl ColumnarMetrics {
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Arithmetic mean of a metric's values; `None` if absent or empty.
    pub fn mean(&self, name: &str) -> Option<f64> {
        let values = self.get(name)?;
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Serialize for ColumnarMetrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, values) in &self.columns {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

/// Transpose per-batch records into per-metric columns.
///
/// Metric names come from the first record. A record lacking one of those
/// names contributes NaN at its position, so every column has one value per
/// record. No records gives an empty result.
pub fn transpose_metrics(records: &[MetricRecord]) -> ColumnarMetrics {
    let Some(first) = records.first() else {
        return ColumnarMetrics::default();
    };
    let columns = first
        .names()
        .map(|name| {
            let values = records
                .iter()
                .map(|r| r.get(name).unwrap_or(f64::NAN))
                .collect();
            (name.to_string(), values)
        })
        .collect();
    ColumnarMetrics { columns }
}

/// Aggregated metrics for one completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochMetrics {
    /// 1-based epoch number.
    pub epoch: usize,
    pub train: ColumnarMetrics,
    /// `None` when no validation split exists.
    pub valid: Option<ColumnarMetrics>,
    /// Learning rate in effect during this epoch.
    pub learning_rate: f64,
}

impl EpochMetrics {
    pub fn train_loss(&self) -> Option<f64> {
        self.train.mean("loss")
    }

    pub fn valid_loss(&self) -> Option<f64> {
        self.valid.as_ref().and_then(|v| v.mean("loss"))
    }
}
