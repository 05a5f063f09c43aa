//! Batch resolution: raw dataset rows to dense host buffers.
//!
//! The result is backend-agnostic (`Vec<f32>` / `Vec<bool>`); the training
//! crate turns it into burn tensors on whichever device it trains on.

use crate::types::{ColumnValues, TabularDataset};

/// Failure to resolve a batch of rows.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("row index {index} out of range for dataset with {n_rows} rows")]
    RowOutOfRange { index: usize, n_rows: usize },
    #[error("dataset has no columns")]
    NoColumns,
    #[error("malformed batch: {0}")]
    Malformed(String),
}

/// A batch of resolved rows in row-major layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBatch {
    pub rows: usize,
    pub cols: usize,
    /// Row-major feature values. Categorical cells hold their level code.
    pub features: Vec<f32>,
    /// Row-major flags, true where the raw value was missing.
    pub missing: Vec<bool>,
    /// Number of resolved feature columns.
    pub input_dim: usize,
    /// Positions of categorical columns within a row.
    pub cat_idxs: Vec<usize>,
    /// Cardinality of each categorical column, aligned with `cat_idxs`.
    pub cat_dims: Vec<usize>,
}

impl ResolvedBatch {
    /// Value at (`row`, `col`).
    pub fn feature(&self, row: usize, col: usize) -> f32 {
        self.features[row * self.cols + col]
    }

    pub fn is_missing(&self, row: usize, col: usize) -> bool {
        self.missing[row * self.cols + col]
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

/// Categorical layout of a dataset, independent of any particular batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureLayout {
    pub input_dim: usize,
    pub cat_idxs: Vec<usize>,
    pub cat_dims: Vec<usize>,
}

impl FeatureLayout {
    pub fn of(dataset: &TabularDataset) -> Self {
        let mut cat_idxs = Vec::new();
        let mut cat_dims = Vec::new();
        for (i, column) in dataset.columns().iter().enumerate() {
            if let ColumnValues::Categorical { levels, .. } = &column.values {
                cat_idxs.push(i);
                cat_dims.push(levels.len().max(1));
            }
        }
        Self {
            input_dim: dataset.n_cols(),
            cat_idxs,
            cat_dims,
        }
    }
}

/// Converts dataset rows into a [`ResolvedBatch`].
///
/// Implementations must be shareable with the loader's prefetch thread.
pub trait BatchResolver: Send + Sync {
    fn resolve(&self, dataset: &TabularDataset, rows: &[usize]) -> Result<ResolvedBatch, ResolveError>;
}

/// Numeric cells pass through, categorical cells become their code, missing
/// cells become 0 with the missing flag set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

impl BatchResolver for DefaultResolver {
    fn resolve(&self, dataset: &TabularDataset, rows: &[usize]) -> Result<ResolvedBatch, ResolveError> {
        if dataset.n_cols() == 0 {
            return Err(ResolveError::NoColumns);
        }
        let n_rows = dataset.n_rows();
        if let Some(&index) = rows.iter().find(|&&r| r >= n_rows) {
            return Err(ResolveError::RowOutOfRange { index, n_rows });
        }

        let layout = FeatureLayout::of(dataset);
        let cols = layout.input_dim;
        let mut features = vec![0.0f32; rows.len() * cols];
        let mut missing = vec![false; rows.len() * cols];

        for (j, column) in dataset.columns().iter().enumerate() {
            for (i, &r) in rows.iter().enumerate() {
                let cell = match &column.values {
                    ColumnValues::Numeric(values) => values[r],
                    ColumnValues::Categorical { codes, .. } => codes[r].map(|c| c as f32),
                };
                match cell {
                    Some(v) if v.is_finite() => features[i * cols + j] = v,
                    // NaN/inf in a numeric column count as missing
                    _ => missing[i * cols + j] = true,
                }
            }
        }

        Ok(ResolvedBatch {
            rows: rows.len(),
            cols,
            features,
            missing,
            input_dim: layout.input_dim,
            cat_idxs: layout.cat_idxs,
            cat_dims: layout.cat_dims,
        })
    }
}
