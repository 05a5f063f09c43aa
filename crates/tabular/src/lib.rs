//! Tabular data for masked-reconstruction pretraining.
//!
//! Holds column-oriented datasets with explicit missing cells, reads and
//! writes them as Parquet, and resolves row batches into dense feature and
//! missing-mask buffers for the training crate.

pub mod reader;
pub mod resolve;
pub mod types;
pub mod writer;

pub use reader::TabularReader;
pub use resolve::{BatchResolver, DefaultResolver, FeatureLayout, ResolveError, ResolvedBatch};
pub use types::{Column, ColumnKind, ColumnSummary, ColumnValues, DatasetError, TabularDataset};
pub use writer::TabularWriter;
