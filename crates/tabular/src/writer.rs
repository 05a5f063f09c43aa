//! Writes tabular datasets to Parquet files using Arrow.

use crate::types::{ColumnValues, TabularDataset};
use arrow::array::{ArrayRef, Float32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use std::path::Path;
use std::sync::Arc;

/// Arrow schema for a dataset: `Float32` for numeric and `Utf8` for
/// categorical columns, all nullable.
pub fn dataset_schema(dataset: &TabularDataset) -> Schema {
    Schema::new(
        dataset
            .columns()
            .iter()
            .map(|c| {
                let data_type = match c.values {
                    ColumnValues::Numeric(_) => DataType::Float32,
                    ColumnValues::Categorical { .. } => DataType::Utf8,
                };
                Field::new(c.name.clone(), data_type, true)
            })
            .collect::<Vec<_>>(),
    )
}

/// Static methods for writing tabular data to Parquet files.
pub struct TabularWriter;

impl TabularWriter {
    /// Write the full dataset as a single row group.
    pub fn write(dataset: &TabularDataset, path: &Path) -> anyhow::Result<()> {
        let schema = Arc::new(dataset_schema(dataset));

        let arrays: Vec<ArrayRef> = dataset
            .columns()
            .iter()
            .map(|c| -> ArrayRef {
                match &c.values {
                    ColumnValues::Numeric(values) => Arc::new(Float32Array::from(values.clone())),
                    ColumnValues::Categorical { levels, codes } => Arc::new(StringArray::from(
                        codes
                            .iter()
                            .map(|code| code.map(|c| levels[c as usize].as_str()))
                            .collect::<Vec<Option<&str>>>(),
                    )),
                }
            })
            .collect();

        let batch = if arrays.is_empty() {
            RecordBatch::new_empty(schema.clone())
        } else {
            RecordBatch::try_new(schema.clone(), arrays)?
        };

        let file = std::fs::File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;

        tracing::info!(
            rows = dataset.n_rows(),
            cols = dataset.n_cols(),
            path = %path.display(),
            "Wrote tabular Parquet file"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Column;

    #[test]
    fn test_schema_types() {
        let ds = TabularDataset::new(vec![
            Column::numeric("x", vec![Some(1.0)]),
            Column::categorical("c", &[Some("a")]),
        ])
        .unwrap();
        let schema = dataset_schema(&ds);
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(schema.field(0).data_type(), &DataType::Float32);
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
        assert!(schema.field(1).is_nullable());
    }
}
