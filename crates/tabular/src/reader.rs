//! Reads tabular datasets from Parquet files.

use crate::types::{Column, TabularDataset};
use arrow::array::{Array, ArrayRef, Float32Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::path::Path;

/// Static methods for reading tabular data from Parquet files.
pub struct TabularReader;

/// How a Parquet column is brought into the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnTarget {
    Numeric,
    Categorical,
}

fn target_for(name: &str, data_type: &DataType) -> anyhow::Result<ColumnTarget> {
    match data_type {
        t if t.is_numeric() => Ok(ColumnTarget::Numeric),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Boolean | DataType::Dictionary(_, _) => {
            Ok(ColumnTarget::Categorical)
        }
        other => anyhow::bail!("Column '{name}' has unsupported type {other}"),
    }
}

impl TabularReader {
    /// Read a whole Parquet file into memory.
    ///
    /// Numeric columns become numeric features; string, boolean and
    /// dictionary columns become categorical features. Nulls are missing.
    pub fn read_all(path: &Path) -> anyhow::Result<TabularDataset> {
        let file = std::fs::File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let schema: Schema = builder.schema().as_ref().clone();
        let reader = builder.build()?;

        let targets = schema
            .fields()
            .iter()
            .map(|f| target_for(f.name(), f.data_type()))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut numeric: Vec<Vec<Option<f32>>> = vec![Vec::new(); targets.len()];
        let mut strings: Vec<Vec<Option<String>>> = vec![Vec::new(); targets.len()];

        for batch_result in reader {
            let batch = batch_result?;
            append_batch(&batch, &targets, &mut numeric, &mut strings)?;
        }

        let columns = schema
            .fields()
            .iter()
            .zip(targets.iter())
            .enumerate()
            .map(|(i, (field, target))| match target {
                ColumnTarget::Numeric => Column::numeric(field.name().clone(), std::mem::take(&mut numeric[i])),
                ColumnTarget::Categorical => Column::categorical(field.name().clone(), &strings[i]),
            })
            .collect();

        let dataset = TabularDataset::new(columns)?;
        tracing::debug!(
            rows = dataset.n_rows(),
            cols = dataset.n_cols(),
            path = %path.display(),
            "Read tabular dataset"
        );
        Ok(dataset)
    }
}

fn append_batch(
    batch: &RecordBatch,
    targets: &[ColumnTarget],
    numeric: &mut [Vec<Option<f32>>],
    strings: &mut [Vec<Option<String>>],
) -> anyhow::Result<()> {
    for (i, target) in targets.iter().enumerate() {
        let column: &ArrayRef = batch.column(i);
        match target {
            ColumnTarget::Numeric => {
                let casted = cast(column, &DataType::Float32)?;
                let values = casted
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| anyhow::anyhow!("Column {i} did not cast to Float32Array"))?;
                numeric[i].extend(values.iter());
            }
            ColumnTarget::Categorical => {
                let casted = cast(column, &DataType::Utf8)?;
                let values = casted
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .ok_or_else(|| anyhow::anyhow!("Column {i} did not cast to StringArray"))?;
                strings[i].extend(values.iter().map(|v| v.map(str::to_string)));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnValues;
    use crate::writer::TabularWriter;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_numeric_and_categorical() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("table.parquet");

        let ds = TabularDataset::new(vec![
            Column::numeric("x", vec![Some(1.5), None, Some(-2.0)]),
            Column::categorical("c", &[Some("a"), Some("b"), None]),
        ])
        .unwrap();
        TabularWriter::write(&ds, &path).unwrap();

        let read = TabularReader::read_all(&path).unwrap();
        assert_eq!(read, ds);
    }

    #[test]
    fn test_missing_file_errors() {
        let tmp = TempDir::new().unwrap();
        assert!(TabularReader::read_all(&tmp.path().join("nope.parquet")).is_err());
    }

    #[test]
    fn test_integer_column_is_numeric() {
        use arrow::array::Int64Array;
        use arrow::datatypes::Field;
        use parquet::arrow::ArrowWriter;
        use std::sync::Arc;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ints.parquet");
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, true)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from(vec![Some(3), None, Some(7)]))],
        )
        .unwrap();
        let mut writer = ArrowWriter::try_new(std::fs::File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let ds = TabularReader::read_all(&path).unwrap();
        assert_eq!(
            ds.column("n").unwrap().values,
            ColumnValues::Numeric(vec![Some(3.0), None, Some(7.0)])
        );
    }
}
