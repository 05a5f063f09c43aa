//! Integration tests for the tabular crate.
//!
//! Full pipelines: build → write Parquet → read → resolve.

use tabular::{
    BatchResolver, Column, ColumnValues, DefaultResolver, FeatureLayout, TabularDataset,
    TabularReader, TabularWriter,
};
use tempfile::TempDir;

fn mixed_dataset(n: usize) -> TabularDataset {
    let xs = (0..n)
        .map(|i| if i % 5 == 0 { None } else { Some(i as f32 * 0.5) })
        .collect();
    let colors: Vec<Option<&str>> = (0..n)
        .map(|i| match i % 3 {
            0 => Some("red"),
            1 => Some("green"),
            _ => None,
        })
        .collect();
    TabularDataset::new(vec![
        Column::numeric("x", xs),
        Column::categorical("color", &colors),
        Column::numeric("y", (0..n).map(|i| Some(-(i as f32))).collect()),
    ])
    .unwrap()
}

#[test]
fn test_parquet_roundtrip_then_resolve() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("mixed.parquet");

    let ds = mixed_dataset(20);
    TabularWriter::write(&ds, &path).unwrap();
    let read = TabularReader::read_all(&path).unwrap();

    assert_eq!(read.column_names(), vec!["x", "color", "y"]);
    assert_eq!(read.n_rows(), 20);

    let rows: Vec<usize> = (0..read.n_rows()).collect();
    let from_disk = DefaultResolver.resolve(&read, &rows).unwrap();
    let in_memory = DefaultResolver.resolve(&ds, &rows).unwrap();
    assert_eq!(from_disk, in_memory);

    // Row 0: x missing, color "red" (code 0)
    assert!(from_disk.is_missing(0, 0));
    assert_eq!(from_disk.feature(0, 1), 0.0);
    // Row 2: color missing
    assert!(from_disk.is_missing(2, 1));
    assert_eq!(from_disk.cat_idxs, vec![1]);
    assert_eq!(from_disk.cat_dims, vec![2]);
}

#[test]
fn test_layout_matches_resolved_batch() {
    let ds = mixed_dataset(6);
    let layout = FeatureLayout::of(&ds);
    let batch = DefaultResolver.resolve(&ds, &[0, 1]).unwrap();
    assert_eq!(layout.input_dim, batch.input_dim);
    assert_eq!(layout.cat_idxs, batch.cat_idxs);
    assert_eq!(layout.cat_dims, batch.cat_dims);
}

#[test]
fn test_empty_table_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("empty.parquet");
    let ds = TabularDataset::new(vec![Column::numeric("x", vec![])]).unwrap();
    TabularWriter::write(&ds, &path).unwrap();
    let read = TabularReader::read_all(&path).unwrap();
    assert_eq!(read.n_rows(), 0);
    assert_eq!(
        read.column("x").unwrap().values,
        ColumnValues::Numeric(vec![])
    );
}
