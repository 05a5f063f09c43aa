//! Column-oriented tabular dataset with explicit missing values.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Kind of a column, as seen by the network's embedding layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric => write!(f, "numeric"),
            Self::Categorical => write!(f, "categorical"),
        }
    }
}

/// Values of a single column. `None` marks a missing cell.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Numeric(Vec<Option<f32>>),
    Categorical {
        /// Level names; a code `c` refers to `levels[c]`.
        levels: Vec<String>,
        codes: Vec<Option<u32>>,
    },
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Categorical { codes, .. } => codes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::Numeric(_) => ColumnKind::Numeric,
            Self::Categorical { .. } => ColumnKind::Categorical,
        }
    }

    /// Whether the cell at `row` is missing.
    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Self::Numeric(v) => v[row].is_none(),
            Self::Categorical { codes, .. } => codes[row].is_none(),
        }
    }

    /// Number of missing cells in the column.
    pub fn missing_count(&self) -> usize {
        match self {
            Self::Numeric(v) => v.iter().filter(|x| x.is_none()).count(),
            Self::Categorical { codes, .. } => codes.iter().filter(|x| x.is_none()).count(),
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f32>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Numeric(values),
        }
    }

    /// Build a categorical column from string cells, assigning codes in
    /// first-seen order.
    pub fn categorical<S: AsRef<str>>(name: impl Into<String>, cells: &[Option<S>]) -> Self {
        let mut levels: Vec<String> = Vec::new();
        let mut index: HashMap<String, u32> = HashMap::new();
        let codes = cells
            .iter()
            .map(|cell| {
                cell.as_ref().map(|s| {
                    let s = s.as_ref();
                    if let Some(&code) = index.get(s) {
                        return code;
                    }
                    let code = levels.len() as u32;
                    levels.push(s.to_string());
                    index.insert(s.to_string(), code);
                    code
                })
            })
            .collect();
        Self {
            name: name.into(),
            values: ColumnValues::Categorical { levels, codes },
        }
    }

    pub fn kind(&self) -> ColumnKind {
        self.values.kind()
    }
}

/// Invalid dataset construction.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DatasetError {
    #[error("column '{name}' has {len} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        len: usize,
        expected: usize,
    },
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    #[error("categorical column '{name}' has code {code} but only {levels} levels")]
    CodeOutOfRange { name: String, code: u32, levels: usize },
}

/// An in-memory table of equally long, uniquely named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TabularDataset {
    columns: Vec<Column>,
}

impl TabularDataset {
    pub fn new(columns: Vec<Column>) -> Result<Self, DatasetError> {
        let expected = columns.first().map(|c| c.values.len()).unwrap_or(0);
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(DatasetError::DuplicateColumn(column.name.clone()));
            }
            let len = column.values.len();
            if len != expected {
                return Err(DatasetError::LengthMismatch {
                    name: column.name.clone(),
                    len,
                    expected,
                });
            }
            if let ColumnValues::Categorical { levels, codes } = &column.values {
                if let Some(&code) = codes.iter().flatten().find(|&&c| c as usize >= levels.len()) {
                    return Err(DatasetError::CodeOutOfRange {
                        name: column.name.clone(),
                        code,
                        levels: levels.len(),
                    });
                }
            }
        }
        Ok(Self { columns })
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0 || self.n_cols() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in dataset order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Per-column summary used by the CLI's `inspect` command.
    pub fn summary(&self) -> Vec<ColumnSummary> {
        self.columns
            .iter()
            .map(|c| ColumnSummary {
                name: c.name.clone(),
                kind: c.kind(),
                missing: c.values.missing_count(),
                levels: match &c.values {
                    ColumnValues::Categorical { levels, .. } => Some(levels.len()),
                    ColumnValues::Numeric(_) => None,
                },
            })
            .collect()
    }
}

/// Summary statistics for one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub kind: ColumnKind,
    pub missing: usize,
    /// Number of levels for categorical columns.
    pub levels: Option<usize>,
}
