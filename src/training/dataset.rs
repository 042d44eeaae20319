// Tabular dataset loading
//
// Rows are kept as optional strings; an empty cell is a missing value.
// Typing happens later, in preprocessing, driven by the feature specs.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read dataset: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing expected column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}' has a missing value at row {row}")]
    MissingValue { column: String, row: usize },

    #[error("column '{column}' has no values to impute from")]
    EmptyColumn { column: String },

    #[error("column '{column}' row {row}: unknown category '{value}'")]
    UnknownCategory {
        column: String,
        row: usize,
        value: String,
    },

    #[error("column '{column}' row {row}: '{value}' is not a number")]
    InvalidNumber {
        column: String,
        row: usize,
        value: String,
    },

    #[error("column '{column}' row {row}: '{value}' is not a numeric label")]
    InvalidLabel {
        column: String,
        row: usize,
        value: String,
    },

    #[error("dataset has no rows")]
    Empty,
}

/// A header plus rows of optional cells
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn from_path(path: &Path) -> Result<Self, DataError> {
        let file = File::open(path).map_err(csv::Error::from)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DataError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(
                record
                    .iter()
                    .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                    .collect(),
            );
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, DataError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    }

    /// Cells of one column, top to bottom
    pub fn column(&self, name: &str) -> Result<Vec<Option<&str>>, DataError> {
        let idx = self.column_index(name)?;
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(idx).and_then(|cell| cell.as_deref()))
            .collect())
    }

    /// Missing-cell count per column, in header order
    pub fn missing_counts(&self) -> Vec<(String, usize)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let missing = self
                    .rows
                    .iter()
                    .filter(|row| row.get(idx).map_or(true, Option::is_none))
                    .count();
                (name.clone(), missing)
            })
            .collect()
    }

    pub fn log_summary(&self) {
        tracing::info!(
            rows = self.len(),
            columns = self.columns.len(),
            "Loaded dataset"
        );
        for (column, missing) in self.missing_counts() {
            if missing > 0 {
                tracing::info!(column = %column, missing = missing, "Missing values");
            }
        }
    }
}
