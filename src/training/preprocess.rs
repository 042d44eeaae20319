// Feature preprocessing
//
// Imputes, encodes and stacks the configured feature columns into a dense
// matrix. After this step no feature cell is missing.

use ndarray::{Array2, Axis};
use std::collections::{BTreeMap, HashMap};

use super::dataset::{DataError, Table};
use crate::config::{FeatureKind, FeatureSpec, Imputation, TrainingSettings};

/// Encoded features and class labels
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub feature_names: Vec<String>,
    pub features: Array2<f64>,
    /// Class ids, indexes into `class_names`
    pub labels: Vec<usize>,
    /// Distinct label values in ascending order
    pub class_names: Vec<String>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of distinct label values in the whole dataset
    pub fn n_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Rows at `indices`, in that order
    pub fn select(&self, indices: &[usize]) -> FeatureMatrix {
        FeatureMatrix {
            feature_names: self.feature_names.clone(),
            features: self.features.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            class_names: self.class_names.clone(),
        }
    }
}

/// Map a raw category to its code; values outside the map are rejected
pub fn encode(
    value: &str,
    codes: &BTreeMap<String, u32>,
    column: &str,
    row: usize,
) -> Result<f64, DataError> {
    codes
        .get(value)
        .map(|&code| f64::from(code))
        .ok_or_else(|| DataError::UnknownCategory {
            column: column.to_string(),
            row,
            value: value.to_string(),
        })
}

fn parse_number(value: &str, column: &str, row: usize) -> Result<f64, DataError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DataError::InvalidNumber {
            column: column.to_string(),
            row,
            value: value.to_string(),
        })
}

/// Mean of the present values
pub fn column_mean(values: &[Option<&str>], column: &str) -> Result<f64, DataError> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (row, value) in values.iter().enumerate() {
        if let Some(v) = value {
            sum += parse_number(v, column, row)?;
            count += 1;
        }
    }

    if count == 0 {
        return Err(DataError::EmptyColumn {
            column: column.to_string(),
        });
    }
    Ok(sum / count as f64)
}

/// Most frequent present value; ties go to the smallest value
pub fn column_mode<'a>(values: &[Option<&'a str>], column: &str) -> Result<&'a str, DataError> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values.iter().flatten() {
        *counts.entry(*value).or_default() += 1;
    }

    counts
        .into_iter()
        .max_by(|(a_val, a_count), (b_val, b_count)| {
            a_count.cmp(b_count).then_with(|| b_val.cmp(a_val))
        })
        .map(|(value, _)| value)
        .ok_or_else(|| DataError::EmptyColumn {
            column: column.to_string(),
        })
}

fn encode_column(table: &Table, spec: &FeatureSpec) -> Result<Vec<f64>, DataError> {
    let raw = table.column(&spec.name)?;

    let fill: Option<String> = match spec.impute {
        Imputation::None => None,
        Imputation::Mean => Some(column_mean(&raw, &spec.name)?.to_string()),
        Imputation::Mode => Some(column_mode(&raw, &spec.name)?.to_string()),
    };

    raw.iter()
        .enumerate()
        .map(|(row, cell)| {
            let value = cell
                .or(fill.as_deref())
                .ok_or_else(|| DataError::MissingValue {
                    column: spec.name.clone(),
                    row,
                })?;
            match &spec.kind {
                FeatureKind::Numeric => parse_number(value, &spec.name, row),
                FeatureKind::Categorical { codes } => encode(value, codes, &spec.name, row),
            }
        })
        .collect()
}

/// Map each distinct label value to a dense class id
///
/// Ids follow the numeric order of the values, so {0, 5} becomes {0, 1}.
fn encode_labels(table: &Table, label: &str) -> Result<(Vec<usize>, Vec<String>), DataError> {
    let parsed = table
        .column(label)?
        .iter()
        .enumerate()
        .map(|(row, cell)| {
            let value = cell.ok_or_else(|| DataError::MissingValue {
                column: label.to_string(),
                row,
            })?;
            value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| DataError::InvalidLabel {
                    column: label.to_string(),
                    row,
                    value: value.to_string(),
                })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    let mut distinct = parsed.clone();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();

    let labels = parsed
        .iter()
        .map(|v| distinct.partition_point(|d| d < v))
        .collect();
    let class_names = distinct.iter().map(|v| v.to_string()).collect();
    Ok((labels, class_names))
}

/// Turn the raw table into the configured feature matrix and labels
pub fn preprocess(table: &Table, training: &TrainingSettings) -> Result<FeatureMatrix, DataError> {
    tracing::info!(features = training.features.len(), "Preprocessing data");

    if table.is_empty() {
        return Err(DataError::Empty);
    }

    let columns = training
        .features
        .iter()
        .map(|spec| encode_column(table, spec))
        .collect::<Result<Vec<_>, _>>()?;
    let (labels, class_names) = encode_labels(table, &training.label)?;
    tracing::debug!(classes = ?class_names, "Encoded labels");

    let n_rows = table.len();
    let n_features = columns.len();
    let features = Array2::from_shape_fn((n_rows, n_features), |(row, col)| columns[col][row]);

    Ok(FeatureMatrix {
        feature_names: training.feature_names(),
        features,
        labels,
        class_names,
    })
}
