use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
  model::{InputsVec, OutputsVec},
  Error, Result,
};

/// A parsed CSV record: column name to cell.
pub type Record = Map<String, Value>;

/// Body of `POST /api/predict`. Fields are optional here so that absence is reported as a
/// client error by the handler instead of a generic deserialisation failure.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub csv_data: Option<Vec<Record>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub target_column: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub epochs: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct ErrorResponse {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl ErrorResponse {
  pub fn new(error: impl Into<String>, details: Option<String>) -> Self {
    Self {
      error: error.into(),
      details,
    }
  }
}

fn cell_value(cell: &Value) -> Option<f32> {
  match cell {
    Value::Number(n) => n.as_f64().map(|v| v as f32),
    Value::String(s) => s.trim().parse::<f32>().ok(),
    _ => None,
  }
}

/// Splits records into feature rows and labels: the label is `target`, the features are the
/// remaining columns in the order they appear in the first record.
pub fn split_records(records: &[Record], target: &str) -> Result<(InputsVec, OutputsVec)> {
  let first = records
    .first()
    .ok_or_else(|| Error::invalid("csvData must contain at least one record"))?;
  if !first.contains_key(target) {
    return Err(Error::invalid(format!(
      "target column {:?} not found; available columns: {}",
      target,
      first.keys().join(", ")
    )));
  }
  let features: Vec<&String> = first.keys().filter(|k| k.as_str() != target).collect();

  let mut rows = Vec::with_capacity(records.len());
  let mut labels = Vec::with_capacity(records.len());
  for (i, record) in records.iter().enumerate() {
    if record.len() != first.len() {
      return Err(Error::invalid(format!(
        "record {} has {} columns, expected {}",
        i,
        record.len(),
        first.len()
      )));
    }
    let read = |column: &str| -> Result<f32> {
      let cell = record
        .get(column)
        .ok_or_else(|| Error::invalid(format!("record {} is missing column {:?}", i, column)))?;
      cell_value(cell)
        .ok_or_else(|| Error::invalid(format!("record {} column {:?} is not numeric: {}", i, column, cell)))
    };
    let row = features
      .iter()
      .map(|c| read(c.as_str()))
      .collect::<Result<Vec<f32>>>()?;
    rows.push(row);
    labels.push(read(target)?);
  }
  Ok((rows, labels))
}

/// Inverse of `split_records` for plain numeric data; feature columns are named `x0`, `x1`, ...
pub fn to_records(rows: &[Vec<f32>], labels: &[f32], target: &str) -> Vec<Record> {
  rows
    .iter()
    .zip(labels)
    .map(|(row, label)| {
      let mut record: Record = row
        .iter()
        .enumerate()
        .map(|(j, v)| (format!("x{}", j), Value::from(*v)))
        .collect();
      record.insert(target.to_string(), Value::from(*label));
      record
    })
    .collect()
}
