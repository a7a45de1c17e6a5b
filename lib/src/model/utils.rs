use std::path::Path;

use super::{InputsVec, OutputsVec};
use crate::{Error, Result};

/// Mean squared error. Slices are expected to have equal, non-zero length.
pub fn mse(predictions: &[f32], targets: &[f32]) -> f32 {
  let n = predictions.len().max(1) as f32;
  predictions
    .iter()
    .zip(targets)
    .map(|(p, t)| (p - t) * (p - t))
    .sum::<f32>()
    / n
}

/// Whitespace separated numbers, one sample per line, label last.
/// Blank lines and `#` comments are skipped. Shape checks are left to `Dataset::new`.
pub fn parse_dataset(content: &str) -> Result<(InputsVec, OutputsVec)> {
  let mut x: InputsVec = Vec::new();
  let mut y: OutputsVec = Vec::new();
  for (lineno, line) in content.lines().enumerate() {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }
    let mut parts = line
      .split_whitespace()
      .map(|val| {
        val.parse::<f32>().map_err(|e| {
          Error::invalid(format!("line {}: cannot parse {:?}: {}", lineno + 1, val, e))
        })
      })
      .collect::<Result<Vec<f32>>>()?;
    if parts.len() < 2 {
      return Err(Error::invalid(format!(
        "line {}: expected at least one feature and a label",
        lineno + 1
      )));
    }
    // len checked above
    let label = parts.pop().unwrap_or_default();
    x.push(parts);
    y.push(label);
  }
  Ok((x, y))
}

pub fn read_dataset(path: &Path) -> Result<(InputsVec, OutputsVec)> {
  let content = std::fs::read_to_string(path)?;
  parse_dataset(&content)
}
