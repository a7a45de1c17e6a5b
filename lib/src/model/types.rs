use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_EPOCHS: usize = 50;

pub type InputsVec = Vec<Vec<f32>>;
pub type OutputsVec = Vec<f32>;

/// Rectangular numeric dataset: `len()` rows of `width()` features, one label per row.
/// Only constructible through validation, so holding one means the shape invariants hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
  rows: InputsVec,
  labels: OutputsVec,
  width: usize,
}

impl Dataset {
  pub fn new(rows: InputsVec, labels: OutputsVec) -> Result<Self> {
    let width = match rows.first() {
      Some(first) => first.len(),
      None => return Err(Error::invalid("rows must not be empty")),
    };
    if width == 0 {
      return Err(Error::invalid("rows must have at least one feature"));
    }
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != width) {
      return Err(Error::invalid(format!(
        "row {} has {} features, expected {}",
        i,
        row.len(),
        width
      )));
    }
    if labels.len() != rows.len() {
      return Err(Error::invalid(format!(
        "got {} labels for {} rows",
        labels.len(),
        rows.len()
      )));
    }
    for (i, row) in rows.iter().enumerate() {
      if let Some(j) = row.iter().position(|v| !v.is_finite()) {
        return Err(Error::invalid(format!(
          "row {} column {} is not a finite number",
          i, j
        )));
      }
    }
    if let Some(i) = labels.iter().position(|v| !v.is_finite()) {
      return Err(Error::invalid(format!("label {} is not a finite number", i)));
    }
    Ok(Dataset {
      rows,
      labels,
      width,
    })
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn rows(&self) -> &[Vec<f32>] {
    &self.rows
  }

  pub fn labels(&self) -> &[f32] {
    &self.labels
  }
}

/// Knobs exposed to callers. Optimiser and loss are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingConfig {
  pub epochs: usize,
  /// Seeds weight initialisation and sample shuffling. `None` draws from OS entropy.
  #[serde(default)]
  pub seed: Option<u64>,
}

impl Default for TrainingConfig {
  fn default() -> Self {
    Self {
      epochs: DEFAULT_EPOCHS,
      seed: None,
    }
  }
}

impl TrainingConfig {
  pub fn new(epochs: usize) -> Self {
    Self {
      epochs,
      ..Default::default()
    }
  }

  pub fn with_seed(self, seed: u64) -> Self {
    Self {
      seed: Some(seed),
      ..self
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.epochs == 0 {
      return Err(Error::invalid("epochs must be a positive integer"));
    }
    Ok(())
  }
}

/// A validated training request.
#[derive(Debug, Clone)]
pub struct TrainingParams {
  pub data: Dataset,
  pub config: TrainingConfig,
}

impl TrainingParams {
  /// Validates everything up front, so nothing is computed for a bad request.
  pub fn new(rows: InputsVec, labels: OutputsVec, config: TrainingConfig) -> Result<Self> {
    config.validate()?;
    let data = Dataset::new(rows, labels)?;
    Ok(Self { data, config })
  }
}

/// Same-sample predictions, in input row order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
  pub prediction: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
  pub epochs: usize,
  /// Mean training loss of every epoch, measured before each batch's update.
  pub epoch_losses: Vec<f32>,
  /// MSE of the returned predictions against the labels.
  pub final_loss: f32,
  pub elapsed_secs: f32,
}

#[derive(Debug, Clone)]
pub struct TrainedModel {
  pub prediction: PredictionResult,
  pub report: TrainingReport,
}
