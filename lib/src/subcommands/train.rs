use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::{
  model::{read_dataset, run_model, TrainingConfig, TrainingParams, TrainingReport},
  utils::serialize_to_file,
  Result,
};

#[derive(Debug, Serialize)]
pub struct TrainOutput {
  pub prediction: Vec<f32>,
  pub report: TrainingReport,
}

/// Trains on a local dataset file and writes predictions plus the training report as JSON.
pub struct Train {
  dataset_path: PathBuf,
  output_path: Option<PathBuf>,
  config: TrainingConfig,
}

impl Train {
  pub fn new(dataset_path: &Path, output_path: Option<&Path>, config: TrainingConfig) -> Self {
    Self {
      dataset_path: PathBuf::from(dataset_path),
      output_path: output_path.map(PathBuf::from),
      config,
    }
  }

  pub fn run(self) -> Result<TrainOutput> {
    let (rows, labels) = read_dataset(&self.dataset_path)?;
    let params = TrainingParams::new(rows, labels, self.config)?;
    info!(
      "training on {} rows of width {} for {} epochs",
      params.data.len(),
      params.data.width(),
      params.config.epochs
    );
    let trained = run_model(params)?;
    let output = TrainOutput {
      prediction: trained.prediction.prediction,
      report: trained.report,
    };
    if let Some(path) = &self.output_path {
      serialize_to_file(path, &output)?;
      info!("wrote predictions to {}", path.display());
    }
    Ok(output)
  }
}
