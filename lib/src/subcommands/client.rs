use std::path::{Path, PathBuf};

use reqwest::header::CONTENT_TYPE;
use tracing::info;

use super::packet::{to_records, ErrorResponse, PredictRequest};
use crate::{model::PredictionResult, Error, Result};

const TARGET_COLUMN: &str = "y";

/// Sends a local dataset file to a running server and prints the predictions.
pub struct Client {
  url: String,
  input_path: PathBuf,
  epochs: Option<usize>,
}

impl Client {
  pub fn new(input_path: &Path, url: String, epochs: Option<usize>) -> Self {
    Self {
      url: format!("{}/api/predict", url.trim_end_matches('/')),
      input_path: PathBuf::from(input_path),
      epochs,
    }
  }

  pub fn build_request(&self) -> Result<PredictRequest> {
    let (rows, labels) = crate::model::read_dataset(&self.input_path)?;
    Ok(PredictRequest {
      csv_data: Some(to_records(&rows, &labels, TARGET_COLUMN)),
      target_column: Some(TARGET_COLUMN.to_string()),
      epochs: self.epochs,
    })
  }

  pub async fn run(self) -> Result<PredictionResult> {
    let body = serde_json::to_string(&self.build_request()?)
      .map_err(|e| Error::invalid(format!("cannot encode request: {}", e)))?;
    info!("posting {} bytes to {}", body.len(), self.url);

    let client = reqwest::Client::new();
    let response = client
      .post(&self.url)
      .header(CONTENT_TYPE, "application/json")
      .body(body)
      .send()
      .await
      .map_err(transport_error)?;
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;

    if status.is_success() {
      serde_json::from_str(&text)
        .map_err(|e| Error::TrainingFailed(format!("unexpected response body: {}", e)))
    } else {
      let detail = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(err) => format!("{}: {}", err.error, err.details.unwrap_or_default()),
        Err(_) => text,
      };
      if status.is_client_error() {
        Err(Error::InvalidInput(detail))
      } else {
        Err(Error::TrainingFailed(format!("server answered {}: {}", status, detail)))
      }
    }
  }
}

fn transport_error(e: reqwest::Error) -> Error {
  Error::TrainingFailed(format!("request failed: {}", e))
}
