use std::time::Duration;

use tracing::{instrument, warn};

use crate::{
  model::{
    run_model_with_cancel, CancelFlag, InputsVec, OutputsVec, PredictionResult, TrainedModel,
    TrainingConfig, TrainingParams,
  },
  Error, Result,
};

/// Async front of the training pipeline for request-serving contexts.
///
/// Every call validates its input on the calling task, then trains on the blocking pool with its
/// own network and RNG. With a timeout set, an expired call returns `Error::TimedOut` right away
/// and the worker is told to stop at its next epoch boundary.
#[derive(Debug, Clone, Default)]
pub struct TrainingService {
  timeout: Option<Duration>,
}

impl TrainingService {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_timeout(timeout: Duration) -> Self {
    Self {
      timeout: Some(timeout),
    }
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.timeout
  }

  pub async fn train_and_predict(
    &self,
    rows: InputsVec,
    labels: OutputsVec,
    config: TrainingConfig,
  ) -> Result<PredictionResult> {
    let params = TrainingParams::new(rows, labels, config)?;
    self.run(params).await.map(|trained| trained.prediction)
  }

  #[instrument(level = "debug", skip_all, fields(rows = params.data.len(), epochs = params.config.epochs))]
  pub async fn run(&self, params: TrainingParams) -> Result<TrainedModel> {
    let cancel = CancelFlag::new();
    let worker_cancel = cancel.clone();
    let handle = tokio::task::spawn_blocking(move || run_model_with_cancel(params, &worker_cancel));

    let joined = match self.timeout {
      Some(limit) => match tokio::time::timeout(limit, handle).await {
        Ok(joined) => joined,
        Err(_) => {
          warn!("training exceeded {:?}, cancelling at next epoch boundary", limit);
          cancel.cancel();
          return Err(Error::TimedOut(limit));
        }
      },
      None => handle.await,
    };
    joined.map_err(|e| Error::TrainingFailed(format!("training worker failed: {}", e)))?
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn line(n: usize, slope: f32) -> (InputsVec, OutputsVec) {
    let rows = (0..n).map(|x| vec![x as f32]).collect();
    let labels = (0..n).map(|x| slope * x as f32).collect();
    (rows, labels)
  }

  #[test]
  fn timeout_is_optional() {
    assert_eq!(TrainingService::new().timeout(), None);
    let limit = Duration::from_secs(3);
    assert_eq!(TrainingService::with_timeout(limit).timeout(), Some(limit));
  }

  #[tokio::test]
  async fn returns_one_prediction_per_row() {
    let (rows, labels) = line(6, 1.0);
    let result = TrainingService::new()
      .train_and_predict(rows, labels, TrainingConfig::new(5))
      .await
      .unwrap();
    assert_eq!(result.prediction.len(), 6);
  }

  #[tokio::test]
  async fn invalid_input_is_rejected_without_training() {
    let err = TrainingService::new()
      .train_and_predict(vec![vec![1.0, 2.0], vec![1.0]], vec![0.0, 1.0], TrainingConfig::default())
      .await
      .unwrap_err();
    assert!(err.is_client_error(), "{err}");
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn concurrent_calls_do_not_interfere() {
    let service = TrainingService::new();
    let (rows_a, labels_a) = line(10, 2.0);
    let (rows_b, labels_b) = line(7, -3.0);
    let config_a = TrainingConfig::new(40).with_seed(1);
    let config_b = TrainingConfig::new(40).with_seed(2);

    let alone_a = service
      .train_and_predict(rows_a.clone(), labels_a.clone(), config_a)
      .await
      .unwrap();
    let alone_b = service
      .train_and_predict(rows_b.clone(), labels_b.clone(), config_b)
      .await
      .unwrap();

    let (together_a, together_b) = tokio::join!(
      service.train_and_predict(rows_a, labels_a, config_a),
      service.train_and_predict(rows_b, labels_b, config_b),
    );
    assert_eq!(together_a.unwrap(), alone_a);
    assert_eq!(together_b.unwrap(), alone_b);
  }

  #[tokio::test]
  async fn timeout_cancels_long_training() {
    let rows: InputsVec = (0..2000).map(|i| vec![i as f32, (i % 7) as f32, 1.0]).collect();
    let labels: OutputsVec = (0..2000).map(|i| (i % 13) as f32).collect();
    let service = TrainingService::with_timeout(Duration::from_millis(20));
    let err = service
      .train_and_predict(rows, labels, TrainingConfig::new(1_000_000))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::TimedOut(_)), "{err}");
  }
}
