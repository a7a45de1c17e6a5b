use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::{debug, info, instrument};

use super::{
  network::{InputScaler, ModelSpec, Network, Trace},
  optim::Adam,
  utils::mse,
  InputsVec, OutputsVec, PredictionResult, TrainedModel, TrainingConfig, TrainingParams,
  TrainingReport,
};
use crate::{Error, Result};

pub const BATCH_SIZE: usize = 32;

/// Shared flag polled by the training loop between epochs.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// Validates, trains a fresh regressor and predicts on the training rows.
pub fn train_and_predict(rows: InputsVec, labels: OutputsVec, epochs: usize) -> Result<PredictionResult> {
  train_and_predict_with(rows, labels, TrainingConfig::new(epochs))
}

pub fn train_and_predict_with(
  rows: InputsVec,
  labels: OutputsVec,
  config: TrainingConfig,
) -> Result<PredictionResult> {
  let params = TrainingParams::new(rows, labels, config)?;
  run_model(params).map(|trained| trained.prediction)
}

pub fn run_model(train_params: TrainingParams) -> Result<TrainedModel> {
  run_model_with_cancel(train_params, &CancelFlag::new())
}

/// construct -> compile -> fit -> predict. Cancellation is honoured at epoch boundaries only.
#[instrument(level = "debug", skip_all, fields(rows = train_params.data.len(), width = train_params.data.width(), epochs = train_params.config.epochs))]
pub fn run_model_with_cancel(train_params: TrainingParams, cancel: &CancelFlag) -> Result<TrainedModel> {
  let TrainingParams { data, config } = train_params;
  // params built without TrainingParams::new still get checked before any compute
  config.validate()?;
  let epochs = config.epochs;
  let mut rng = match config.seed {
    Some(seed) => StdRng::seed_from_u64(seed),
    None => StdRng::from_entropy(),
  };

  // construct
  let scaler = InputScaler::fit(&data);
  let mut network = Network::initialize(ModelSpec::regressor(data.width()), scaler, &mut rng);
  let inputs: InputsVec = data.rows().iter().map(|r| network.scaler().transform(r)).collect();
  let labels = data.labels();

  // compile
  let mut optimizer = Adam::default();
  optimizer.attach(&network);
  let mut grads = network.gradients();
  let mut trace = Trace::default();
  debug!(params = network.n_params(), "model compiled");

  // fit
  let mut order: Vec<usize> = (0..data.len()).collect();
  let mut epoch_losses = Vec::with_capacity(epochs);
  let start = std::time::Instant::now();
  for epoch in 0..epochs {
    if cancel.is_cancelled() {
      info!(completed = epoch, requested = epochs, "training cancelled");
      return Err(Error::Cancelled {
        completed: epoch,
        requested: epochs,
      });
    }
    order.shuffle(&mut rng);
    let mut total = 0.0f32;
    for batch in order.chunks(BATCH_SIZE) {
      grads.zero();
      let n = batch.len() as f32;
      for &i in batch {
        let y_hat = network.forward_traced(&inputs[i], &mut trace);
        let diff = y_hat - labels[i];
        total += diff * diff;
        network.backward(&trace, 2.0 * diff / n, &mut grads);
      }
      optimizer.step(&mut network, &grads);
    }
    let epoch_loss = total / data.len() as f32;
    if !epoch_loss.is_finite() || !network.is_finite() {
      return Err(Error::TrainingFailed(format!(
        "training diverged at epoch {}: loss is {}",
        epoch + 1,
        epoch_loss
      )));
    }
    debug!(epoch = epoch + 1, loss = epoch_loss, "epoch done");
    epoch_losses.push(epoch_loss);
  }

  // predict
  let prediction = network.predict(data.rows());
  if let Some(i) = prediction.iter().position(|p| !p.is_finite()) {
    return Err(Error::TrainingFailed(format!(
      "prediction for row {} is not finite",
      i
    )));
  }
  let final_loss = mse(&prediction, labels);
  let elapsed = start.elapsed();
  info!(
    "Finished {} epochs ({} optimizer steps) in {:.2}s, final loss {:.4}",
    epochs,
    optimizer.steps(),
    elapsed.as_secs_f32(),
    final_loss
  );

  Ok(TrainedModel {
    prediction: PredictionResult { prediction },
    report: TrainingReport {
      epochs,
      epoch_losses,
      final_loss,
      elapsed_secs: elapsed.as_secs_f32(),
    },
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::utils::init_logging_tests;

  fn line(n: usize) -> (InputsVec, OutputsVec) {
    let rows = (0..n).map(|x| vec![x as f32]).collect();
    let labels = (0..n).map(|x| 2.0 * x as f32).collect();
    (rows, labels)
  }

  fn seeded(rows: InputsVec, labels: OutputsVec, epochs: usize, seed: u64) -> TrainedModel {
    let config = TrainingConfig::new(epochs).with_seed(seed);
    run_model(TrainingParams::new(rows, labels, config).unwrap()).unwrap()
  }

  #[test]
  fn prediction_has_one_value_per_row() {
    let _guard = init_logging_tests();
    let rows = vec![vec![1.0, 2.0, 3.0], vec![0.0, -1.0, 4.0], vec![5.0, 5.0, 5.0]];
    let result = train_and_predict(rows, vec![1.0, 2.0, 3.0], 3).unwrap();
    assert_eq!(result.prediction.len(), 3);
    assert!(result.prediction.iter().all(|p| p.is_finite()));
  }

  #[test]
  fn validation_errors_surface_before_training() {
    let cases: Vec<(InputsVec, OutputsVec, usize)> = vec![
      (vec![], vec![], 50),
      (vec![vec![1.0, 2.0], vec![1.0]], vec![0.0, 1.0], 50),
      (vec![vec![1.0], vec![2.0]], vec![0.0], 50),
      (vec![vec![1.0]], vec![0.0], 0),
    ];
    for (rows, labels, epochs) in cases {
      let err = train_and_predict(rows, labels, epochs).unwrap_err();
      assert!(matches!(err, Error::InvalidInput(_)), "{err}");
    }
  }

  #[test]
  fn zero_epochs_rejected_even_without_constructor() {
    let data = crate::model::Dataset::new(vec![vec![1.0]], vec![1.0]).unwrap();
    let params = TrainingParams {
      data,
      config: TrainingConfig::new(0),
    };
    assert!(matches!(run_model(params), Err(Error::InvalidInput(_))));
  }

  #[test]
  fn same_seed_same_predictions() {
    let (rows, labels) = line(10);
    let a = seeded(rows.clone(), labels.clone(), 20, 42);
    let b = seeded(rows, labels, 20, 42);
    for (x, y) in a.prediction.prediction.iter().zip(&b.prediction.prediction) {
      assert!((x - y).abs() < 1e-5, "{x} vs {y}");
    }
  }

  #[test]
  fn more_epochs_lower_loss() {
    let (rows, labels) = line(10);
    let one = seeded(rows.clone(), labels.clone(), 1, 7);
    let fifty = seeded(rows, labels, 50, 7);
    assert!(
      fifty.report.final_loss < one.report.final_loss,
      "50 epochs: {}, 1 epoch: {}",
      fifty.report.final_loss,
      one.report.final_loss
    );
    assert_eq!(fifty.report.epoch_losses.len(), 50);
  }

  #[test]
  fn report_has_one_loss_per_epoch() {
    let (rows, labels) = line(10);
    let trained = seeded(rows, labels, 30, 3);
    let losses = &trained.report.epoch_losses;
    assert_eq!(trained.report.epochs, 30);
    assert_eq!(losses.len(), 30);
    assert!(losses.iter().all(|l| l.is_finite() && *l >= 0.0));
    assert!(losses[29] < losses[0], "first {}, last {}", losses[0], losses[29]);
  }

  // Seed pinned: about 1% of random initialisations settle in a dead-ReLU minimum on four
  // points and miss the band.
  #[test]
  fn fits_a_single_feature_line() {
    let _guard = init_logging_tests();
    let (rows, labels) = line(4);
    let trained = seeded(rows, labels.clone(), 200, 1);
    for (p, y) in trained.prediction.prediction.iter().zip(&labels) {
      assert!(p.is_finite());
      assert!((p - y).abs() <= 3.0, "predicted {p} for {y}");
    }
  }

  #[test]
  fn pre_cancelled_flag_stops_before_first_epoch() {
    let (rows, labels) = line(4);
    let params = TrainingParams::new(rows, labels, TrainingConfig::new(10)).unwrap();
    let flag = CancelFlag::new();
    flag.cancel();
    match run_model_with_cancel(params, &flag) {
      Err(Error::Cancelled {
        completed,
        requested,
      }) => {
        assert_eq!(completed, 0);
        assert_eq!(requested, 10);
      }
      other => panic!("expected cancellation, got {other:?}"),
    }
  }

  #[test]
  fn divergence_is_reported() {
    // squares of these overflow f32 on the first pass
    let rows = vec![vec![1.0], vec![2.0]];
    let labels = vec![f32::MAX, -f32::MAX];
    let err = train_and_predict(rows, labels, 5).unwrap_err();
    assert!(matches!(err, Error::TrainingFailed(_)), "{err}");
  }
}
