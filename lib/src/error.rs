use std::time::Duration;

use thiserror::Error;

/// Everything the training pipeline and its boundaries can fail with.
#[derive(Debug, Error)]
pub enum Error {
  /// Malformed or inconsistent dataset/config. Always caller-correctable.
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// The training or inference pipeline itself failed, e.g. diverged to non-finite values.
  #[error("training failed: {0}")]
  TrainingFailed(String),

  #[error("training cancelled after {completed} of {requested} epochs")]
  Cancelled { completed: usize, requested: usize },

  #[error("training did not finish within {0:?}")]
  TimedOut(Duration),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
  pub fn invalid(message: impl Into<String>) -> Self {
    Error::InvalidInput(message.into())
  }

  pub fn is_client_error(&self) -> bool {
    matches!(self, Error::InvalidInput(_))
  }

  /// HTTP status the adapter layer answers with for this error.
  pub fn status_code(&self) -> u16 {
    match self {
      Error::InvalidInput(_) => 400,
      Error::TrainingFailed(_) | Error::Io(_) => 500,
      Error::Cancelled { .. } => 503,
      Error::TimedOut(_) => 504,
    }
  }
}
