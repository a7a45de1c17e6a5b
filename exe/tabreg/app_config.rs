use std::{error::Error, path::Path};

use serde::Deserialize;

/// Config file format (YAML). Every field may be omitted.
#[derive(Debug, Deserialize, PartialEq)]
pub struct AppConfig {
  /// Port the server listens on
  pub port: Option<u16>,
  /// Epochs used when a request or command does not name them
  pub epochs: Option<usize>,
  /// Fixed seed for weight initialisation and shuffling
  pub seed: Option<u64>,
  /// Abandon a server-side training call after this many seconds
  pub timeout_secs: Option<u64>,
}

impl AppConfig {
  pub const DEFAULT_PORT: u16 = 4545;

  pub fn builtin() -> Self {
    Self {
      port: Some(Self::DEFAULT_PORT),
      epochs: Some(tabreg::model::DEFAULT_EPOCHS),
      seed: None,
      timeout_secs: None,
    }
  }

  pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
  }

  // merge configs where the second overwrites the first
  pub fn merge(self, other: Self) -> Self {
    Self {
      port: other.port.or(self.port),
      epochs: other.epochs.or(self.epochs),
      seed: other.seed.or(self.seed),
      timeout_secs: other.timeout_secs.or(self.timeout_secs),
    }
  }
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      port: None,
      epochs: None,
      seed: None,
      timeout_secs: None,
    }
  }
}
