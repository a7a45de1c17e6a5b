use serde::Serialize;
use std::path::Path;

#[cfg(not(debug_assertions))]
use human_panic::setup_panic;
use tracing::subscriber::{DefaultGuard, SetGlobalDefaultError};

#[cfg(debug_assertions)]
extern crate better_panic;

use tracing_subscriber::EnvFilter;

use crate::{Error, Result};

// [NOTE] tracing
//
// In code use:
//
// use tracing::{trace, debug, info, warn, error};
//
// `#[tracing::instrument]` opens a span per call, named after the function.
// The training pipeline logs one `debug!` per epoch and an `info!` summary per run.

fn env_filter(default: &str) -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

pub fn install_logger() -> std::result::Result<(), SetGlobalDefaultError> {
  let subscriber = tracing_subscriber::fmt()
    .compact()
    .with_env_filter(env_filter("info"))
    .finish();
  tracing::subscriber::set_global_default(subscriber)
}

pub fn init_logging() -> std::result::Result<(), SetGlobalDefaultError> {
  // Human Panic. Only enabled when *not* debugging.
  #[cfg(not(debug_assertions))]
  {
    setup_panic!();
  }

  // Better Panic. Only enabled *when* debugging.
  #[cfg(debug_assertions)]
  {
    better_panic::Settings::debug()
      .most_recent_first(false)
      .lineno_suffix(true)
      .verbosity(better_panic::Verbosity::Full)
      .install();
  }

  // Setup Logging
  install_logger()?;

  Ok(())
}

/// Thread-local subscriber writing through the test harness. Keep the guard alive for the test.
pub fn init_logging_tests() -> DefaultGuard {
  let subscriber = tracing_subscriber::fmt()
    .compact()
    .with_test_writer()
    .with_env_filter(env_filter("warn"))
    .finish();
  tracing::subscriber::set_default(subscriber)
}

pub fn serialize_to_file<T: Serialize>(path: &Path, obj: &T) -> Result<()> {
  let buff = serde_json::to_string_pretty(obj)
    .map_err(|e| Error::invalid(format!("cannot serialize output: {}", e)))?;
  std::fs::write(path, buff)?;
  Ok(())
}
