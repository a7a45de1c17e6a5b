pub mod error;
pub mod model;
pub mod service;
pub mod subcommands;
pub mod utils;

pub use error::{Error, Result};
pub use model::{train_and_predict, PredictionResult, TrainingConfig};
pub use service::TrainingService;
