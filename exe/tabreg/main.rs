mod app_config;

use tabreg::{model, subcommands, utils, PredictionResult, TrainingConfig, TrainingService};

use app_config::AppConfig;
use clap::{Parser, Subcommand};
use std::{error::Error, path::PathBuf, time::Duration};
use tracing::info;

#[derive(Parser)]
struct Cli {
  /// YAML config file; command line flags take precedence over it
  #[arg(short, long, value_name = "PATH", global = true)]
  config: Option<PathBuf>,
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Train on a local dataset file and print the predictions
  Train {
    /// Whitespace separated samples, label last
    #[arg(short, long, value_name = "PATH")]
    data: PathBuf,
    #[arg(short, long, value_name = "INT")]
    epochs: Option<usize>,
    #[arg(long, value_name = "INT")]
    seed: Option<u64>,
    /// Also write predictions and the training report here as JSON
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
  },
  /// Serve POST /api/predict
  Server {
    #[arg(short, long)]
    port: Option<u16>,
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,
    #[arg(long, value_name = "INT")]
    seed: Option<u64>,
  },
  /// Send a local dataset file to a running server
  Client {
    /// File with the dataset to train on
    #[arg(long, value_name = "PATH")]
    input_file: PathBuf,
    /// Base URL of the server
    #[arg(long, default_value = "http://localhost:4545")]
    url: String,
    #[arg(short, long, value_name = "INT")]
    epochs: Option<usize>,
  },
}

fn training_config(config: &AppConfig) -> TrainingConfig {
  TrainingConfig {
    epochs: config.epochs.unwrap_or(model::DEFAULT_EPOCHS),
    seed: config.seed,
  }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
  utils::init_logging()?;
  let args = Cli::parse();

  let file_config = match &args.config {
    Some(path) => AppConfig::load(path)?,
    None => AppConfig::default(),
  };
  let base = AppConfig::builtin().merge(file_config);

  match args.command {
    Command::Train {
      data,
      epochs,
      seed,
      output,
    } => {
      let config = base.merge(AppConfig {
        epochs,
        seed,
        ..AppConfig::default()
      });
      let app = subcommands::Train::new(&data, output.as_deref(), training_config(&config));
      let result = app.run()?;
      println!("{}", serde_json::to_string(&PredictionResult { prediction: result.prediction })?);
    }
    Command::Server {
      port,
      timeout_secs,
      seed,
    } => {
      let config = base.merge(AppConfig {
        port,
        timeout_secs,
        seed,
        ..AppConfig::default()
      });
      let service = match config.timeout_secs {
        Some(secs) => TrainingService::with_timeout(Duration::from_secs(secs)),
        None => TrainingService::new(),
      };
      let port = config.port.unwrap_or(AppConfig::DEFAULT_PORT);
      info!("starting server on port {}", port);
      let app = subcommands::Server::new(port, service, training_config(&config));
      app.run().await?;
    }
    Command::Client {
      input_file,
      url,
      epochs,
    } => {
      let app = subcommands::Client::new(&input_file, url, epochs);
      let result = app.run().await?;
      println!("{}", serde_json::to_string(&result)?);
    }
  }
  Ok(())
}
