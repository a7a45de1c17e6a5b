use axum::{
  body::Bytes,
  extract::State,
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
  Json, Router,
};
use tracing::{error, info, warn};

use super::packet::{split_records, ErrorResponse, PredictRequest};
use crate::{
  model::TrainingConfig,
  service::TrainingService,
  Error,
};

#[derive(Debug, Clone)]
pub struct AppState {
  pub service: TrainingService,
  /// Used when the request does not name `epochs`; its seed applies to every request.
  pub defaults: TrainingConfig,
}

pub struct Server {
  port: u16,
  state: AppState,
}

impl Server {
  pub fn new(port: u16, service: TrainingService, defaults: TrainingConfig) -> Self {
    Self {
      port,
      state: AppState { service, defaults },
    }
  }

  pub fn router(state: AppState) -> Router {
    Router::new()
      .route("/api/predict", post(Self::handle_predict))
      .route("/health", get(|| async { "ok" }))
      .with_state(state)
  }

  pub async fn run(self) -> std::io::Result<()> {
    let server_addr = format!("0.0.0.0:{}", self.port);
    let timeout = self.state.service.timeout();
    let app = Self::router(self.state);
    let tcp_listener = tokio::net::TcpListener::bind(&server_addr).await?;
    match timeout {
      Some(limit) => info!("listening on {}, training timeout {:?}", server_addr, limit),
      None => info!("listening on {}, no training timeout", server_addr),
    }
    axum::serve(tcp_listener, app).await
  }

  async fn handle_predict(State(state): State<AppState>, body: Bytes) -> Response {
    let request: PredictRequest = match serde_json::from_slice(&body) {
      Ok(request) => request,
      Err(e) => {
        warn!("rejecting malformed body: {}", e);
        return error_response(StatusCode::BAD_REQUEST, "Invalid JSON body", Some(e.to_string()));
      }
    };
    let (records, target) = match (request.csv_data, request.target_column) {
      (Some(records), Some(target)) => (records, target),
      _ => {
        return error_response(
          StatusCode::BAD_REQUEST,
          "Missing required fields",
          Some("csvData and targetColumn are required".to_string()),
        )
      }
    };
    let config = TrainingConfig {
      epochs: request.epochs.unwrap_or(state.defaults.epochs),
      ..state.defaults
    };

    let result = match split_records(&records, &target) {
      Ok((rows, labels)) => state.service.train_and_predict(rows, labels, config).await,
      Err(e) => Err(e),
    };
    match result {
      Ok(prediction) => {
        info!(rows = prediction.prediction.len(), "prediction served");
        (StatusCode::OK, Json(prediction)).into_response()
      }
      Err(e) => {
        error!("prediction failed: {}", e);
        error_from(&e)
      }
    }
  }
}

fn error_from(e: &Error) -> Response {
  let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
  let message = if e.is_client_error() {
    "Invalid training data"
  } else {
    "Failed to train model"
  };
  error_response(status, message, Some(e.to_string()))
}

fn error_response(status: StatusCode, error: &str, details: Option<String>) -> Response {
  (status, Json(ErrorResponse::new(error, details))).into_response()
}
