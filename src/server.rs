//! HTTP surface: sensor ingestion, UI feed, retrain trigger, metrics.
//!
//! Routes:
//! - `POST /sensor_data` - one sample per call from any producer
//! - `GET  /data`        - recent results and anomalies for the UI feed
//! - `POST /retrain`     - manual retrain over the engine's sample archive
//! - `GET  /metrics`     - Prometheus text exposition for the scraper
//! - `GET  /health`      - liveness plus degraded-state flag
//!
//! # Architecture
//!
//! ```text
//! producer ──→ POST /sensor_data ──→ ScoringEngine ──→ {recent, anomalies, metrics}
//!                                         │ current()
//! POST /retrain ──→ TrainingJob ──→ ModelStore (persist, then swap)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::core::{FeatureSchema, Sample};
use crate::engine::{ClassificationResult, ScoreStatus, ScoringEngine};
use crate::metrics::{MonitorMetrics, METRICS_CONTENT_TYPE};
use crate::trainer::{TrainError, TrainingJob};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared server state
pub struct ServerState {
    pub engine: Arc<ScoringEngine>,
    pub trainer: Arc<TrainingJob>,
    pub metrics: Arc<MonitorMetrics>,
    pub schema: FeatureSchema,
}

/// Response from the sensor ingestion endpoint
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub status: String,
    pub message: String,
    pub is_anomaly: bool,
}

/// UI feed response
#[derive(Serialize)]
pub struct DataResponse {
    pub recent_data: Vec<ClassificationResult>,
    pub anomalies: Vec<ClassificationResult>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
}

/// Retrain trigger response
#[derive(Serialize)]
pub struct RetrainResponse {
    pub status: String,
    pub model_version: u64,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.engine.model_loaded(),
    })
}

/// POST /sensor_data
///
/// Accepts one JSON object with a numeric field per configured metric.
/// The sample is timestamped here; producers only guarantee field names.
async fn sensor_data(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<IngestResponse>, (StatusCode, Json<ErrorResponse>)> {
    let fields = body.as_object().ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "expected a JSON object of metric readings".to_string(),
                code: "INVALID_BODY".to_string(),
            }),
        )
    })?;

    let mut values = Vec::with_capacity(state.schema.len());
    for name in state.schema.names() {
        let value = fields.get(name).and_then(|v| v.as_f64()).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("missing or non-numeric field '{name}'"),
                    code: "MISSING_FIELD".to_string(),
                }),
            )
        })?;
        values.push(value);
    }

    let mut sample = Sample::at(Utc::now(), values);
    if let Some(source) = fields.get("source_id").and_then(|v| v.as_str()) {
        sample = sample.with_source(source);
    }

    match state.engine.ingest(sample) {
        Err(e) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: e.to_string(),
                code: "SCHEMA_MISMATCH".to_string(),
            }),
        )),
        Ok(None) => Ok(Json(IngestResponse {
            status: "success".to_string(),
            message: "sample recorded; window warming up".to_string(),
            is_anomaly: false,
        })),
        Ok(Some(result)) if result.status == ScoreStatus::NoModel => Ok(Json(IngestResponse {
            status: "degraded".to_string(),
            message: "no model loaded; sample recorded without scoring".to_string(),
            is_anomaly: false,
        })),
        Ok(Some(result)) => Ok(Json(IngestResponse {
            status: "success".to_string(),
            message: "data received and processed".to_string(),
            is_anomaly: result.is_anomaly,
        })),
    }
}

/// GET /data
async fn data(State(state): State<Arc<ServerState>>) -> Json<DataResponse> {
    Json(DataResponse {
        recent_data: state.engine.recent(),
        anomalies: state.engine.anomalies(),
    })
}

/// GET /metrics
async fn metrics(State(state): State<Arc<ServerState>>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
        state.metrics.render(),
    )
        .into_response()
}

/// POST /retrain
///
/// Snapshots the engine's sample archive and runs one training pass on a
/// blocking task, so ingestion keeps flowing while the forest fits.
async fn retrain(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<RetrainResponse>, (StatusCode, Json<ErrorResponse>)> {
    let trainer = state.trainer.clone();
    let batch = state.engine.snapshot_archive();

    let outcome = tokio::task::spawn_blocking(move || trainer.run_once(&batch))
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("training task failed: {e}"),
                    code: "TRAIN_PANIC".to_string(),
                }),
            )
        })?;

    match outcome {
        Ok(model) => {
            state.metrics.model_version.set(model.version as i64);
            Ok(Json(RetrainResponse {
                status: "ok".to_string(),
                model_version: model.version,
            }))
        }
        Err(e @ TrainError::InsufficientData { .. }) => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: e.to_string(),
                code: "INSUFFICIENT_DATA".to_string(),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
                code: "TRAIN_ERROR".to_string(),
            }),
        )),
    }
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    state: ServerState,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(state);

    let app = Router::new()
        .route("/health", get(health))
        .route("/sensor_data", post(sensor_data))
        .route("/data", get(data))
        .route("/metrics", get(metrics))
        .route("/retrain", post(retrain))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("building health agent listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("server shutdown signal received");
            })
            .await
        {
            tracing::error!("server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
