//! Integration tests for the agent's HTTP surface

use std::sync::Arc;
use std::time::Duration;

use buildhealth_agent::{
    core::{FeatureSchema, FeatureWindow},
    engine::ScoringEngine,
    metrics::MonitorMetrics,
    model::ModelStore,
    server::{run, ServerConfig, ServerState},
    trainer::{TrainingConfig, TrainingJob},
};

struct TestAgent {
    addr: std::net::SocketAddr,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
    _dir: tempfile::TempDir,
}

/// Start a fresh agent on a random port with no model installed.
async fn start_agent(min_samples: usize) -> TestAgent {
    let dir = tempfile::tempdir().expect("tempdir");
    let schema = FeatureSchema::building_defaults();
    let store = Arc::new(ModelStore::new(dir.path().join("model.json")));
    let metrics = Arc::new(MonitorMetrics::new());

    let engine = Arc::new(ScoringEngine::new(
        FeatureWindow::new(schema.clone(), 1),
        store.clone(),
        metrics.clone(),
    ));
    let trainer = Arc::new(TrainingJob::new(
        store,
        schema.clone(),
        TrainingConfig {
            min_samples,
            ..TrainingConfig::default()
        },
    ));

    let state = ServerState {
        engine,
        trainer,
        metrics,
        schema,
    };

    let (addr, shutdown_tx) = run(ServerConfig::new(0), state)
        .await
        .expect("Failed to start server");

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(100)).await;

    TestAgent {
        addr,
        shutdown_tx,
        _dir: dir,
    }
}

fn reading(temperature: f64, humidity: f64, pressure: f64, vibration: f64) -> serde_json::Value {
    serde_json::json!({
        "temperature": temperature,
        "humidity": humidity,
        "pressure": pressure,
        "vibration": vibration,
    })
}

#[tokio::test]
async fn test_health_endpoint_reports_degraded_start() {
    let agent = start_agent(32).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/health", agent.addr))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model_loaded"], false);
    assert!(body["version"].as_str().is_some());

    let _ = agent.shutdown_tx.send(());
}

#[tokio::test]
async fn test_ingest_without_model_is_degraded_not_fatal() {
    let agent = start_agent(32).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/sensor_data", agent.addr))
        .json(&reading(22.0, 50.0, 1010.0, 1.0))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["is_anomaly"], false);

    let _ = agent.shutdown_tx.send(());
}

#[tokio::test]
async fn test_ingest_rejects_missing_fields() {
    let agent = start_agent(32).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/sensor_data", agent.addr))
        .json(&serde_json::json!({"temperature": 22.0}))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "MISSING_FIELD");

    let _ = agent.shutdown_tx.send(());
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_counters() {
    let agent = start_agent(32).await;

    let client = reqwest::Client::new();
    for _ in 0..3 {
        client
            .post(format!("http://{}/sensor_data", agent.addr))
            .json(&reading(22.0, 50.0, 1010.0, 1.0))
            .send()
            .await
            .expect("Failed to send request");
    }

    let response = client
        .get(format!("http://{}/metrics", agent.addr))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = response.text().await.expect("Failed to read body");
    assert!(body.contains("samples_processed_total 3"));
    assert!(body.contains("anomalies_detected_total"));
    assert!(body.contains("model_version"));

    let _ = agent.shutdown_tx.send(());
}

#[tokio::test]
async fn test_retrain_with_empty_archive_reports_insufficient_data() {
    let agent = start_agent(32).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/retrain", agent.addr))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "INSUFFICIENT_DATA");

    let _ = agent.shutdown_tx.send(());
}

#[tokio::test]
async fn test_retrain_over_archive_then_score() {
    // Low min_samples so the archived readings are enough to train on
    let agent = start_agent(16).await;
    let client = reqwest::Client::new();

    // Fill the archive with normal readings
    for i in 0..40 {
        let jitter = (i % 10) as f64 * 0.1;
        client
            .post(format!("http://{}/sensor_data", agent.addr))
            .json(&reading(
                21.0 + jitter,
                48.0 + jitter,
                1008.0,
                1.0 + jitter * 0.05,
            ))
            .send()
            .await
            .expect("Failed to send request");
    }

    // Trigger retraining over the archive
    let response = client
        .post(format!("http://{}/retrain", agent.addr))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["model_version"], 1);

    // Health now reports a loaded model
    let health: serde_json::Value = client
        .get(format!("http://{}/health", agent.addr))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(health["model_loaded"], true);

    // A wildly out-of-range reading now classifies as anomalous
    let verdict: serde_json::Value = client
        .post(format!("http://{}/sensor_data", agent.addr))
        .json(&reading(400.0, 99.0, 500.0, 50.0))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(verdict["status"], "success");
    assert_eq!(verdict["is_anomaly"], true);

    // And shows up in the UI feed
    let data: serde_json::Value = client
        .get(format!("http://{}/data", agent.addr))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert!(!data["anomalies"].as_array().unwrap().is_empty());
    assert_eq!(data["recent_data"].as_array().unwrap().len(), 41);

    let _ = agent.shutdown_tx.send(());
}
