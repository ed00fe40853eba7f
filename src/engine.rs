//! Streaming scoring engine: sample in, classification out.
//!
//! The engine feeds each sample through its feature window, scores the
//! resulting vector against the store's current model, and publishes the
//! classification to the recent/anomaly logs and the metrics registry.
//!
//! Concurrency: the window sits behind a narrow mutex so concurrent
//! producers for the one stream are serialized before the order-sensitive
//! rolling buffer. Scoring itself runs against an `Arc` snapshot of the
//! model, so a hot-swap never blocks or corrupts an in-flight call.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::core::{FeatureWindow, Sample, SchemaMismatch};
use crate::metrics::MonitorMetrics;
use crate::model::ModelStore;

/// How many recent results and anomalies are retained for the UI feed.
const MAX_RETAINED_RESULTS: usize = 100;

/// Default capacity of the rolling sample archive the trainer snapshots.
const DEFAULT_ARCHIVE_CAPACITY: usize = 2048;

/// Whether a result carries a real score or was produced in degraded mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStatus {
    /// Scored against a loaded model
    Scored,
    /// No model loaded; sample recorded but not scored
    NoModel,
}

/// Outcome of classifying one sample. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Feature vector the classification was made on (the raw reading for
    /// a window of one)
    pub values: Vec<f64>,
    /// Absent in degraded mode; never fabricated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub is_anomaly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<u64>,
    pub classified_at: DateTime<Utc>,
    pub status: ScoreStatus,
}

/// Per-stream scoring engine.
pub struct ScoringEngine {
    window: Mutex<FeatureWindow>,
    store: Arc<ModelStore>,
    metrics: Arc<MonitorMetrics>,
    recent: Mutex<VecDeque<ClassificationResult>>,
    anomalies: Mutex<VecDeque<ClassificationResult>>,
    archive: Mutex<VecDeque<Sample>>,
    archive_capacity: usize,
}

impl ScoringEngine {
    pub fn new(window: FeatureWindow, store: Arc<ModelStore>, metrics: Arc<MonitorMetrics>) -> Self {
        Self::with_archive_capacity(window, store, metrics, DEFAULT_ARCHIVE_CAPACITY)
    }

    pub fn with_archive_capacity(
        window: FeatureWindow,
        store: Arc<ModelStore>,
        metrics: Arc<MonitorMetrics>,
        archive_capacity: usize,
    ) -> Self {
        Self {
            window: Mutex::new(window),
            store,
            metrics,
            recent: Mutex::new(VecDeque::with_capacity(MAX_RETAINED_RESULTS)),
            anomalies: Mutex::new(VecDeque::with_capacity(MAX_RETAINED_RESULTS)),
            archive: Mutex::new(VecDeque::with_capacity(archive_capacity.max(1))),
            archive_capacity: archive_capacity.max(1),
        }
    }

    /// Ingest one sample.
    ///
    /// Returns `Ok(None)` during window warm-up. With no model loaded,
    /// returns a degraded [`ScoreStatus::NoModel`] result with
    /// `is_anomaly = false` rather than fabricating a score. A sample whose
    /// shape disagrees with the schema is dropped: counted, logged, and
    /// surfaced as an error without aborting the stream.
    pub fn ingest(&self, sample: Sample) -> Result<Option<ClassificationResult>, SchemaMismatch> {
        let vector = {
            let mut window = self.window.lock();
            match window.push(&sample) {
                Ok(vector) => vector,
                Err(e) => {
                    self.metrics.schema_mismatches.inc();
                    tracing::warn!(
                        expected = e.expected,
                        got = e.got,
                        "dropping sample with mismatched shape"
                    );
                    return Err(e);
                }
            }
        };

        self.metrics.samples_processed.inc();
        self.push_archive(sample.clone());

        let Some(vector) = vector else {
            return Ok(None); // warm-up
        };

        let classified_at = Utc::now();
        let result = match self.store.current() {
            None => ClassificationResult {
                timestamp: sample.timestamp,
                source_id: sample.source_id,
                values: vector,
                score: None,
                is_anomaly: false,
                model_version: None,
                classified_at,
                status: ScoreStatus::NoModel,
            },
            Some(model) => {
                let (score, is_anomaly) = match model.classify(&vector) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        // Active model disagrees with this stream's window
                        // schema: configuration-level, drop the sample.
                        self.metrics.schema_mismatches.inc();
                        tracing::error!(
                            model_version = model.version,
                            expected = e.expected,
                            got = e.got,
                            "active model schema disagrees with feature window"
                        );
                        return Err(e);
                    }
                };
                self.metrics.model_version.set(model.version as i64);
                ClassificationResult {
                    timestamp: sample.timestamp,
                    source_id: sample.source_id,
                    values: vector,
                    score: Some(score),
                    is_anomaly,
                    model_version: Some(model.version),
                    classified_at,
                    status: ScoreStatus::Scored,
                }
            }
        };

        self.publish(&result);
        Ok(Some(result))
    }

    /// Most recent classification results, oldest first.
    pub fn recent(&self) -> Vec<ClassificationResult> {
        self.recent.lock().iter().cloned().collect()
    }

    /// Retained anomalies, oldest first.
    pub fn anomalies(&self) -> Vec<ClassificationResult> {
        self.anomalies.lock().iter().cloned().collect()
    }

    /// Snapshot of the rolling sample archive for training. Takes the
    /// archive lock only long enough to clone; never blocks on the model.
    pub fn snapshot_archive(&self) -> Vec<Sample> {
        self.archive.lock().iter().cloned().collect()
    }

    pub fn model_loaded(&self) -> bool {
        self.store.current().is_some()
    }

    fn push_archive(&self, sample: Sample) {
        let mut archive = self.archive.lock();
        if archive.len() == self.archive_capacity {
            archive.pop_front();
        }
        archive.push_back(sample);
    }

    fn publish(&self, result: &ClassificationResult) {
        {
            let mut recent = self.recent.lock();
            if recent.len() == MAX_RETAINED_RESULTS {
                recent.pop_front();
            }
            recent.push_back(result.clone());
        }

        if result.is_anomaly {
            self.metrics.anomalies_detected.inc();
            tracing::warn!(
                score = result.score,
                model_version = result.model_version,
                "anomaly detected"
            );

            let mut anomalies = self.anomalies.lock();
            if anomalies.len() == MAX_RETAINED_RESULTS {
                anomalies.pop_front();
            }
            anomalies.push_back(result.clone());
            self.metrics.active_anomalies.set(anomalies.len() as i64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FeatureSchema;
    use crate::model::{ForestParams, IsolationForest, Model};

    fn schema() -> FeatureSchema {
        FeatureSchema::new(["temperature", "vibration"])
    }

    fn engine_with_store() -> (
        ScoringEngine,
        Arc<ModelStore>,
        Arc<MonitorMetrics>,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ModelStore::new(dir.path().join("model.json")));
        let metrics = Arc::new(MonitorMetrics::new());
        let engine = ScoringEngine::new(
            FeatureWindow::new(schema(), 1),
            store.clone(),
            metrics.clone(),
        );
        (engine, store, metrics, dir)
    }

    fn fitted_model(version: u64, threshold: f64) -> Model {
        let data: Vec<Vec<f64>> = (0..100)
            .map(|i| vec![20.0 + (i % 5) as f64 * 0.5, 1.0 + (i % 3) as f64 * 0.1])
            .collect();
        let forest = IsolationForest::fit(&data, &ForestParams::default(), 42, None).unwrap();
        Model::new(version, Utc::now(), schema(), threshold, forest)
    }

    #[test]
    fn test_degraded_mode_without_model() {
        let (engine, _store, metrics, _dir) = engine_with_store();

        let result = engine
            .ingest(Sample::new(vec![22.0, 1.0]))
            .unwrap()
            .expect("window of one produces a result");

        assert_eq!(result.status, ScoreStatus::NoModel);
        assert!(!result.is_anomaly);
        assert!(result.score.is_none());
        assert!(result.model_version.is_none());
        assert_eq!(metrics.samples_processed.get(), 1);
        assert_eq!(metrics.anomalies_detected.get(), 0);
    }

    #[test]
    fn test_scored_ingest_stamps_model_version() {
        let (engine, store, metrics, _dir) = engine_with_store();
        store.replace(fitted_model(3, 0.6)).unwrap();

        let result = engine.ingest(Sample::new(vec![22.0, 1.0])).unwrap().unwrap();
        assert_eq!(result.status, ScoreStatus::Scored);
        assert_eq!(result.model_version, Some(3));
        assert!(result.score.is_some());
        assert_eq!(metrics.model_version.get(), 3);
    }

    #[test]
    fn test_schema_mismatch_drops_exactly_one_sample() {
        let (engine, _store, metrics, _dir) = engine_with_store();

        let err = engine.ingest(Sample::new(vec![1.0, 2.0, 3.0])).unwrap_err();
        assert_eq!(err.expected, 2);
        assert_eq!(err.got, 3);
        assert_eq!(metrics.schema_mismatches.get(), 1);
        assert_eq!(metrics.samples_processed.get(), 0);
        assert!(engine.recent().is_empty());
    }

    #[test]
    fn test_anomaly_recorded_and_counted() {
        let (engine, store, metrics, _dir) = engine_with_store();
        // Threshold below every possible score: everything is anomalous
        store.replace(fitted_model(1, -1.0)).unwrap();

        engine.ingest(Sample::new(vec![500.0, 50.0])).unwrap();
        assert_eq!(metrics.anomalies_detected.get(), 1);
        assert_eq!(metrics.active_anomalies.get(), 1);
        assert_eq!(engine.anomalies().len(), 1);
    }

    #[test]
    fn test_warmup_yields_no_result() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ModelStore::new(dir.path().join("model.json")));
        let metrics = Arc::new(MonitorMetrics::new());
        let engine = ScoringEngine::new(FeatureWindow::new(schema(), 3), store, metrics.clone());

        assert!(engine.ingest(Sample::new(vec![1.0, 1.0])).unwrap().is_none());
        assert!(engine.ingest(Sample::new(vec![2.0, 2.0])).unwrap().is_none());
        assert!(engine.ingest(Sample::new(vec![3.0, 3.0])).unwrap().is_some());
        // Warm-up samples still count as processed
        assert_eq!(metrics.samples_processed.get(), 3);
    }

    #[test]
    fn test_result_carries_derived_feature_vector() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ModelStore::new(dir.path().join("model.json")));
        let metrics = Arc::new(MonitorMetrics::new());
        let engine = ScoringEngine::new(FeatureWindow::new(schema(), 2), store, metrics);

        assert!(engine.ingest(Sample::new(vec![1.0, 0.0])).unwrap().is_none());
        let result = engine
            .ingest(Sample::new(vec![3.0, 0.0]))
            .unwrap()
            .expect("second sample fills the window");

        // Rolling mean over the two raw readings, not the latest reading
        assert_eq!(result.values, vec![2.0, 0.0]);
    }

    #[test]
    fn test_archive_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ModelStore::new(dir.path().join("model.json")));
        let metrics = Arc::new(MonitorMetrics::new());
        let engine = ScoringEngine::with_archive_capacity(
            FeatureWindow::new(schema(), 1),
            store,
            metrics,
            4,
        );

        for i in 0..10 {
            engine.ingest(Sample::new(vec![i as f64, 0.0])).unwrap();
        }
        let archive = engine.snapshot_archive();
        assert_eq!(archive.len(), 4);
        assert_eq!(archive[0].values[0], 6.0);
    }
}
