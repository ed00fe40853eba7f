//! Training job: fit a candidate model from a batch of historical samples
//! and install it without stalling ingestion.
//!
//! The job never holds a lock the scoring path uses. On success it hands
//! the candidate to the store's `install`, which persists the artifact
//! before making it visible, so a crash between the two never leaves the
//! store pointing at an unpersisted model. Cancellation before install
//! simply discards the candidate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::core::{FeatureSchema, FeatureWindow, Sample, SchemaMismatch};
use crate::model::{ForestParams, IsolationForest, Model, ModelStore, StoreError};

/// How the score cutoff is derived at training time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdPolicy {
    /// Cutoff at the score of the `floor(fraction * n)`-th most anomalous
    /// training point; scores at or above it classify as anomalous.
    Contamination(f64),
    /// Fixed cutoff independent of the training batch.
    Fixed(f64),
}

/// Training hyperparameters.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub forest: ForestParams,
    pub threshold: ThresholdPolicy,
    /// RNG seed, fixed for reproducibility
    pub seed: u64,
    /// Minimum usable feature vectors in a batch
    pub min_samples: usize,
    /// Window size for feature derivation; must match the scoring window
    pub window_size: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            forest: ForestParams::default(),
            threshold: ThresholdPolicy::Contamination(0.01),
            seed: 42,
            min_samples: 32,
            window_size: 1,
        }
    }
}

/// Errors from a training run. Reported synchronously; the model store is
/// never partially mutated.
#[derive(Debug)]
pub enum TrainError {
    /// Batch too small to produce a non-degenerate model; retry once more
    /// data accumulates
    InsufficientData { got: usize, need: usize },
    /// Cooperative cancellation; the candidate model was discarded
    Cancelled,
    /// A sample in the batch disagrees with the training schema
    Schema(SchemaMismatch),
    /// Persisting or installing the candidate failed
    Store(StoreError),
}

impl std::fmt::Display for TrainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainError::InsufficientData { got, need } => {
                write!(f, "insufficient training data: {got} usable samples, need {need}")
            }
            TrainError::Cancelled => write!(f, "training cancelled"),
            TrainError::Schema(e) => write!(f, "training batch {e}"),
            TrainError::Store(e) => write!(f, "model install failed: {e}"),
        }
    }
}

impl std::error::Error for TrainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrainError::Schema(e) => Some(e),
            TrainError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SchemaMismatch> for TrainError {
    fn from(e: SchemaMismatch) -> Self {
        TrainError::Schema(e)
    }
}

impl From<StoreError> for TrainError {
    fn from(e: StoreError) -> Self {
        TrainError::Store(e)
    }
}

/// Fits candidate models and installs them into a [`ModelStore`].
pub struct TrainingJob {
    store: Arc<ModelStore>,
    schema: FeatureSchema,
    config: TrainingConfig,
    cancel: Arc<AtomicBool>,
}

impl TrainingJob {
    pub fn new(store: Arc<ModelStore>, schema: FeatureSchema, config: TrainingConfig) -> Self {
        Self {
            store,
            schema,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that aborts an in-progress run between trees. Shareable with
    /// a shutdown handler.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Fit a candidate model from a batch of historical samples.
    ///
    /// Feature vectors are derived through a [`FeatureWindow`] with the
    /// same window size as scoring, so the model sees exactly the shape
    /// the engine will feed it. Deterministic for a fixed seed.
    pub fn train(&self, samples: &[Sample]) -> Result<Model, TrainError> {
        let mut window = FeatureWindow::new(self.schema.clone(), self.config.window_size);
        let mut matrix = Vec::with_capacity(samples.len());
        for sample in samples {
            if let Some(vector) = window.push(sample)? {
                matrix.push(vector);
            }
        }

        if matrix.len() < self.config.min_samples {
            return Err(TrainError::InsufficientData {
                got: matrix.len(),
                need: self.config.min_samples,
            });
        }

        let forest =
            IsolationForest::fit(&matrix, &self.config.forest, self.config.seed, Some(&self.cancel))
                .ok_or(TrainError::Cancelled)?;

        let threshold = match self.config.threshold {
            ThresholdPolicy::Fixed(t) => t,
            ThresholdPolicy::Contamination(fraction) => {
                let scores: Vec<f64> = matrix.iter().map(|v| forest.score(v)).collect();
                contamination_cutoff(&scores, fraction)
            }
        };

        Ok(Model::new(
            self.store.next_version(),
            Utc::now(),
            self.schema.clone(),
            threshold,
            forest,
        ))
    }

    /// One full training run: fit, then persist and install.
    ///
    /// The externally invocable retrain entry point. Returns the installed
    /// model on success; on any error the store's active model and its
    /// on-disk artifact are untouched. Persistence and the swap run in one
    /// critical section inside [`ModelStore::install`], so concurrent runs
    /// cannot leave the disk behind the installed version.
    pub fn run_once(&self, samples: &[Sample]) -> Result<Arc<Model>, TrainError> {
        let model = self.train(samples)?;

        if self.cancel.load(Ordering::Relaxed) {
            return Err(TrainError::Cancelled);
        }

        let installed = self.store.install(model)?;
        tracing::info!(
            version = installed.version,
            threshold = installed.threshold,
            "trained model installed"
        );
        Ok(installed)
    }
}

/// Score cutoff for a contamination fraction: the score at the
/// `floor(fraction * n)`-th position of the training scores sorted
/// descending. Scores at or above it classify as anomalous, so for a
/// fraction rounding down to zero only readings matching or exceeding the
/// most anomalous training point are flagged.
fn contamination_cutoff(scores: &[f64], fraction: f64) -> f64 {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let idx = ((fraction.clamp(0.0, 1.0) * sorted.len() as f64).floor() as usize)
        .min(sorted.len().saturating_sub(1));
    sorted[idx]
}
