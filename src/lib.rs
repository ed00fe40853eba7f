//! Building Health Agent - streaming anomaly detection for sensor data.
//!
//! This library scores a continuous stream of multi-metric building sensor
//! samples (temperature, humidity, pressure, vibration) against a trained
//! isolation-forest model and surfaces anomalous readings to operators and
//! to a pull-based metrics endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Building Health Agent                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌─────────────┐   ┌──────────────┐          │
//! │  │ Ingestion │──▶│   Feature   │──▶│   Scoring    │          │
//! │  │  Gateway  │   │   Window    │   │   Engine     │          │
//! │  └───────────┘   └─────────────┘   └──────┬───────┘          │
//! │                                  current()│                  │
//! │  ┌───────────┐   ┌─────────────┐   ┌──────▼───────┐          │
//! │  │  Metrics  │◀──│  Anomaly /  │   │ Model Store  │          │
//! │  │  Export   │   │ Recent Logs │   │  (hot-swap)  │          │
//! │  └───────────┘   └─────────────┘   └──────▲───────┘          │
//! │                                           │ persist+replace  │
//! │                                    ┌──────┴───────┐          │
//! │                                    │ Training Job │          │
//! │                                    └──────────────┘          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The scoring path and the training job share exactly one piece of mutable
//! state, the model store, and never block each other: readers take
//! wait-free `Arc` snapshots of the active model, and a swap is a single
//! pointer update. A retrain takes effect without losing window state or
//! dropping in-flight scoring calls.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use buildhealth_agent::{
//!     core::{FeatureSchema, FeatureWindow, Sample},
//!     engine::ScoringEngine,
//!     metrics::MonitorMetrics,
//!     model::ModelStore,
//! };
//!
//! let schema = FeatureSchema::building_defaults();
//! let store = Arc::new(ModelStore::new("model.json"));
//! let metrics = Arc::new(MonitorMetrics::new());
//! let engine = ScoringEngine::new(FeatureWindow::new(schema, 1), store, metrics);
//!
//! // Degraded until a model is trained and installed
//! let result = engine.ingest(Sample::new(vec![22.0, 50.0, 1010.0, 1.0]));
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod metrics;
pub mod model;
pub mod server;
pub mod simulator;
pub mod trainer;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{FeatureSchema, FeatureVector, FeatureWindow, Sample, SchemaMismatch};
pub use engine::{ClassificationResult, ScoreStatus, ScoringEngine};
pub use metrics::MonitorMetrics;
pub use model::{Model, ModelStore, StoreError};
pub use simulator::{SampleSimulator, SimulatorProfile};
pub use trainer::{ThresholdPolicy, TrainError, TrainingConfig, TrainingJob};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
