//! Sensor samples and the feature schema they conform to.
//!
//! A `Sample` is one timestamped multi-metric reading. Values are stored in
//! the order given by the deployment's `FeatureSchema`; samples are never
//! mutated after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timestamped multi-metric sensor reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// When the reading was taken (stamped at the ingestion boundary)
    pub timestamp: DateTime<Utc>,
    /// Metric values, ordered per the deployment's feature schema
    pub values: Vec<f64>,
    /// Optional identifier of the producing sensor/stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl Sample {
    /// Create a sample timestamped now.
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            timestamp: Utc::now(),
            values,
            source_id: None,
        }
    }

    /// Create a sample with an explicit timestamp.
    pub fn at(timestamp: DateTime<Utc>, values: Vec<f64>) -> Self {
        Self {
            timestamp,
            values,
            source_id: None,
        }
    }

    /// Attach a source identifier.
    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }
}

/// Fixed-length numeric input to the scoring model, one entry per schema metric.
pub type FeatureVector = Vec<f64>;

/// Ordered list of metric names describing the shape of samples and
/// feature vectors. A model is only valid against the exact schema it
/// was trained on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Create a schema from an ordered list of metric names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// The default building-health schema.
    pub fn building_defaults() -> Self {
        Self::new(["temperature", "humidity", "pressure", "vibration"])
    }

    /// Number of metrics in the schema.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Metric names in schema order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Check a value count against the schema, producing the error the
    /// scoring path surfaces for malformed input.
    pub fn check_len(&self, got: usize) -> Result<(), SchemaMismatch> {
        if got == self.len() {
            Ok(())
        } else {
            Err(SchemaMismatch {
                expected: self.len(),
                got,
            })
        }
    }
}

/// A feature vector or sample whose shape disagrees with the schema the
/// active model was trained on. Configuration-level, never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaMismatch {
    pub expected: usize,
    pub got: usize,
}

impl std::fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "schema mismatch: expected {} features, got {}",
            self.expected, self.got
        )
    }
}

impl std::error::Error for SchemaMismatch {}
