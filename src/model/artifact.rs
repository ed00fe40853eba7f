//! Versioned model artifact: scoring function plus the metadata needed to
//! interpret its output (schema, threshold, provenance).
//!
//! The artifact is immutable once created. The store hands out `Arc<Model>`
//! snapshots; in-flight scoring calls keep the version they started with
//! across a hot-swap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::sample::{FeatureSchema, SchemaMismatch};
use crate::model::forest::IsolationForest;

/// A trained, versioned scoring model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Strictly increasing across successive installs within a store
    pub version: u64,
    pub trained_at: DateTime<Utc>,
    /// Names/order/count of the features this model was trained on
    pub schema: FeatureSchema,
    /// Score cutoff recorded at training time; scores at or above it
    /// classify as anomalous
    pub threshold: f64,
    forest: IsolationForest,
}

impl Model {
    pub fn new(
        version: u64,
        trained_at: DateTime<Utc>,
        schema: FeatureSchema,
        threshold: f64,
        forest: IsolationForest,
    ) -> Self {
        Self {
            version,
            trained_at,
            schema,
            threshold,
            forest,
        }
    }

    /// Anomaly score for a feature vector matching this model's schema.
    /// Larger = more anomalous. Vectors of the wrong shape are rejected,
    /// never coerced.
    pub fn score(&self, vector: &[f64]) -> Result<f64, SchemaMismatch> {
        self.schema.check_len(vector.len())?;
        Ok(self.forest.score(vector))
    }

    /// Score and classify against the recorded threshold.
    ///
    /// The comparison is inclusive: a reading outside the training
    /// envelope can follow the same tree paths as the envelope's extreme
    /// training point and tie its score exactly, and such a tie must still
    /// classify as anomalous.
    pub fn classify(&self, vector: &[f64]) -> Result<(f64, bool), SchemaMismatch> {
        let score = self.score(vector)?;
        Ok((score, score >= self.threshold))
    }

    /// Structural sanity check used when loading a persisted artifact.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.version == 0 {
            return Err("model version must be >= 1".to_string());
        }
        if self.schema.is_empty() {
            return Err("model schema is empty".to_string());
        }
        if !self.threshold.is_finite() {
            return Err(format!("model threshold {} is not finite", self.threshold));
        }
        if self.forest.tree_count() == 0 {
            return Err("model has no fitted trees".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::forest::ForestParams;

    fn fitted_model(threshold: f64) -> Model {
        let data: Vec<Vec<f64>> = (0..100)
            .map(|i| vec![20.0 + (i % 5) as f64, 1.0])
            .collect();
        let forest = IsolationForest::fit(&data, &ForestParams::default(), 42, None).unwrap();
        Model::new(
            1,
            Utc::now(),
            FeatureSchema::new(["temperature", "vibration"]),
            threshold,
            forest,
        )
    }

    #[test]
    fn test_score_rejects_wrong_shape() {
        let model = fitted_model(0.6);
        let err = model.score(&[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(err.expected, 2);
        assert_eq!(err.got, 3);
    }

    #[test]
    fn test_classify_uses_recorded_threshold() {
        let model = fitted_model(0.0);
        // Threshold of zero: everything classifies anomalous
        let (_, is_anomaly) = model.classify(&[22.0, 1.0]).unwrap();
        assert!(is_anomaly);

        let model = fitted_model(1.0);
        let (_, is_anomaly) = model.classify(&[22.0, 1.0]).unwrap();
        assert!(!is_anomaly);
    }

    #[test]
    fn test_validate_flags_bad_artifacts() {
        let mut model = fitted_model(0.6);
        assert!(model.validate().is_ok());

        model.version = 0;
        assert!(model.validate().is_err());

        let mut model = fitted_model(f64::NAN);
        assert!(model.validate().is_err());
        model.threshold = 0.5;
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_artifact_roundtrips_through_json() {
        let model = fitted_model(0.6);
        let json = serde_json::to_string(&model).unwrap();
        let restored: Model = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.version, model.version);
        assert_eq!(restored.schema, model.schema);
        assert_eq!(restored.threshold, model.threshold);
        assert_eq!(
            restored.score(&[22.0, 1.0]).unwrap(),
            model.score(&[22.0, 1.0]).unwrap()
        );
    }
}
