//! Monitoring counters and gauges, exposed in Prometheus text format.
//!
//! One registry per agent instance so tests can assert on counters without
//! cross-test interference.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Content type for the text exposition format.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Counters and gauges for the scoring pipeline.
pub struct MonitorMetrics {
    registry: Registry,
    /// Samples accepted by the scoring engine (warm-up included)
    pub samples_processed: IntCounter,
    /// Results classified as anomalous
    pub anomalies_detected: IntCounter,
    /// Samples dropped for schema disagreement
    pub schema_mismatches: IntCounter,
    /// Version of the currently loaded model (0 = none)
    pub model_version: IntGauge,
    /// Anomalies currently held in the in-memory anomaly log
    pub active_anomalies: IntGauge,
}

impl MonitorMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let samples_processed = IntCounter::new(
            "samples_processed_total",
            "Total number of sensor samples processed",
        )
        .expect("valid metric definition");
        let anomalies_detected = IntCounter::new(
            "anomalies_detected_total",
            "Total number of anomalies detected",
        )
        .expect("valid metric definition");
        let schema_mismatches = IntCounter::new(
            "schema_mismatches_total",
            "Total number of samples dropped due to schema mismatch",
        )
        .expect("valid metric definition");
        let model_version = IntGauge::new(
            "model_version",
            "Version of the currently loaded scoring model (0 when none)",
        )
        .expect("valid metric definition");
        let active_anomalies = IntGauge::new(
            "active_anomalies",
            "Number of anomalies currently retained in the anomaly log",
        )
        .expect("valid metric definition");

        for collector in [
            Box::new(samples_processed.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(anomalies_detected.clone()),
            Box::new(schema_mismatches.clone()),
            Box::new(model_version.clone()),
            Box::new(active_anomalies.clone()),
        ] {
            registry
                .register(collector)
                .expect("fresh registry accepts each metric once");
        }

        Self {
            registry,
            samples_processed,
            anomalies_detected,
            schema_mismatches,
            model_version,
            active_anomalies,
        }
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("metrics encoding failed: {e}");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_registered_metrics() {
        let metrics = MonitorMetrics::new();
        metrics.samples_processed.inc_by(3);
        metrics.model_version.set(7);

        let output = metrics.render();
        assert!(output.contains("samples_processed_total 3"));
        assert!(output.contains("model_version 7"));
        assert!(output.contains("anomalies_detected_total 0"));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = MonitorMetrics::new();
        let b = MonitorMetrics::new();
        a.samples_processed.inc();
        assert_eq!(b.samples_processed.get(), 0);
    }
}
