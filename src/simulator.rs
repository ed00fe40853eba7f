//! Simulated building sensor data.
//!
//! Gaussian noise around the midpoint of each metric's range, clamped to
//! the range bounds. Anomalous readings draw from a separate set of ranges
//! (temperature spikes, pressure drops, failing-machinery vibration).

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use crate::core::{FeatureSchema, Sample};

/// Value range and noise level for one simulated metric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricRange {
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

impl MetricRange {
    pub fn new(min: f64, max: f64, std_dev: f64) -> Self {
        Self { min, max, std_dev }
    }

    fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

/// Normal and anomalous ranges for every metric in a schema.
#[derive(Debug, Clone)]
pub struct SimulatorProfile {
    pub schema: FeatureSchema,
    pub normal: Vec<MetricRange>,
    pub anomalous: Vec<MetricRange>,
}

impl SimulatorProfile {
    /// Default building-health profile: temperature (°C), humidity (%),
    /// pressure (hPa), vibration (Hz).
    pub fn building_defaults() -> Self {
        Self {
            schema: FeatureSchema::building_defaults(),
            normal: vec![
                MetricRange::new(20.0, 25.0, 1.0),
                MetricRange::new(40.0, 60.0, 5.0),
                MetricRange::new(1000.0, 1015.0, 2.0),
                MetricRange::new(0.5, 2.0, 0.3),
            ],
            anomalous: vec![
                MetricRange::new(30.0, 40.0, 3.0),
                MetricRange::new(80.0, 95.0, 5.0),
                MetricRange::new(980.0, 990.0, 3.0),
                MetricRange::new(5.0, 10.0, 2.0),
            ],
        }
    }
}

/// Deterministic (seeded) generator of simulated samples.
pub struct SampleSimulator {
    profile: SimulatorProfile,
    anomaly_probability: f64,
    rng: StdRng,
}

impl SampleSimulator {
    pub fn new(profile: SimulatorProfile, anomaly_probability: f64, seed: u64) -> Self {
        Self {
            profile,
            anomaly_probability: anomaly_probability.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.profile.schema
    }

    /// Generate one sample. The returned flag says whether the reading was
    /// drawn from the anomalous ranges.
    pub fn next_sample(&mut self) -> (Sample, bool) {
        let inject_anomaly = self.rng.gen::<f64>() < self.anomaly_probability;
        let ranges = if inject_anomaly {
            &self.profile.anomalous
        } else {
            &self.profile.normal
        };

        let values = ranges
            .iter()
            .map(|range| draw_clamped(range, &mut self.rng))
            .collect();
        (Sample::new(values), inject_anomaly)
    }

    /// Generate a batch drawn exclusively from the normal ranges, for
    /// training. Timestamps are stamped at generation time.
    pub fn normal_batch(&mut self, n: usize) -> Vec<Sample> {
        (0..n)
            .map(|_| {
                let values = self
                    .profile
                    .normal
                    .iter()
                    .map(|range| draw_clamped(range, &mut self.rng))
                    .collect();
                Sample::new(values)
            })
            .collect()
    }
}

fn draw_clamped(range: &MetricRange, rng: &mut StdRng) -> f64 {
    // A degenerate std_dev yields a noiseless reading at the midpoint
    match Normal::new(range.midpoint(), range.std_dev) {
        Ok(normal) => normal.sample(rng).clamp(range.min, range.max),
        Err(_) => range.midpoint(),
    }
}
