//! Rolling feature window: turns incoming samples into feature vectors.
//!
//! Samples accumulate in a bounded rolling buffer of `window_size` entries.
//! No vector is produced until the buffer is full (warm-up); from then on
//! every pushed sample yields one vector. For a window of 1 the vector is
//! the raw reading; for larger windows each entry is the rolling mean of
//! that metric over the buffer.

use std::collections::VecDeque;

use crate::core::sample::{FeatureSchema, FeatureVector, Sample, SchemaMismatch};

/// Per-stream rolling buffer that derives model input from recent samples.
///
/// One instance per logical sensor stream. The window holds no state shared
/// with other components; callers that admit concurrent producers for one
/// stream must serialize pushes upstream, since the rolling statistic is
/// order-sensitive.
#[derive(Debug, Clone)]
pub struct FeatureWindow {
    schema: FeatureSchema,
    window_size: usize,
    buffer: VecDeque<Vec<f64>>,
}

impl FeatureWindow {
    /// Create a window over the given schema. A `window_size` of zero is
    /// treated as one.
    pub fn new(schema: FeatureSchema, window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            schema,
            window_size,
            buffer: VecDeque::with_capacity(window_size),
        }
    }

    /// The schema this window produces vectors for.
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Configured window size.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of samples still needed before vectors are produced.
    pub fn warmup_remaining(&self) -> usize {
        self.window_size.saturating_sub(self.buffer.len())
    }

    /// Append a sample and, once enough history exists, derive a feature
    /// vector. Returns `None` during warm-up. Samples whose value count
    /// disagrees with the schema are rejected without touching the buffer.
    pub fn push(&mut self, sample: &Sample) -> Result<Option<FeatureVector>, SchemaMismatch> {
        self.schema.check_len(sample.values.len())?;

        if self.buffer.len() == self.window_size {
            self.buffer.pop_front();
        }
        self.buffer.push_back(sample.values.clone());

        if self.buffer.len() < self.window_size {
            return Ok(None);
        }
        Ok(Some(self.rolling_means()))
    }

    /// Discard accumulated history, restarting the warm-up period.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    fn rolling_means(&self) -> FeatureVector {
        let n = self.buffer.len() as f64;
        let mut means = vec![0.0; self.schema.len()];
        for values in &self.buffer {
            for (acc, v) in means.iter_mut().zip(values) {
                *acc += v;
            }
        }
        for acc in &mut means {
            *acc /= n;
        }
        means
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(["temperature", "vibration"])
    }

    #[test]
    fn test_window_of_one_passes_raw_values() {
        let mut window = FeatureWindow::new(schema(), 1);
        let vector = window
            .push(&Sample::new(vec![22.5, 1.2]))
            .unwrap()
            .expect("no warm-up for window of one");
        assert_eq!(vector, vec![22.5, 1.2]);
    }

    #[test]
    fn test_warmup_period() {
        let mut window = FeatureWindow::new(schema(), 3);
        assert_eq!(window.warmup_remaining(), 3);

        assert!(window.push(&Sample::new(vec![1.0, 1.0])).unwrap().is_none());
        assert!(window.push(&Sample::new(vec![2.0, 2.0])).unwrap().is_none());
        assert_eq!(window.warmup_remaining(), 1);

        let vector = window
            .push(&Sample::new(vec![3.0, 3.0]))
            .unwrap()
            .expect("third sample completes the window");
        assert_eq!(vector, vec![2.0, 2.0]);
    }

    #[test]
    fn test_rolling_mean_slides() {
        let mut window = FeatureWindow::new(schema(), 2);
        window.push(&Sample::new(vec![1.0, 0.0])).unwrap();
        window.push(&Sample::new(vec![3.0, 0.0])).unwrap();

        let vector = window.push(&Sample::new(vec![5.0, 0.0])).unwrap().unwrap();
        assert_eq!(vector[0], 4.0); // mean of 3.0 and 5.0
    }

    #[test]
    fn test_mismatched_sample_rejected_without_buffering() {
        let mut window = FeatureWindow::new(schema(), 2);
        let err = window.push(&Sample::new(vec![1.0])).unwrap_err();
        assert_eq!(err.expected, 2);
        assert_eq!(err.got, 1);
        // Buffer untouched, warm-up unchanged
        assert_eq!(window.warmup_remaining(), 2);
    }

    #[test]
    fn test_reset_restarts_warmup() {
        let mut window = FeatureWindow::new(schema(), 2);
        window.push(&Sample::new(vec![1.0, 1.0])).unwrap();
        window.push(&Sample::new(vec![2.0, 2.0])).unwrap();
        window.reset();
        assert!(window.push(&Sample::new(vec![3.0, 3.0])).unwrap().is_none());
    }

    #[test]
    fn test_zero_window_size_clamped() {
        let window = FeatureWindow::new(schema(), 0);
        assert_eq!(window.window_size(), 1);
    }
}
