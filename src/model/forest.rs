//! Isolation forest scoring function.
//!
//! Batch-fit variant used as the decision function behind a trained model.
//! Each tree recursively splits on a random feature at a random value;
//! anomalous points isolate in few splits, so short average path lengths
//! map to scores near 1.0 and normal points to scores near 0.5 or below.

use std::cmp;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Euler-Mascheroni constant, used in the expected path length normalizer.
const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Forest shape hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees
    pub n_estimators: usize,
    /// Subsample size per tree
    pub max_samples: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    split_feature: Option<usize>,
    split_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    left: Option<Box<Node>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    right: Option<Box<Node>>,
}

impl Node {
    fn leaf() -> Self {
        Self {
            split_feature: None,
            split_value: 0.0,
            left: None,
            right: None,
        }
    }

    fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// A fitted isolation forest. Immutable after fitting; scoring is pure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<Node>,
    subsample_size: usize,
}

impl IsolationForest {
    /// Fit a forest over the given feature matrix. Deterministic for a
    /// fixed seed. Returns `None` if the cancel flag is raised mid-fit;
    /// the flag is checked between trees.
    pub fn fit(
        data: &[Vec<f64>],
        params: &ForestParams,
        seed: u64,
        cancel: Option<&AtomicBool>,
    ) -> Option<Self> {
        if data.is_empty() {
            return Some(Self {
                trees: Vec::new(),
                subsample_size: 0,
            });
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let subsample_size = cmp::min(params.max_samples, data.len()).max(2);
        let height_limit = (subsample_size as f64).log2().ceil() as usize;

        let mut trees = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return None;
            }

            let mut sampled = Vec::with_capacity(subsample_size);
            for _ in 0..subsample_size {
                let idx = rng.gen_range(0..data.len());
                sampled.push(data[idx].clone());
            }
            trees.push(build_tree(&sampled, 0, height_limit, &mut rng));
        }

        Some(Self {
            trees,
            subsample_size,
        })
    }

    /// Anomaly score in `[0, 1]`, larger = more anomalous.
    pub fn score(&self, x: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }

        let total: f64 = self
            .trees
            .iter()
            .map(|tree| path_length(tree, x, 0) as f64)
            .sum();
        let avg_path = total / self.trees.len() as f64;

        let expected = average_path_length(self.subsample_size);
        if expected > 0.0 {
            2.0_f64.powf(-avg_path / expected)
        } else {
            1.0
        }
    }

    /// Number of fitted trees.
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

fn build_tree(data: &[Vec<f64>], height: usize, height_limit: usize, rng: &mut StdRng) -> Node {
    if data.len() <= 1 || height >= height_limit {
        return Node::leaf();
    }

    let n_features = data[0].len();
    let split_feature = rng.gen_range(0..n_features);

    let mut min_val = data[0][split_feature];
    let mut max_val = min_val;
    for row in data {
        let val = row[split_feature];
        min_val = min_val.min(val);
        max_val = max_val.max(val);
    }

    // Constant feature in this subsample: nothing to split on
    if (max_val - min_val).abs() < 1e-10 {
        return Node::leaf();
    }

    let split_value = rng.gen::<f64>() * (max_val - min_val) + min_val;

    let mut left_data = Vec::new();
    let mut right_data = Vec::new();
    for row in data {
        if row[split_feature] < split_value {
            left_data.push(row.clone());
        } else {
            right_data.push(row.clone());
        }
    }

    if left_data.is_empty() || right_data.is_empty() {
        return Node::leaf();
    }

    Node {
        split_feature: Some(split_feature),
        split_value,
        left: Some(Box::new(build_tree(
            &left_data,
            height + 1,
            height_limit,
            rng,
        ))),
        right: Some(Box::new(build_tree(
            &right_data,
            height + 1,
            height_limit,
            rng,
        ))),
    }
}

fn path_length(node: &Node, x: &[f64], current_height: usize) -> usize {
    if node.is_leaf() {
        return current_height;
    }

    if let Some(split_feature) = node.split_feature {
        if x[split_feature] < node.split_value {
            if let Some(ref left) = node.left {
                return path_length(left, x, current_height + 1);
            }
        } else if let Some(ref right) = node.right {
            return path_length(right, x, current_height + 1);
        }
    }

    current_height
}

/// Expected path length of an unsuccessful search in a binary search tree
/// over `n` points; normalizes raw path lengths into comparable scores.
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    (n as f64).ln() + EULER_GAMMA
}
