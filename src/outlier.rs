//! Single-feature isolation forest.
//!
//! Points that are easy to isolate with random splits get short average
//! path lengths and therefore high anomaly scores. The highest-scoring
//! `contamination` share of the fitted sample is reported as outliers.

use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use thiserror::Error;

use crate::stats::percentile_sorted;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutlierError {
    #[error("need at least {required} samples, got {actual}")]
    TooFewSamples { required: usize, actual: usize },
    #[error("all samples are identical")]
    Degenerate,
    #[error("samples contain non-finite values")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsolationForest {
    pub contamination: f64,
    pub trees: usize,
    pub sample_size: usize,
    pub seed: u64,
    pub min_samples: usize,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self {
            contamination: 0.05,
            trees: 100,
            sample_size: 256,
            seed: 42,
            min_samples: 10,
        }
    }
}

enum Node {
    Leaf { size: usize },
    Split { value: f64, left: Box<Node>, right: Box<Node> },
}

impl Node {
    fn build(sample: &mut [f64], depth: usize, limit: usize, rng: &mut StdRng) -> Node {
        let size = sample.len();
        if depth >= limit || size <= 1 {
            return Node::Leaf { size };
        }
        let (min, max) = sample
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        if max <= min {
            return Node::Leaf { size };
        }
        let value = min + rng.r#gen::<f64>() * (max - min);
        let mut boundary = 0;
        for idx in 0..sample.len() {
            if sample[idx] < value {
                sample.swap(idx, boundary);
                boundary += 1;
            }
        }
        let (left, right) = sample.split_at_mut(boundary);
        Node::Split {
            value,
            left: Box::new(Node::build(left, depth + 1, limit, rng)),
            right: Box::new(Node::build(right, depth + 1, limit, rng)),
        }
    }

    fn path_length(&self, x: f64, depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split { value, left, right } => {
                if x < *value {
                    left.path_length(x, depth + 1)
                } else {
                    right.path_length(x, depth + 1)
                }
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

impl IsolationForest {
    /// Anomaly scores in `(0, 1]`; higher means more isolated.
    pub fn scores(&self, values: &[f64]) -> Result<Vec<f64>, OutlierError> {
        if values.len() < self.min_samples.max(2) {
            return Err(OutlierError::TooFewSamples {
                required: self.min_samples.max(2),
                actual: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(OutlierError::NonFinite);
        }
        let first = values[0];
        if values.iter().all(|v| *v == first) {
            return Err(OutlierError::Degenerate);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let sample_size = self.sample_size.min(values.len()).max(2);
        let height_limit = (sample_size as f64).log2().ceil() as usize;
        let forest = (0..self.trees.max(1))
            .map(|_| {
                let mut sample = values
                    .choose_multiple(&mut rng, sample_size)
                    .copied()
                    .collect::<Vec<_>>();
                Node::build(&mut sample, 0, height_limit, &mut rng)
            })
            .collect::<Vec<_>>();

        let normalizer = average_path_length(sample_size);
        Ok(values
            .iter()
            .map(|x| {
                let mean_path = forest
                    .iter()
                    .map(|tree| tree.path_length(*x, 0))
                    .sum::<f64>()
                    / forest.len() as f64;
                2f64.powf(-mean_path / normalizer)
            })
            .collect())
    }

    /// Flags the `contamination` share of points with the highest scores.
    pub fn fit_predict(&self, values: &[f64]) -> Result<Vec<bool>, OutlierError> {
        let scores = self.scores(values)?;
        let mut sorted = scores.clone();
        sorted.sort_by(f64::total_cmp);
        let cutoff = percentile_sorted(&sorted, (1.0 - self.contamination) * 100.0)
            .ok_or(OutlierError::Degenerate)?;
        Ok(scores.iter().map(|s| *s > cutoff).collect())
    }
}
