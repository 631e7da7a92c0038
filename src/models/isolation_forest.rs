//! Isolation forest over small dense feature vectors.
//!
//! Trees are grown on random subsamples without replacement. The anomaly score
//! of a point is `2^(-E[h(x)] / c(psi))` where `h` is the path length and `psi`
//! the subsample size. Scores close to 1 are anomalous.

use crate::error::{PipelineError, Result};
use crate::models::stats;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

const EULER_GAMMA: f64 = 0.577_215_664_9;
const MAX_SUBSAMPLE: usize = 256;

#[derive(Debug, Clone)]
pub struct IsolationForestParams {
    pub n_trees: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: MAX_SUBSAMPLE,
            contamination: 0.05,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

impl Node {
    fn path_length(&self, point: &[f64], depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if point[*feature] < *threshold {
                    left.path_length(point, depth + 1)
                } else {
                    right.path_length(point, depth + 1)
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<Node>,
    subsample: usize,
}

impl IsolationForest {
    /// Fit on row-major points. All points must share one dimension.
    pub fn fit(points: &[Vec<f64>], params: &IsolationForestParams) -> Result<Self> {
        if points.len() < 2 {
            return Err(PipelineError::model_fit(
                "isolation_forest",
                format!("need at least 2 points, got {}", points.len()),
            ));
        }
        let dim = points[0].len();
        if dim == 0 || points.iter().any(|p| p.len() != dim) {
            return Err(PipelineError::model_fit(
                "isolation_forest",
                "points must share a non-zero dimension",
            ));
        }
        if points.iter().flatten().any(|v| !v.is_finite()) {
            return Err(PipelineError::model_fit(
                "isolation_forest",
                "non-finite feature value",
            ));
        }

        let subsample = params.max_samples.min(points.len()).max(2);
        let depth_limit = (subsample as f64).log2().ceil() as usize;
        let mut rng = Pcg64::seed_from_u64(params.seed);

        let trees = (0..params.n_trees.max(1))
            .map(|_| {
                let rows: Vec<usize> = sample(&mut rng, points.len(), subsample).into_vec();
                grow(points, rows, 0, depth_limit, &mut rng)
            })
            .collect();

        Ok(Self { trees, subsample })
    }

    pub fn score(&self, point: &[f64]) -> f64 {
        let mean_path = self
            .trees
            .iter()
            .map(|t| t.path_length(point, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        2f64.powf(-mean_path / average_path_length(self.subsample))
    }

    pub fn score_all(&self, points: &[Vec<f64>]) -> Vec<f64> {
        points.iter().map(|p| self.score(p)).collect()
    }
}

fn grow(points: &[Vec<f64>], rows: Vec<usize>, depth: usize, limit: usize, rng: &mut Pcg64) -> Node {
    if depth >= limit || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    let dim = points[rows[0]].len();
    let splittable: Vec<(usize, f64, f64)> = (0..dim)
        .filter_map(|f| {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                (lo.min(points[r][f]), hi.max(points[r][f]))
            });
            (hi > lo).then_some((f, lo, hi))
        })
        .collect();
    if splittable.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) =
        rows.into_iter().partition(|&r| points[r][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(points, left, depth + 1, limit, rng)),
        right: Box::new(grow(points, right, depth + 1, limit, rng)),
    }
}

/// Threshold at the `(1 - contamination)` quantile; a point is an outlier
/// when its score is strictly above it.
pub fn label_outliers(scores: &[f64], contamination: f64) -> (f64, Vec<bool>) {
    let threshold = stats::quantile(scores, 1.0 - contamination).unwrap_or(f64::INFINITY);
    let labels = scores.iter().map(|s| *s > threshold).collect();
    (threshold, labels)
}
