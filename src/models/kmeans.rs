//! Lloyd's k-means with k-means++ seeding and multiple restarts.

use crate::error::{PipelineError, Result};
use crate::models::stats;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

#[derive(Debug, Clone)]
pub struct KMeansParams {
    pub k: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            k: 4,
            n_init: 10,
            max_iter: 300,
            tol: 1e-4,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KMeansModel {
    pub centroids: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
    pub inertia: f64,
    pub iterations: usize,
}

impl KMeansModel {
    pub fn predict(&self, point: &[f64]) -> usize {
        nearest(point, &self.centroids).0
    }
}

/// Per-feature z-standardization using the population standard deviation.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(points: &[Vec<f64>]) -> Self {
        let dim = points.first().map(|p| p.len()).unwrap_or(0);
        let mut means = Vec::with_capacity(dim);
        let mut scales = Vec::with_capacity(dim);
        for f in 0..dim {
            let column: Vec<f64> = points.iter().map(|p| p[f]).collect();
            means.push(stats::mean(&column).unwrap_or(0.0));
            // constant features keep a unit scale
            let std = stats::population_std(&column).unwrap_or(0.0);
            scales.push(if std > 0.0 { std } else { 1.0 });
        }
        Self { means, scales }
    }

    pub fn transform(&self, points: &[Vec<f64>]) -> Vec<Vec<f64>> {
        points
            .iter()
            .map(|p| {
                p.iter()
                    .enumerate()
                    .map(|(f, v)| (v - self.means[f]) / self.scales[f])
                    .collect()
            })
            .collect()
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (idx, c) in centroids.iter().enumerate() {
        let d = squared_distance(point, c);
        if d < best.1 {
            best = (idx, d);
        }
    }
    best
}

fn seed_plus_plus(points: &[Vec<f64>], k: usize, rng: &mut Pcg64) -> Vec<Vec<f64>> {
    let mut centroids = vec![points[rng.gen_range(0..points.len())].clone()];
    let mut dist: Vec<f64> = points
        .iter()
        .map(|p| squared_distance(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = dist.iter().sum();
        let next = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            let mut chosen = points.len() - 1;
            for (idx, d) in dist.iter().enumerate() {
                acc += d;
                if acc >= target && *d > 0.0 {
                    chosen = idx;
                    break;
                }
            }
            chosen
        } else {
            rng.gen_range(0..points.len())
        };
        let centroid = points[next].clone();
        for (d, p) in dist.iter_mut().zip(points) {
            *d = d.min(squared_distance(p, &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

fn lloyd(points: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, max_iter: usize, tol: f64) -> KMeansModel {
    let k = centroids.len();
    let dim = points[0].len();
    let mut labels = vec![0usize; points.len()];
    let mut iterations = 0;

    for iter in 1..=max_iter.max(1) {
        iterations = iter;
        let mut distances = vec![0.0; points.len()];
        for (idx, p) in points.iter().enumerate() {
            let (label, d) = nearest(p, &centroids);
            labels[idx] = label;
            distances[idx] = d;
        }

        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (p, &label) in points.iter().zip(&labels) {
            counts[label] += 1;
            for (s, v) in sums[label].iter_mut().zip(p) {
                *s += v;
            }
        }

        let mut updated = Vec::with_capacity(k);
        for (c, (sum, count)) in sums.into_iter().zip(&counts).enumerate() {
            if *count > 0 {
                updated.push(sum.into_iter().map(|s| s / *count as f64).collect::<Vec<f64>>());
            } else {
                // re-seed an empty cluster with the worst-fitted point
                let far = distances
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                distances[far] = 0.0;
                labels[far] = c;
                updated.push(points[far].clone());
            }
        }

        let shift: f64 = centroids
            .iter()
            .zip(&updated)
            .map(|(a, b)| squared_distance(a, b))
            .sum();
        centroids = updated;
        if shift <= tol {
            break;
        }
    }

    let mut inertia = 0.0;
    for (idx, p) in points.iter().enumerate() {
        let (label, d) = nearest(p, &centroids);
        labels[idx] = label;
        inertia += d;
    }

    KMeansModel {
        centroids,
        labels,
        inertia,
        iterations,
    }
}

/// Fit k-means, keeping the restart with the lowest inertia.
///
/// All restarts draw from a single RNG seeded with `params.seed`, so equal
/// inputs give equal labels.
pub fn fit(points: &[Vec<f64>], params: &KMeansParams) -> Result<KMeansModel> {
    if params.k == 0 {
        return Err(PipelineError::model_fit("kmeans", "k must be positive"));
    }
    if points.len() < params.k {
        return Err(PipelineError::model_fit(
            "kmeans",
            format!("{} points for {} clusters", points.len(), params.k),
        ));
    }
    let dim = points[0].len();
    if dim == 0 || points.iter().any(|p| p.len() != dim || p.iter().any(|v| !v.is_finite())) {
        return Err(PipelineError::model_fit("kmeans", "invalid feature matrix"));
    }

    // absolute tolerance relative to the data spread
    let mean_variance = (0..dim)
        .map(|f| {
            let column: Vec<f64> = points.iter().map(|p| p[f]).collect();
            stats::population_std(&column).unwrap_or(0.0).powi(2)
        })
        .sum::<f64>()
        / dim as f64;
    let tol = params.tol * mean_variance;

    let mut rng = Pcg64::seed_from_u64(params.seed);
    let mut best: Option<KMeansModel> = None;
    for _ in 0..params.n_init.max(1) {
        let seeds = seed_plus_plus(points, params.k, &mut rng);
        let model = lloyd(points, seeds, params.max_iter, tol);
        if best.as_ref().map_or(true, |b| model.inertia < b.inertia) {
            best = Some(model);
        }
    }
    best.ok_or_else(|| PipelineError::model_fit("kmeans", "no restart completed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f64>> {
        let centers = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)];
        let mut points = Vec::new();
        for (cx, cy) in centers {
            for i in 0..10 {
                let dx = (i % 3) as f64 * 0.1;
                let dy = (i / 3) as f64 * 0.1;
                points.push(vec![cx + dx, cy + dy]);
            }
        }
        points
    }

    #[test]
    fn test_separates_blobs() {
        let points = blobs();
        let model = fit(&points, &KMeansParams::default()).unwrap();
        for blob in 0..4 {
            let first = model.labels[blob * 10];
            assert!(model.labels[blob * 10..blob * 10 + 10].iter().all(|l| *l == first));
        }
        let mut distinct = model.labels.clone();
        distinct.sort();
        distinct.dedup();
        assert_eq!(distinct.len(), 4);
        assert_eq!(model.predict(&[9.9, 10.2]), model.labels[30]);
    }

    #[test]
    fn test_seeded_labels_repeat() {
        let points = blobs();
        let a = fit(&points, &KMeansParams::default()).unwrap();
        let b = fit(&points, &KMeansParams::default()).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.inertia, b.inertia);
    }

    #[test]
    fn test_fewer_points_than_k() {
        let err = fit(&[vec![1.0], vec![2.0]], &KMeansParams::default()).unwrap_err();
        assert_eq!(err.class(), "ModelFitError");
    }

    #[test]
    fn test_scaler_population_std() {
        let points = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&points);
        assert_eq!(scaler.means, vec![2.0, 5.0]);
        assert_eq!(scaler.scales, vec![1.0, 1.0]);
        let scaled = scaler.transform(&points);
        assert_eq!(scaled[0], vec![-1.0, 0.0]);
        assert_eq!(scaled[1], vec![1.0, 0.0]);
    }
}
