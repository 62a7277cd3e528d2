// Trajectory clustering: PCA to three components, k-means picked by
// silhouette, distance-based outliers inside each cluster

use crate::analysis::stats::{mean, resample, std_dev};
use crate::analysis::view::{AnalyticsOptions, SampleView};
use crate::core::error::NotComputed;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::debug;

pub const MIN_EPISODES: usize = 5;
pub const COMPONENTS: usize = 3;
pub const OUTLIER_SIGMAS: f64 = 2.0;
pub const IMBALANCE_LIMIT: f64 = 0.5;
const ZERO_VARIANCE: f64 = 1e-12;

pub type Point = [f64; COMPONENTS];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClusteredEpisode {
    pub episode: u64,
    pub cluster: usize,
    pub projection: Point,
    pub distance: f64,
    pub outlier: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrajectoryClusters {
    pub k: usize,
    pub silhouette: f64,
    /// Share of total variance per principal component.
    pub explained_variance: Vec<f64>,
    pub episodes: Vec<ClusteredEpisode>,
    pub cluster_sizes: Vec<usize>,
    pub imbalance: f64,
    /// Cluster sizes differ enough to suggest more than one strategy.
    pub imbalanced: bool,
    pub outliers: Vec<u64>,
}

/// Resampled and flattened trajectory per episode, `[episode][dim * samples]`.
fn trajectory_features(view: &SampleView, samples: usize) -> Vec<Vec<f64>> {
    view.actions
        .iter()
        .map(|dims| dims.iter().flat_map(|series| resample(series, samples)).collect())
        .collect()
}

/// Standardizes each feature column in place; constant columns become zero.
fn standardize(features: &mut [Vec<f64>]) {
    let width = features.first().map(Vec::len).unwrap_or(0);
    for j in 0..width {
        let column: Vec<f64> = features.iter().map(|row| row[j]).collect();
        let (m, s) = (mean(&column), std_dev(&column));
        for row in features.iter_mut() {
            row[j] = if s > ZERO_VARIANCE { (row[j] - m) / s } else { 0.0 };
        }
    }
}

fn sorted_eigenpairs(matrix: DMatrix<f64>) -> Vec<(f64, DVector<f64>)> {
    let eigen = SymmetricEigen::new(matrix);
    let mut pairs: Vec<(f64, DVector<f64>)> = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .map(|(i, &v)| (v.max(0.0), eigen.eigenvectors.column(i).into_owned()))
        .collect();
    pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    pairs
}

/// Projects centered rows onto their top three principal components.
///
/// With more features than rows the decomposition runs on the Gram matrix
/// `X Xᵀ` instead of the covariance; its eigenvectors scaled by `sqrt(λ)`
/// are the same scores. Missing components are zero. Each score column is
/// flipped so its largest-magnitude entry is positive.
pub fn project(features: &[Vec<f64>]) -> (Vec<Point>, Vec<f64>) {
    let n = features.len();
    let width = features.first().map(Vec::len).unwrap_or(0);
    let mut points = vec![[0.0; COMPONENTS]; n];
    let mut explained = vec![0.0; COMPONENTS];
    if n == 0 || width == 0 {
        return (points, explained);
    }

    let x = DMatrix::from_fn(n, width, |i, j| features[i][j]);
    let scores: Vec<(f64, DVector<f64>)> = if width <= n {
        sorted_eigenpairs(x.transpose() * &x)
            .into_iter()
            .map(|(value, vector)| (value, &x * vector))
            .collect()
    } else {
        sorted_eigenpairs(&x * x.transpose())
            .into_iter()
            .map(|(value, vector)| (value, vector * value.sqrt()))
            .collect()
    };

    let total: f64 = scores.iter().map(|(value, _)| value).sum();
    for (c, (value, column)) in scores.iter().take(COMPONENTS).enumerate() {
        explained[c] = if total > 0.0 { value / total } else { 0.0 };

        let pivot = column
            .iter()
            .copied()
            .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
        let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
        for (i, point) in points.iter_mut().enumerate() {
            point[c] = sign * column[i];
        }
    }
    (points, explained)
}

fn distance(a: &Point, b: &Point) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn nearest(point: &Point, centroids: &[Point]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(c, centroid)| (c, distance(point, centroid)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

fn seed_centroids(points: &[Point], k: usize, rng: &mut StdRng) -> Vec<Point> {
    let mut centroids = vec![points[rng.gen_range(0..points.len())]];
    while centroids.len() < k {
        let weights: Vec<f64> = points
            .iter()
            .map(|p| nearest(p, &centroids).1.powi(2))
            .collect();
        let total: f64 = weights.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            weights
                .iter()
                .position(|&w| {
                    target -= w;
                    target <= 0.0 && w > 0.0
                })
                .unwrap_or(points.len() - 1)
        } else {
            rng.gen_range(0..points.len())
        };
        centroids.push(points[next]);
    }
    centroids
}

/// Seeded k-means++ followed by Lloyd iterations. Returns labels and
/// centroids.
pub fn kmeans(points: &[Point], k: usize, seed: u64, iterations: usize) -> (Vec<usize>, Vec<Point>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = seed_centroids(points, k, &mut rng);
    let mut labels = vec![usize::MAX; points.len()];

    for _ in 0..iterations.max(1) {
        let next: Vec<usize> = points.iter().map(|p| nearest(p, &centroids).0).collect();
        let mut changed = next != labels;
        labels = next;

        let mut sums = vec![[0.0; COMPONENTS]; k];
        let mut counts = vec![0usize; k];
        for (point, &label) in points.iter().zip(&labels) {
            counts[label] += 1;
            for d in 0..COMPONENTS {
                sums[label][d] += point[d];
            }
        }
        for c in 0..k {
            if counts[c] == 0 {
                // Empty cluster takes the point furthest from its centroid
                let far = (0..points.len())
                    .filter(|&i| counts[labels[i]] > 1)
                    .max_by(|&a, &b| {
                        distance(&points[a], &centroids[labels[a]])
                            .total_cmp(&distance(&points[b], &centroids[labels[b]]))
                    });
                if let Some(i) = far {
                    counts[labels[i]] -= 1;
                    counts[c] = 1;
                    labels[i] = c;
                    centroids[c] = points[i];
                    changed = true;
                }
                continue;
            }
            for d in 0..COMPONENTS {
                centroids[c][d] = sums[c][d] / counts[c] as f64;
            }
        }

        if !changed {
            break;
        }
    }
    (labels, centroids)
}

/// Mean silhouette over all points. Points alone in their cluster score 0.
pub fn silhouette(points: &[Point], labels: &[usize], k: usize) -> f64 {
    let scores: Vec<f64> = points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let mut sums = vec![0.0; k];
            let mut counts = vec![0usize; k];
            for (j, other) in points.iter().enumerate() {
                if i != j {
                    sums[labels[j]] += distance(point, other);
                    counts[labels[j]] += 1;
                }
            }
            let own = labels[i];
            if counts[own] == 0 {
                return 0.0;
            }
            let a = sums[own] / counts[own] as f64;
            let b = (0..k)
                .filter(|&c| c != own && counts[c] > 0)
                .map(|c| sums[c] / counts[c] as f64)
                .fold(f64::INFINITY, f64::min);
            if !b.is_finite() {
                return 0.0;
            }
            let scale = a.max(b);
            if scale > 0.0 {
                (b - a) / scale
            } else {
                0.0
            }
        })
        .collect();
    mean(&scores)
}

/// Flags points further than mean + 2 std from their centroid, measured
/// against the distances within the same cluster.
pub fn flag_outliers(distances: &[f64], labels: &[usize], k: usize) -> Vec<bool> {
    let thresholds: Vec<f64> = (0..k)
        .map(|c| {
            let within: Vec<f64> = distances
                .iter()
                .zip(labels)
                .filter(|&(_, &label)| label == c)
                .map(|(&d, _)| d)
                .collect();
            mean(&within) + OUTLIER_SIGMAS * std_dev(&within)
        })
        .collect();
    distances
        .iter()
        .zip(labels)
        .map(|(&d, &label)| d > thresholds[label] + ZERO_VARIANCE)
        .collect()
}

pub fn compute(view: &SampleView, options: &AnalyticsOptions) -> Result<TrajectoryClusters, NotComputed> {
    if view.action_dims() == 0 {
        return Err(NotComputed::new("no action series in sample"));
    }
    let n = view.len();
    if n < MIN_EPISODES {
        return Err(NotComputed::new(format!(
            "clustering needs at least {} episodes",
            MIN_EPISODES
        )));
    }

    let mut features = trajectory_features(view, options.trajectory_samples.max(1));
    standardize(&mut features);
    if features.iter().flatten().all(|&v| v == 0.0) {
        return Err(NotComputed::new("trajectories do not vary across episodes"));
    }
    let (points, explained_variance) = project(&features);

    let k_min = options.k_min.max(2);
    let k_max = options.k_max.min(n - 1);
    if k_min > k_max {
        return Err(NotComputed::new("no valid cluster count for this sample"));
    }

    let mut best: Option<(usize, f64, Vec<usize>, Vec<Point>)> = None;
    for k in k_min..=k_max {
        let (labels, centroids) = kmeans(&points, k, options.kmeans_seed, options.kmeans_iterations);
        let score = silhouette(&points, &labels, k);
        debug!("k-means with k={} scored silhouette {:.3}", k, score);
        if best.as_ref().map_or(true, |b| score > b.1) {
            best = Some((k, score, labels, centroids));
        }
    }
    let Some((k, silhouette, labels, centroids)) = best else {
        return Err(NotComputed::new("no valid cluster count for this sample"));
    };

    let distances: Vec<f64> = points
        .iter()
        .zip(&labels)
        .map(|(p, &label)| distance(p, &centroids[label]))
        .collect();
    let flags = flag_outliers(&distances, &labels, k);

    let mut cluster_sizes = vec![0usize; k];
    for &label in &labels {
        cluster_sizes[label] += 1;
    }
    let largest = cluster_sizes.iter().copied().max().unwrap_or(0);
    let smallest = cluster_sizes.iter().copied().min().unwrap_or(0);
    let imbalance = if largest > 0 {
        (largest - smallest) as f64 / largest as f64
    } else {
        0.0
    };

    let episodes: Vec<ClusteredEpisode> = (0..n)
        .map(|i| ClusteredEpisode {
            episode: view.episodes[i],
            cluster: labels[i],
            projection: points[i],
            distance: distances[i],
            outlier: flags[i],
        })
        .collect();
    let outliers = episodes.iter().filter(|e| e.outlier).map(|e| e.episode).collect();

    Ok(TrajectoryClusters {
        k,
        silhouette,
        explained_variance,
        episodes,
        cluster_sizes,
        imbalance,
        imbalanced: imbalance > IMBALANCE_LIMIT,
        outliers,
    })
}
