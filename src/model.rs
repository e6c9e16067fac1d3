//! K-Means clustering model implementation

use crate::data::FeatureMatrix;
use crate::persist::ModelArtifact;
use anyhow::{bail, ensure};
use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use log::{debug, info};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Hyperparameters used to fit the model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    /// Number of clusters
    pub n_clusters: usize,
    /// Seed for centroid initialisation
    pub seed: u64,
    /// Maximum iterations per run
    pub max_n_iterations: u64,
    /// Convergence tolerance on centroid movement
    pub tolerance: f64,
    /// Number of initialisations; the run with the lowest inertia wins
    pub n_runs: usize,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            n_clusters: 3,
            seed: 42,
            max_n_iterations: 300,
            tolerance: 1e-4,
            n_runs: 10,
        }
    }
}

/// K-Means model wrapper with fitted parameters
#[derive(Debug)]
pub struct KMeansModel {
    /// Fitted K-Means model from linfa
    pub model: KMeans<f64, L2Dist>,
    /// Parameters the model was fitted with
    pub params: TrainingParams,
    /// Names of the feature columns, in centroid coordinate order
    pub feature_names: Vec<String>,
    /// Cluster assignments for training data
    pub labels: Array1<usize>,
    /// Cluster centroids
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
}

impl KMeansModel {
    /// Predict cluster for new data point
    pub fn predict(&self, features: &[f64]) -> crate::Result<usize> {
        nearest_centroid(self.centroids.view(), features)
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        cluster_sizes(self.labels.iter().copied(), self.params.n_clusters)
    }

    /// Mean silhouette coefficient over the first `sample_size` training rows
    ///
    /// `features` must be the training matrix; rows beyond the labelled ones
    /// are ignored.
    pub fn compute_silhouette_sample(&self, features: &Array2<f64>, sample_size: usize) -> f64 {
        let n_samples = features
            .nrows()
            .min(sample_size)
            .min(self.labels.len());
        if n_samples < 2 {
            return 0.0;
        }

        let sample = features.slice(s![..n_samples, ..]);
        let labels = self.labels.slice(s![..n_samples]);
        let n_clusters = self.centroids.nrows();

        let total: f64 = sample
            .outer_iter()
            .zip(labels.iter())
            .enumerate()
            .map(|(i, (point, &own))| {
                // (distance sum, count) from `point` to every cluster
                let mut per_cluster = vec![(0.0, 0usize); n_clusters];
                for (j, (other, &label)) in sample.outer_iter().zip(labels.iter()).enumerate() {
                    if j != i && label < n_clusters {
                        per_cluster[label].0 += euclidean_distance(&point, &other);
                        per_cluster[label].1 += 1;
                    }
                }

                let cohesion = per_cluster
                    .get(own)
                    .and_then(|&acc| mean_distance(acc))
                    .unwrap_or(0.0);
                let separation = per_cluster
                    .iter()
                    .enumerate()
                    .filter(|&(cluster, _)| cluster != own)
                    .filter_map(|(_, &acc)| mean_distance(acc))
                    .fold(f64::INFINITY, f64::min);

                silhouette(cohesion, separation)
            })
            .sum();

        total / n_samples as f64
    }

    /// Snapshot of the fitted state for persistence
    pub fn to_artifact(&self) -> ModelArtifact {
        ModelArtifact {
            feature_names: self.feature_names.clone(),
            params: self.params,
            centroids: self
                .centroids
                .outer_iter()
                .map(|row| row.to_vec())
                .collect(),
            labels: self.labels.to_vec(),
            inertia: self.inertia,
        }
    }
}

/// Fit K-Means model on a feature matrix
///
/// # Arguments
/// * `features` - Training matrix, one row per customer
/// * `params` - Cluster count, seed and convergence settings
///
/// # Returns
/// * Fitted `KMeansModel` with labels for every training row
pub fn fit_kmeans(features: &FeatureMatrix, params: &TrainingParams) -> crate::Result<KMeansModel> {
    ensure!(params.n_clusters > 0, "Number of clusters must be positive");

    let n_samples = features.n_samples();
    if n_samples < params.n_clusters {
        bail!(
            "Number of data points ({}) must be at least equal to number of clusters ({})",
            n_samples,
            params.n_clusters
        );
    }

    debug!("Fitting K-Means with {:?} on {} rows", params, n_samples);

    let dataset = DatasetBase::from(features.records.clone());
    let rng = ChaCha8Rng::seed_from_u64(params.seed);

    let model: KMeans<f64, L2Dist> = KMeans::params_with(params.n_clusters, rng, L2Dist)
        .max_n_iterations(params.max_n_iterations)
        .tolerance(params.tolerance)
        .n_runs(params.n_runs)
        .fit(&dataset)?;

    let labels: Array1<usize> = model.predict(&features.records);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(&features.records, &labels, &centroids);

    info!(
        "K-Means fitted: {} clusters, inertia {:.4}",
        centroids.nrows(),
        inertia
    );

    Ok(KMeansModel {
        model,
        params: *params,
        feature_names: features.columns.clone(),
        labels,
        centroids,
        inertia,
    })
}

/// Index of the centroid closest to `point`
pub fn nearest_centroid(centroids: ArrayView2<f64>, point: &[f64]) -> crate::Result<usize> {
    if point.len() != centroids.ncols() {
        bail!(
            "Feature vector must have exactly {} dimensions, got {}",
            centroids.ncols(),
            point.len()
        );
    }

    let point = ArrayView1::from(point);
    let mut min_distance = f64::INFINITY;
    let mut closest_cluster = None;

    for (cluster_idx, centroid) in centroids.outer_iter().enumerate() {
        let distance = euclidean_distance(&point, &centroid);
        if distance < min_distance {
            min_distance = distance;
            closest_cluster = Some(cluster_idx);
        }
    }

    closest_cluster.ok_or_else(|| anyhow::anyhow!("Model has no finite centroid near the point"))
}

/// Count of labels per cluster
pub fn cluster_sizes(labels: impl IntoIterator<Item = usize>, n_clusters: usize) -> Vec<usize> {
    let mut sizes = vec![0; n_clusters];
    for label in labels {
        if label < n_clusters {
            sizes[label] += 1;
        }
    }
    sizes
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|&(_, &cluster)| cluster < centroids.nrows())
        .map(|(i, &cluster)| euclidean_distance(&features.row(i), &centroids.row(cluster)).powi(2))
        .sum()
}

fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn mean_distance((sum, count): (f64, usize)) -> Option<f64> {
    (count > 0).then(|| sum / count as f64)
}

/// Silhouette of one point from its cohesion `a` and separation `b`
fn silhouette(a: f64, b: f64) -> f64 {
    if b.is_infinite() || (a == 0.0 && b == 0.0) {
        0.0
    } else {
        (b - a) / a.max(b)
    }
}
