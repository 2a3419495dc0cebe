//! Two-way K-Means segmentation of patient profiles into VIP / Non-VIP

use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::PipelineError;
use crate::features::FeatureMatrix;
use crate::records::{ClusterAssignment, CustomerType, PatientProfile};

/// Segmentation always partitions into two groups
pub const N_CLUSTERS: usize = 2;

/// Clustering parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationConfig {
    pub seed: u64,
    /// Independent restarts; the run with the lowest inertia wins
    pub n_runs: usize,
    pub max_iters: u64,
    pub tolerance: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            n_runs: 10,
            max_iters: 300,
            tolerance: 1e-4,
        }
    }
}

/// Fitted two-cluster model over one run's population
#[derive(Debug)]
pub struct SegmentationModel {
    /// Fitted K-Means model from linfa
    pub model: KMeans<f64, L2Dist>,
    /// Cluster index per row of the feature matrix
    pub labels: Array1<usize>,
    /// Cluster centroids in standardized space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares
    pub inertia: f64,
    /// Mean raw total_spent per cluster
    pub mean_spend: [f64; N_CLUSTERS],
    /// Cluster labeled VIP
    pub vip_cluster: usize,
}

impl SegmentationModel {
    pub fn cluster_sizes(&self) -> [usize; N_CLUSTERS] {
        let mut sizes = [0; N_CLUSTERS];
        for &label in self.labels.iter() {
            if label < N_CLUSTERS {
                sizes[label] += 1;
            }
        }
        sizes
    }

    pub fn customer_type(&self, cluster: usize) -> CustomerType {
        if cluster == self.vip_cluster {
            CustomerType::Vip
        } else {
            CustomerType::NonVip
        }
    }

    /// Mean silhouette coefficient over the first `sample_size` points
    pub fn compute_silhouette_sample(&self, features: &Array2<f64>, sample_size: usize) -> f64 {
        let n_samples = features.nrows().min(sample_size);
        if n_samples < 2 {
            return 0.0;
        }

        let mut silhouette_sum = 0.0;

        for i in 0..n_samples {
            let point = features.row(i);
            let cluster_label = self.labels[i];

            let mut same_cluster_distances = Vec::new();
            let mut other_cluster_distances: Vec<Vec<f64>> = vec![Vec::new(); N_CLUSTERS];

            for j in 0..n_samples {
                if i == j {
                    continue;
                }

                let distance = euclidean_distance(&point, &features.row(j));
                let other_label = self.labels[j];

                if other_label == cluster_label {
                    same_cluster_distances.push(distance);
                } else if other_label < N_CLUSTERS {
                    other_cluster_distances[other_label].push(distance);
                }
            }

            let a_i = if same_cluster_distances.is_empty() {
                0.0
            } else {
                same_cluster_distances.iter().sum::<f64>() / same_cluster_distances.len() as f64
            };

            let b_i = other_cluster_distances
                .iter()
                .filter(|distances| !distances.is_empty())
                .map(|distances| distances.iter().sum::<f64>() / distances.len() as f64)
                .fold(f64::INFINITY, f64::min);

            let silhouette_i = if b_i.is_infinite() || (a_i == 0.0 && b_i == 0.0) {
                0.0
            } else {
                (b_i - a_i) / a_i.max(b_i)
            };

            silhouette_sum += silhouette_i;
        }

        silhouette_sum / n_samples as f64
    }
}

/// Result of segmenting one run's profiles
#[derive(Debug)]
pub struct Segmentation {
    pub matrix: FeatureMatrix,
    pub model: SegmentationModel,
    pub assignments: Vec<ClusterAssignment>,
}

impl Segmentation {
    pub fn count(&self, customer_type: CustomerType) -> usize {
        self.assignments
            .iter()
            .filter(|a| a.customer_type == customer_type)
            .count()
    }
}

/// Pick the VIP cluster: strictly higher mean spend wins, ties go to the lower index
pub fn vip_cluster(mean_spend: &[f64; N_CLUSTERS]) -> usize {
    if mean_spend[1] > mean_spend[0] {
        1
    } else {
        0
    }
}

/// Scale profile features, fit 2-cluster K-Means, and label the higher-spend cluster VIP
///
/// # Arguments
/// * `profiles` - Patient profiles for the current run
/// * `config` - Seed and convergence settings
///
/// # Returns
/// * Assignments for every profile with complete features
pub fn segment_profiles(
    profiles: &[PatientProfile],
    config: &SegmentationConfig,
) -> Result<Segmentation, PipelineError> {
    segment_matrix(FeatureMatrix::from_profiles(profiles)?, config)
}

/// Segment an already built feature matrix; incomplete profiles are already left out
pub fn segment_matrix(
    matrix: FeatureMatrix,
    config: &SegmentationConfig,
) -> Result<Segmentation, PipelineError> {
    let n_samples = matrix.features.nrows();
    let distinct = matrix.distinct_rows();
    if n_samples < N_CLUSTERS || distinct < N_CLUSTERS {
        return Err(PipelineError::InsufficientPopulation {
            profiles: n_samples,
            distinct,
        });
    }

    let model = fit_kmeans(&matrix, config)?;

    let assignments = matrix
        .patient_ids
        .iter()
        .zip(model.labels.iter())
        .map(|(patient_id, &cluster)| ClusterAssignment {
            patient_id: patient_id.clone(),
            cluster,
            customer_type: model.customer_type(cluster),
        })
        .collect();

    Ok(Segmentation {
        matrix,
        model,
        assignments,
    })
}

/// Fit K-Means with k = 2 on the standardized matrix
pub fn fit_kmeans(
    matrix: &FeatureMatrix,
    config: &SegmentationConfig,
) -> Result<SegmentationModel, PipelineError> {
    let n_samples = matrix.features.nrows();
    let targets: Array1<usize> = Array1::zeros(n_samples);
    let dataset = Dataset::new(matrix.features.clone(), targets);

    let rng = StdRng::seed_from_u64(config.seed);
    let model = KMeans::params_with(N_CLUSTERS, rng, L2Dist)
        .n_runs(config.n_runs)
        .max_n_iterations(config.max_iters)
        .tolerance(config.tolerance)
        .fit(&dataset)
        .map_err(|e| PipelineError::Clustering(e.to_string()))?;

    let labels: Array1<usize> = model.predict(&matrix.features);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(&matrix.features, &labels, &centroids);

    let mean_spend = cluster_mean_spend(&matrix.total_spent(), &labels)?;
    let vip_cluster = vip_cluster(&mean_spend);

    tracing::debug!(
        inertia,
        ?mean_spend,
        vip_cluster,
        "fitted K-Means"
    );

    Ok(SegmentationModel {
        model,
        labels,
        centroids,
        inertia,
        mean_spend,
        vip_cluster,
    })
}

/// Mean raw spend per cluster; an empty cluster means no 2-way partition was found
fn cluster_mean_spend(
    total_spent: &Array1<f64>,
    labels: &Array1<usize>,
) -> Result<[f64; N_CLUSTERS], PipelineError> {
    let mut sums = [0.0; N_CLUSTERS];
    let mut counts = [0usize; N_CLUSTERS];
    for (&spent, &label) in total_spent.iter().zip(labels.iter()) {
        if label < N_CLUSTERS {
            sums[label] += spent;
            counts[label] += 1;
        }
    }

    if counts.iter().any(|&c| c == 0) {
        return Err(PipelineError::InsufficientPopulation {
            profiles: labels.len(),
            distinct: counts.iter().filter(|&&c| c > 0).count(),
        });
    }

    Ok([
        sums[0] / counts[0] as f64,
        sums[1] / counts[1] as f64,
    ])
}

/// Within-cluster sum of squares
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    let mut inertia = 0.0;

    for (i, &cluster) in labels.iter().enumerate() {
        if cluster < centroids.nrows() {
            let point = features.row(i);
            let centroid = centroids.row(cluster);
            inertia += point
                .iter()
                .zip(centroid.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>();
        }
    }

    inertia
}

fn euclidean_distance(point1: &ndarray::ArrayView1<f64>, point2: &ndarray::ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}
