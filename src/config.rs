use crate::distance::distance_measure_from_name;
use crate::error::KMeansError;
use serde::{Deserialize, Serialize};

/// What to do with a cluster that received no points in a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyClusterPolicy {
    /// Keep the centroid from the previous round in that slot
    #[default]
    RetainPrevious,
    /// Replace the centroid with a point sampled from the retained partitions
    Reseed,
}

/// Configuration for the round-based k-means engine.
///
/// Built once before fitting and passed by reference to every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansConfig {
    /// Number of clusters
    pub k: usize,

    /// Maximum number of rounds
    pub max_iters: usize,

    /// Convergence tolerance. When the summed centroid shift of a round is
    /// below this threshold, the iteration stops early. `None` runs exactly
    /// `max_iters` rounds.
    pub tol: Option<f64>,

    /// Random seed for centroid initialization and empty-cluster reseeding
    pub seed: u64,

    /// Name of the distance measure. Supported options: "euclidean".
    pub distance_measure: String,

    /// Field of the external record carrying the feature vector
    pub features_col: String,

    /// Number of partitions the points are spread over
    pub parallelism: usize,

    /// Policy for clusters that starve in a round
    pub empty_cluster_policy: EmptyClusterPolicy,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 2,
            max_iters: 20,
            tol: None,
            seed: 0,
            distance_measure: "euclidean".to_string(),
            features_col: "features".to_string(),
            parallelism: rayon::current_num_threads().max(1),
            empty_cluster_policy: EmptyClusterPolicy::RetainPrevious,
        }
    }
}

impl KMeansConfig {
    /// Create a new configuration with the specified number of clusters
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Default::default()
        }
    }

    /// Set the maximum number of rounds
    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    /// Enable early stopping on centroid shift
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = Some(tol);
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the distance measure by name
    pub fn with_distance_measure(mut self, name: impl Into<String>) -> Self {
        self.distance_measure = name.into();
        self
    }

    /// Set the features column name
    pub fn with_features_col(mut self, col: impl Into<String>) -> Self {
        self.features_col = col.into();
        self
    }

    /// Set the number of partitions
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Set the empty-cluster policy
    pub fn with_empty_cluster_policy(mut self, policy: EmptyClusterPolicy) -> Self {
        self.empty_cluster_policy = policy;
        self
    }

    /// Check every option before any round runs.
    pub fn validate(&self) -> Result<(), KMeansError> {
        if self.k == 0 {
            return Err(KMeansError::InvalidK(
                "k must be greater than 0".to_string(),
            ));
        }
        if self.max_iters == 0 {
            return Err(KMeansError::InvalidMaxIters(
                "max_iters must be greater than 0".to_string(),
            ));
        }
        if self.parallelism == 0 {
            return Err(KMeansError::InvalidParallelism(
                "parallelism must be greater than 0".to_string(),
            ));
        }
        if let Some(tol) = self.tol {
            if !tol.is_finite() || tol < 0.0 {
                return Err(KMeansError::InvalidTolerance(format!(
                    "tol must be a finite non-negative number, got {}",
                    tol
                )));
            }
        }
        distance_measure_from_name(&self.distance_measure)?;
        Ok(())
    }
}
