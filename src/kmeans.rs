use crate::assigner::nearest_centroid;
use crate::checkpoint::{CheckpointStore, RoundCheckpoint};
use crate::config::KMeansConfig;
use crate::controller::{FitOutcome, FitSummary, RoundController};
use crate::distance::{distance_measure_from_name, DistanceMeasure};
use crate::error::KMeansError;
use crate::init::select_initial_centroids;
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Iterative k-means estimator over partitioned data.
///
/// Points are spread over `config.parallelism` partitions, seeded with a
/// deterministic random sample, and refined round by round until the round
/// budget or the convergence tolerance is reached.
///
/// # Example
///
/// ```
/// use roundkmeans_rs::{KMeans, KMeansConfig};
/// use ndarray::array;
///
/// let data = array![[0.0], [1.0], [2.0], [9.0], [10.0], [11.0]];
/// let config = KMeansConfig::new(2).with_max_iters(5).with_seed(1);
///
/// let model = KMeans::with_config(config).fit(&data.view()).unwrap();
/// assert_eq!(model.centroids().nrows(), 2);
///
/// let labels = model.predict(&data.view()).unwrap();
/// assert_eq!(labels.len(), 6);
/// ```
pub struct KMeans {
    /// Model configuration
    config: KMeansConfig,

    /// Optional sink for round checkpoints
    checkpoints: Option<Arc<dyn CheckpointStore>>,
}

impl KMeans {
    /// Create an estimator with default configuration and `k` clusters.
    pub fn new(k: usize) -> Self {
        Self::with_config(KMeansConfig::new(k))
    }

    /// Create an estimator with custom configuration.
    ///
    /// The configuration is validated when fitting starts.
    pub fn with_config(config: KMeansConfig) -> Self {
        Self {
            config,
            checkpoints: None,
        }
    }

    /// Checkpoint every round boundary into `store`.
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Fit on a single matrix of shape (n_samples, n_features).
    ///
    /// Rows are dealt round-robin into `config.parallelism` partitions.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - Number of samples is less than k
    pub fn fit(&self, data: &ArrayView2<f64>) -> Result<KMeansModel, KMeansError> {
        self.config.validate()?;
        let initial = select_initial_centroids(data, self.config.k, self.config.seed)?;
        let partitions = split_round_robin(data, self.config.parallelism);
        let views: Vec<ArrayView2<f64>> = partitions.iter().map(|p| p.view()).collect();
        self.fit_with_initial(initial, &views)
    }

    /// Fit on data that is already partitioned.
    ///
    /// Seeding samples from the partitions concatenated in order.
    pub fn fit_partitioned(
        &self,
        partitions: &[ArrayView2<f64>],
    ) -> Result<KMeansModel, KMeansError> {
        self.config.validate()?;
        if partitions.is_empty() {
            return Err(KMeansError::InsufficientData(
                "at least one partition is required".to_string(),
            ));
        }
        let all = concatenate(Axis(0), partitions).map_err(|e| {
            KMeansError::InvalidDimensions(format!("partitions disagree on shape: {}", e))
        })?;
        let initial = select_initial_centroids(&all.view(), self.config.k, self.config.seed)?;
        self.fit_with_initial(initial, partitions)
    }

    /// Fit starting from an externally chosen centroid set.
    pub fn fit_with_initial(
        &self,
        initial: Array2<f64>,
        partitions: &[ArrayView2<f64>],
    ) -> Result<KMeansModel, KMeansError> {
        let outcome = self.controller()?.run(initial, partitions)?;
        self.build_model(outcome)
    }

    /// Continue a fit from a round checkpoint.
    pub fn resume(&self, checkpoint: RoundCheckpoint) -> Result<KMeansModel, KMeansError> {
        let outcome = self.controller()?.resume(checkpoint)?;
        self.build_model(outcome)
    }

    /// Get the configuration.
    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    fn controller(&self) -> Result<RoundController<'_>, KMeansError> {
        let controller = RoundController::new(&self.config)?;
        Ok(match &self.checkpoints {
            Some(store) => controller.with_checkpoint_store(Arc::clone(store)),
            None => controller,
        })
    }

    fn build_model(&self, outcome: FitOutcome) -> Result<KMeansModel, KMeansError> {
        Ok(KMeansModel {
            distance: distance_measure_from_name(&self.config.distance_measure)?,
            config: self.config.clone(),
            centroids: outcome.centroids,
            summary: outcome.summary,
        })
    }
}

/// Deal rows into `parallelism` partitions: row `i` goes to `i % parallelism`.
fn split_round_robin(data: &ArrayView2<f64>, parallelism: usize) -> Vec<Array2<f64>> {
    (0..parallelism)
        .map(|p| {
            let rows: Vec<usize> = (p..data.nrows()).step_by(parallelism).collect();
            data.select(Axis(0), &rows)
        })
        .collect()
}

#[derive(Serialize, Deserialize)]
struct ModelData {
    config: KMeansConfig,
    centroids: Array2<f64>,
    summary: FitSummary,
}

/// Centroids produced by a finished fit.
#[derive(Debug, Clone)]
pub struct KMeansModel {
    config: KMeansConfig,
    centroids: Array2<f64>,
    summary: FitSummary,
    distance: Arc<dyn DistanceMeasure>,
}

impl KMeansModel {
    /// Final centroid set, row `i` is cluster `i`.
    pub fn centroids(&self) -> &Array2<f64> {
        &self.centroids
    }

    pub fn summary(&self) -> &FitSummary {
        &self.summary
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    /// Get the number of clusters.
    pub fn k(&self) -> usize {
        self.centroids.nrows()
    }

    /// Get the number of features (dimensions).
    pub fn dim(&self) -> usize {
        self.centroids.ncols()
    }

    /// Assign each row of `data` to its nearest centroid.
    ///
    /// # Errors
    ///
    /// Returns an error if data dimensions don't match the centroids.
    pub fn predict(&self, data: &ArrayView2<f64>) -> Result<Array1<usize>, KMeansError> {
        if data.ncols() != self.dim() {
            return Err(KMeansError::InvalidDimensions(format!(
                "Expected {} features, got {}",
                self.dim(),
                data.ncols()
            )));
        }

        let centroids = self.centroids.view();
        let labels: Vec<usize> = (0..data.nrows())
            .into_par_iter()
            .map(|i| nearest_centroid(self.distance.as_ref(), &centroids, &data.row(i)).0)
            .collect();

        Ok(Array1::from(labels))
    }

    /// Persist centroids, configuration and fit summary as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), KMeansError> {
        let data = ModelData {
            config: self.config.clone(),
            centroids: self.centroids.clone(),
            summary: self.summary.clone(),
        };
        fs::write(path, serde_json::to_vec_pretty(&data)?)?;
        Ok(())
    }

    /// Load a model written by [`KMeansModel::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KMeansError> {
        let data: ModelData = serde_json::from_slice(&fs::read(path)?)?;
        data.config.validate()?;
        if data.centroids.nrows() != data.config.k {
            return Err(KMeansError::InvalidK(format!(
                "stored model has {} centroids, config says k = {}",
                data.centroids.nrows(),
                data.config.k
            )));
        }
        Ok(Self {
            distance: distance_measure_from_name(&data.config.distance_measure)?,
            config: data.config,
            centroids: data.centroids,
            summary: data.summary,
        })
    }
}
