//! # roundkmeans-rs
//!
//! Round-synchronized k-means (Lloyd's algorithm) over partitioned data,
//! compatible with ndarray.
//!
//! ## How a round works
//!
//! - The current centroid set is broadcast to every partition.
//! - Each partition's [`NearestCentroidAssigner`] fires once: every retained
//!   point is assigned to its nearest centroid.
//! - Assignments are reduced into per-cluster sums and counts, partition-local
//!   partials are merged, and the [`RoundBarrier`] closes the round.
//! - Averaging the accumulators gives the next centroid set. Clusters that
//!   received no point keep their previous centroid (or are reseeded).
//!
//! Rounds repeat until `max_iters` rounds have run or, if `tol` is set, the
//! centroids stop moving. Round state can be checkpointed at every boundary
//! and resumed after a restart.
//!
//! ## Example
//!
//! ```rust
//! use roundkmeans_rs::{KMeans, KMeansConfig};
//! use ndarray::Array2;
//! use ndarray_rand::RandomExt;
//! use ndarray_rand::rand_distr::Uniform;
//!
//! let data = Array2::random((1000, 16), Uniform::new(-1.0, 1.0));
//!
//! let config = KMeansConfig::new(10)
//!     .with_max_iters(15)
//!     .with_seed(42)
//!     .with_parallelism(4);
//!
//! let model = KMeans::with_config(config).fit(&data.view()).unwrap();
//! assert_eq!(model.centroids().nrows(), 10);
//! assert_eq!(model.summary().rounds, 15);
//! ```
//!
//! ## Resuming from a checkpoint
//!
//! ```rust
//! use std::sync::Arc;
//! use roundkmeans_rs::{CheckpointStore, InMemoryCheckpointStore, KMeans, KMeansConfig};
//! use ndarray::array;
//!
//! let data = array![[0.0], [1.0], [2.0], [9.0], [10.0], [11.0]];
//! let store = Arc::new(InMemoryCheckpointStore::new());
//! let kmeans = KMeans::with_config(KMeansConfig::new(2).with_max_iters(4))
//!     .with_checkpoint_store(store.clone());
//!
//! let model = kmeans.fit(&data.view()).unwrap();
//! let checkpoint = store.load(2).unwrap().unwrap();
//! let resumed = kmeans.resume(checkpoint).unwrap();
//! assert_eq!(resumed.centroids(), model.centroids());
//! ```

mod aggregator;
mod assigner;
mod barrier;
mod checkpoint;
mod collector;
mod config;
mod controller;
mod distance;
mod error;
mod init;
mod kmeans;
mod termination;

pub use aggregator::{aggregate, ClusterAccumulator, PartialAggregate};
pub use assigner::{
    nearest_centroid, AssignerSnapshot, AssignerState, Assignment, NearestCentroidAssigner,
};
pub use barrier::RoundBarrier;
pub use checkpoint::{
    CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore, RoundCheckpoint,
};
pub use collector::{average, collect_centroids, CollectedCentroids};
pub use config::{EmptyClusterPolicy, KMeansConfig};
pub use controller::{FitOutcome, FitSummary, RoundController};
pub use distance::{
    compute_centroid_shift, distance_measure_from_name, squared_euclidean, DistanceMeasure,
    EuclideanDistance,
};
pub use error::KMeansError;
pub use init::select_initial_centroids;
pub use kmeans::{KMeans, KMeansModel};
pub use termination::{
    CentroidShift, MaxIterations, MaxIterationsOrConverged, TerminationCriterion,
    TerminationReason,
};
