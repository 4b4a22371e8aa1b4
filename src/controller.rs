use crate::aggregator::{aggregate, PartialAggregate};
use crate::assigner::{AssignerState, NearestCentroidAssigner};
use crate::barrier::RoundBarrier;
use crate::checkpoint::{CheckpointStore, RoundCheckpoint};
use crate::collector::collect_centroids;
use crate::config::{EmptyClusterPolicy, KMeansConfig};
use crate::distance::{distance_measure_from_name, DistanceMeasure};
use crate::error::KMeansError;
use crate::termination::{self, TerminationCriterion, TerminationReason};
use ndarray::{Array2, ArrayView2};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

/// Diagnostics of a finished iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    /// Number of rounds that fired
    pub rounds: usize,
    pub reason: TerminationReason,
    /// Sum of squared distances to the assigned centroid, one entry per round
    pub inertia_history: Vec<f64>,
    /// Total number of (round, cluster) pairs that received no points
    pub empty_cluster_events: usize,
}

/// Final centroid set plus diagnostics
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub centroids: Array2<f64>,
    pub summary: FitSummary,
}

/// Drives the bounded round loop over a set of partitions.
///
/// Every round broadcasts the current centroid set to each partition's
/// assigner, fires all partitions in parallel, waits on the round barrier,
/// reduces the partials into a new centroid set and asks the termination
/// criterion whether to continue.
pub struct RoundController<'a> {
    config: &'a KMeansConfig,
    distance: Arc<dyn DistanceMeasure>,
    termination: Box<dyn TerminationCriterion>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
}

struct LoopState {
    epoch: usize,
    centroids: Array2<f64>,
    inertia_history: Vec<f64>,
    empty_cluster_events: usize,
}

impl<'a> RoundController<'a> {
    /// Validate the configuration and build the controller.
    pub fn new(config: &'a KMeansConfig) -> Result<Self, KMeansError> {
        config.validate()?;
        Ok(Self {
            config,
            distance: distance_measure_from_name(&config.distance_measure)?,
            termination: termination::from_config(config),
            checkpoints: None,
        })
    }

    /// Write a checkpoint at every round boundary
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Replace the termination criterion derived from the configuration
    pub fn with_termination(mut self, termination: Box<dyn TerminationCriterion>) -> Self {
        self.termination = termination;
        self
    }

    /// Run the iteration from `initial` over the given point partitions.
    pub fn run(
        &self,
        initial: Array2<f64>,
        partitions: &[ArrayView2<f64>],
    ) -> Result<FitOutcome, KMeansError> {
        let k = self.config.k;
        if initial.nrows() != k {
            return Err(KMeansError::InvalidK(format!(
                "initial centroid set has {} rows, expected k = {}",
                initial.nrows(),
                k
            )));
        }
        if partitions.is_empty() {
            return Err(KMeansError::InsufficientData(
                "at least one partition is required".to_string(),
            ));
        }

        let n_features = initial.ncols();
        let mut assigners = Vec::with_capacity(partitions.len());
        for (partition_id, points) in partitions.iter().enumerate() {
            if points.ncols() != n_features {
                return Err(KMeansError::InvalidDimensions(format!(
                    "partition {} has {} features, centroids have {}",
                    partition_id,
                    points.ncols(),
                    n_features
                )));
            }
            let mut assigner =
                NearestCentroidAssigner::new(partition_id, Arc::clone(&self.distance));
            assigner.process_points(points)?;
            assigner.process_centroids(initial.clone())?;
            assigners.push(assigner);
        }

        let n_points: usize = assigners.iter().map(|a| a.num_points()).sum();
        info!(
            partitions = assigners.len(),
            points = n_points,
            features = n_features,
            k,
            max_iters = self.config.max_iters,
            "starting round iteration"
        );

        self.iterate(
            assigners,
            LoopState {
                epoch: 0,
                centroids: initial,
                inertia_history: Vec::new(),
                empty_cluster_events: 0,
            },
        )
    }

    /// Continue an iteration from a checkpoint taken at a round boundary.
    ///
    /// The checkpointed round fires exactly once; later rounds proceed as
    /// they would have without the restart.
    pub fn resume(&self, checkpoint: RoundCheckpoint) -> Result<FitOutcome, KMeansError> {
        let k = self.config.k;
        if checkpoint.centroids.nrows() != k {
            return Err(KMeansError::Recovery(format!(
                "checkpoint has {} centroids, configuration expects k = {}",
                checkpoint.centroids.nrows(),
                k
            )));
        }
        if checkpoint.partitions.is_empty() {
            return Err(KMeansError::Recovery(
                "checkpoint holds no partitions".to_string(),
            ));
        }
        if checkpoint.inertia_history.len() != checkpoint.epoch {
            return Err(KMeansError::Recovery(format!(
                "checkpoint at epoch {} carries {} completed rounds",
                checkpoint.epoch,
                checkpoint.inertia_history.len()
            )));
        }

        let n_features = checkpoint.centroids.ncols();
        let mut assigners = Vec::with_capacity(checkpoint.partitions.len());
        for (expected_id, snapshot) in checkpoint.partitions.into_iter().enumerate() {
            if snapshot.partition_id != expected_id {
                return Err(KMeansError::Recovery(format!(
                    "partition snapshot {} found in slot {}",
                    snapshot.partition_id, expected_id
                )));
            }
            if snapshot.state != AssignerState::Accumulating {
                return Err(KMeansError::Recovery(format!(
                    "partition {} is in state {:?}",
                    expected_id, snapshot.state
                )));
            }
            if snapshot.pending.len() != 1 {
                return Err(KMeansError::Recovery(format!(
                    "partition {} holds {} pending broadcasts for epoch {}",
                    expected_id,
                    snapshot.pending.len(),
                    checkpoint.epoch
                )));
            }
            let assigner = NearestCentroidAssigner::restore(snapshot, Arc::clone(&self.distance))?;
            if assigner.dim().is_some_and(|d| d != n_features) {
                return Err(KMeansError::Recovery(format!(
                    "partition {} points do not match centroid dimensionality {}",
                    expected_id, n_features
                )));
            }
            assigners.push(assigner);
        }

        info!(
            epoch = checkpoint.epoch,
            partitions = assigners.len(),
            "resuming round iteration from checkpoint"
        );

        self.iterate(
            assigners,
            LoopState {
                epoch: checkpoint.epoch,
                centroids: checkpoint.centroids,
                inertia_history: checkpoint.inertia_history,
                empty_cluster_events: checkpoint.empty_cluster_events,
            },
        )
    }

    /// Run rounds until termination or failure. Retained partition state is
    /// released either way.
    fn iterate(
        &self,
        mut assigners: Vec<NearestCentroidAssigner>,
        state: LoopState,
    ) -> Result<FitOutcome, KMeansError> {
        let result = self.drive(&mut assigners, state);
        for assigner in assigners.iter_mut() {
            assigner.on_iteration_terminated();
        }
        result
    }

    fn drive(
        &self,
        assigners: &mut [NearestCentroidAssigner],
        mut state: LoopState,
    ) -> Result<FitOutcome, KMeansError> {
        let barrier = RoundBarrier::starting_at(assigners.len(), state.epoch);

        loop {
            let epoch = state.epoch;
            let _span = info_span!("round", epoch).entered();
            let round_start = Instant::now();

            if let Some(store) = &self.checkpoints {
                store.save(&RoundCheckpoint {
                    epoch,
                    centroids: state.centroids.clone(),
                    inertia_history: state.inertia_history.clone(),
                    empty_cluster_events: state.empty_cluster_events,
                    partitions: assigners.iter().map(|a| a.snapshot()).collect(),
                })?;
            }

            let partials = assigners
                .par_iter_mut()
                .map(|assigner| -> Result<PartialAggregate, KMeansError> {
                    let partial = aggregate(assigner.on_round_boundary(epoch)?);
                    barrier.arrive(assigner.partition_id(), epoch)?;
                    Ok(partial)
                })
                .collect::<Result<Vec<_>, _>>()?;
            barrier.wait(epoch)?;

            // Merge in partition order so float sums do not depend on scheduling.
            let merged = partials
                .into_iter()
                .fold(PartialAggregate::new(), PartialAggregate::merge);

            let inertia = merged.cost();
            let collected = collect_centroids(&state.centroids.view(), merged.into_accumulators())?;
            let mut next = collected.centroids;

            if !collected.empty_clusters.is_empty() {
                warn!(
                    epoch,
                    clusters = ?collected.empty_clusters,
                    policy = ?self.config.empty_cluster_policy,
                    "clusters received no points"
                );
                state.empty_cluster_events += collected.empty_clusters.len();
                if self.config.empty_cluster_policy == EmptyClusterPolicy::Reseed {
                    self.reseed(&mut next, &collected.empty_clusters, assigners, epoch);
                }
            }

            state.inertia_history.push(inertia);
            let rounds = epoch + 1;
            let verdict = self
                .termination
                .check(rounds, &state.centroids.view(), &next.view());
            barrier.release()?;

            debug!(
                rounds,
                inertia,
                elapsed_s = round_start.elapsed().as_secs_f64(),
                "round complete"
            );

            if let Some(reason) = verdict {
                info!(rounds, ?reason, "round iteration terminated");
                return Ok(FitOutcome {
                    centroids: next,
                    summary: FitSummary {
                        rounds,
                        reason,
                        inertia_history: state.inertia_history,
                        empty_cluster_events: state.empty_cluster_events,
                    },
                });
            }

            for assigner in assigners.iter_mut() {
                assigner.process_centroids(next.clone())?;
            }
            state.centroids = next;
            state.epoch = barrier.epoch();
        }
    }

    /// Replace starved centroids with distinct points drawn from all
    /// partitions. The draw depends only on the seed and the epoch.
    fn reseed(
        &self,
        centroids: &mut Array2<f64>,
        empty_clusters: &[usize],
        assigners: &[NearestCentroidAssigner],
        epoch: usize,
    ) {
        let total: usize = assigners.iter().map(|a| a.num_points()).sum();
        if total == 0 {
            return;
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        rng.set_stream(epoch as u64 + 1);
        let picks = index::sample(&mut rng, total, empty_clusters.len().min(total));

        for (&cluster_id, global_idx) in empty_clusters.iter().zip(picks.iter()) {
            let mut idx = global_idx;
            for assigner in assigners {
                if idx < assigner.num_points() {
                    centroids.row_mut(cluster_id).assign(&assigner.points()[idx]);
                    break;
                }
                idx -= assigner.num_points();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryCheckpointStore;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_one_dimensional_scenario() {
        let config = KMeansConfig::new(2).with_max_iters(5);
        let controller = RoundController::new(&config).unwrap();

        let left = array![[0.0], [1.0], [2.0]];
        let right = array![[9.0], [10.0], [11.0]];
        let outcome = controller
            .run(array![[1.0], [10.0]], &[left.view(), right.view()])
            .unwrap();

        assert_eq!(outcome.centroids, array![[1.0], [10.0]]);
        assert_eq!(outcome.summary.rounds, 5);
        assert_eq!(outcome.summary.reason, TerminationReason::MaxIterations);
        for inertia in &outcome.summary.inertia_history {
            assert_relative_eq!(*inertia, 4.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_runs_exactly_max_iters_rounds() {
        for max_iters in [1, 2, 7] {
            let config = KMeansConfig::new(1).with_max_iters(max_iters);
            let controller = RoundController::new(&config).unwrap();
            let points = array![[0.0, 0.0], [2.0, 2.0]];

            let outcome = controller.run(array![[5.0, 5.0]], &[points.view()]).unwrap();
            assert_eq!(outcome.summary.rounds, max_iters);
            assert_eq!(outcome.summary.inertia_history.len(), max_iters);
            assert_eq!(outcome.centroids, array![[1.0, 1.0]]);
        }
    }

    #[test]
    fn test_convergence_stops_early() {
        let config = KMeansConfig::new(2).with_max_iters(50).with_tol(1e-9);
        let controller = RoundController::new(&config).unwrap();
        let points = array![[0.0], [1.0], [2.0], [9.0], [10.0], [11.0]];

        let outcome = controller.run(array![[0.0], [11.0]], &[points.view()]).unwrap();
        assert!(outcome.summary.rounds < 50);
        assert!(matches!(
            outcome.summary.reason,
            TerminationReason::Converged { .. }
        ));
        assert_eq!(outcome.centroids, array![[1.0], [10.0]]);
    }

    #[test]
    fn test_starved_cluster_keeps_previous_centroid() {
        let config = KMeansConfig::new(3).with_max_iters(3);
        let controller = RoundController::new(&config).unwrap();
        let points = array![[0.0], [1.0], [10.0], [11.0]];

        let outcome = controller
            .run(array![[0.0], [10.0], [100.0]], &[points.view()])
            .unwrap();

        assert_eq!(outcome.centroids, array![[0.5], [10.5], [100.0]]);
        assert_eq!(outcome.summary.empty_cluster_events, 3);
    }

    #[test]
    fn test_starved_cluster_reseeded_from_points() {
        let config = KMeansConfig::new(3)
            .with_max_iters(1)
            .with_empty_cluster_policy(EmptyClusterPolicy::Reseed);
        let controller = RoundController::new(&config).unwrap();
        let points = array![[0.0], [1.0], [10.0], [11.0]];

        let outcome = controller
            .run(array![[0.0], [10.0], [100.0]], &[points.view()])
            .unwrap();

        let reseeded = outcome.centroids[[2, 0]];
        assert!([0.0, 1.0, 10.0, 11.0].contains(&reseeded));
    }

    #[test]
    fn test_empty_partition_still_joins_the_barrier() {
        let config = KMeansConfig::new(2).with_max_iters(2);
        let controller = RoundController::new(&config).unwrap();
        let points = array![[0.0], [10.0]];
        let empty = Array2::<f64>::zeros((0, 1));

        let outcome = controller
            .run(array![[1.0], [9.0]], &[points.view(), empty.view()])
            .unwrap();
        assert_eq!(outcome.centroids, array![[0.0], [10.0]]);
    }

    #[test]
    fn test_wrong_initial_size_fails_fast() {
        let config = KMeansConfig::new(3);
        let controller = RoundController::new(&config).unwrap();
        let points = array![[0.0], [1.0]];

        let result = controller.run(array![[0.0], [1.0]], &[points.view()]);
        assert!(matches!(result, Err(KMeansError::InvalidK(_))));
    }

    #[test]
    fn test_resume_matches_uninterrupted_run() {
        let config = KMeansConfig::new(2).with_max_iters(6);
        let parts = [
            array![[0.0, 0.0], [0.5, 9.0], [1.0, 1.0]],
            array![[8.0, 8.0], [9.0, 1.0]],
            array![[4.0, 5.0], [3.0, 2.0], [7.0, 6.0]],
        ];
        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        let initial = array![[0.0, 0.0], [1.0, 1.0]];

        let store = Arc::new(InMemoryCheckpointStore::new());
        let full = RoundController::new(&config)
            .unwrap()
            .with_checkpoint_store(store.clone())
            .run(initial, &views)
            .unwrap();
        assert_eq!(store.len(), 6);

        let checkpoint = store.load(3).unwrap().unwrap();
        assert_eq!(checkpoint.partitions.len(), 3);
        assert_eq!(checkpoint.partitions[1].points.len(), 2);

        let resumed = RoundController::new(&config)
            .unwrap()
            .resume(checkpoint)
            .unwrap();

        assert_eq!(resumed.centroids, full.centroids);
        assert_eq!(resumed.summary.rounds, full.summary.rounds);
        assert_eq!(resumed.summary.inertia_history, full.summary.inertia_history);
    }

    #[test]
    fn test_resume_rejects_incompatible_checkpoint() {
        let config = KMeansConfig::new(2).with_max_iters(2);
        let store = Arc::new(InMemoryCheckpointStore::new());
        let points = array![[0.0], [10.0]];
        RoundController::new(&config)
            .unwrap()
            .with_checkpoint_store(store.clone())
            .run(array![[0.0], [10.0]], &[points.view()])
            .unwrap();

        let mut checkpoint = store.load(1).unwrap().unwrap();
        checkpoint.partitions[0].pending.clear();
        let result = RoundController::new(&config).unwrap().resume(checkpoint);
        assert!(matches!(result, Err(KMeansError::Recovery(_))));

        let other = KMeansConfig::new(3).with_max_iters(2);
        let checkpoint = store.load(1).unwrap().unwrap();
        let result = RoundController::new(&other).unwrap().resume(checkpoint);
        assert!(matches!(result, Err(KMeansError::Recovery(_))));
    }
}
