use crate::distance::DistanceMeasure;
use crate::error::KMeansError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// Lifecycle of a partition's assigner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignerState {
    /// Buffering points and waiting for the round's broadcast
    Accumulating,
    /// Round boundary reached, emitting assignments
    RoundFiring,
    /// Iteration finished, retained points released
    Terminated,
}

/// A point tagged with the cluster it was assigned to in one round
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub cluster_id: usize,
    pub point: Array1<f64>,
    /// Distance from the point to its chosen centroid
    pub distance: f64,
}

/// Persisted state of one partition's assigner.
///
/// Holds everything needed to resume after a restart: the retained points
/// and any broadcast that arrived but has not fired yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignerSnapshot {
    pub partition_id: usize,
    pub points: Vec<Array1<f64>>,
    pub pending: Vec<Array2<f64>>,
    pub state: AssignerState,
}

/// Stateful per-partition operator that assigns every retained point to its
/// nearest centroid, once per round.
///
/// Points are ingested once and kept for the lifetime of the iteration. Each
/// round exactly one centroid set must be broadcast before the boundary fires.
#[derive(Debug)]
pub struct NearestCentroidAssigner {
    partition_id: usize,
    distance: Arc<dyn DistanceMeasure>,
    points: Vec<Array1<f64>>,
    pending: Vec<Array2<f64>>,
    state: AssignerState,
}

impl NearestCentroidAssigner {
    pub fn new(partition_id: usize, distance: Arc<dyn DistanceMeasure>) -> Self {
        Self {
            partition_id,
            distance,
            points: Vec::new(),
            pending: Vec::new(),
            state: AssignerState::Accumulating,
        }
    }

    /// Rebuild an assigner from persisted state.
    pub fn restore(
        snapshot: AssignerSnapshot,
        distance: Arc<dyn DistanceMeasure>,
    ) -> Result<Self, KMeansError> {
        if snapshot.state == AssignerState::RoundFiring {
            return Err(KMeansError::Recovery(format!(
                "partition {} was snapshotted mid-firing",
                snapshot.partition_id
            )));
        }

        if let Some(first) = snapshot.points.first() {
            let dim = first.len();
            if snapshot.points.iter().any(|p| p.len() != dim) {
                return Err(KMeansError::Recovery(format!(
                    "partition {} holds points of mixed dimensionality",
                    snapshot.partition_id
                )));
            }
        }

        Ok(Self {
            partition_id: snapshot.partition_id,
            distance,
            points: snapshot.points,
            pending: snapshot.pending,
            state: snapshot.state,
        })
    }

    pub fn snapshot(&self) -> AssignerSnapshot {
        AssignerSnapshot {
            partition_id: self.partition_id,
            points: self.points.clone(),
            pending: self.pending.clone(),
            state: self.state,
        }
    }

    pub fn partition_id(&self) -> usize {
        self.partition_id
    }

    pub fn state(&self) -> AssignerState {
        self.state
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Number of centroid broadcasts buffered for the in-flight round
    pub fn pending_broadcasts(&self) -> usize {
        self.pending.len()
    }

    /// Retained points of this partition
    pub fn points(&self) -> &[Array1<f64>] {
        &self.points
    }

    /// Dimensionality of the retained points, if any have arrived
    pub fn dim(&self) -> Option<usize> {
        self.points.first().map(|p| p.len())
    }

    /// Retain one point for the rest of the iteration.
    pub fn process_point(&mut self, point: ArrayView1<f64>) -> Result<(), KMeansError> {
        self.ensure_live()?;
        if let Some(dim) = self.dim() {
            if point.len() != dim {
                return Err(KMeansError::InvalidDimensions(format!(
                    "Expected {} features, got {}",
                    dim,
                    point.len()
                )));
            }
        }
        self.points.push(point.to_owned());
        Ok(())
    }

    /// Retain every row of `points`.
    pub fn process_points(&mut self, points: &ArrayView2<f64>) -> Result<(), KMeansError> {
        for row in points.rows() {
            self.process_point(row)?;
        }
        Ok(())
    }

    /// Buffer the broadcast centroid set for the current round.
    pub fn process_centroids(&mut self, centroids: Array2<f64>) -> Result<(), KMeansError> {
        self.ensure_live()?;
        if centroids.nrows() == 0 {
            return Err(KMeansError::InvalidK(
                "broadcast centroid set is empty".to_string(),
            ));
        }
        if let Some(dim) = self.dim() {
            if centroids.ncols() != dim {
                return Err(KMeansError::InvalidDimensions(format!(
                    "Expected {} features in centroids, got {}",
                    dim,
                    centroids.ncols()
                )));
            }
        }
        self.pending.push(centroids);
        Ok(())
    }

    /// Fire the round boundary: assign every retained point to its nearest
    /// centroid (ties go to the lowest index) and clear the broadcast buffer.
    pub fn on_round_boundary(&mut self, epoch: usize) -> Result<Vec<Assignment>, KMeansError> {
        self.ensure_live()?;
        if self.pending.len() != 1 {
            return Err(KMeansError::BroadcastViolation {
                epoch,
                received: self.pending.len(),
            });
        }

        self.state = AssignerState::RoundFiring;
        let centroids = self.pending.remove(0);

        let assignments: Vec<Assignment> = self
            .points
            .iter()
            .map(|point| {
                let (cluster_id, distance) =
                    nearest_centroid(self.distance.as_ref(), &centroids.view(), &point.view());
                Assignment {
                    cluster_id,
                    point: point.clone(),
                    distance,
                }
            })
            .collect();

        trace!(
            partition = self.partition_id,
            epoch,
            assignments = assignments.len(),
            "round fired"
        );

        self.state = AssignerState::Accumulating;
        Ok(assignments)
    }

    /// Release all retained state once the iteration is over.
    pub fn on_iteration_terminated(&mut self) {
        self.points.clear();
        self.points.shrink_to_fit();
        self.pending.clear();
        self.state = AssignerState::Terminated;
    }

    fn ensure_live(&self) -> Result<(), KMeansError> {
        if self.state == AssignerState::Terminated {
            return Err(KMeansError::AssignerTerminated(self.partition_id));
        }
        Ok(())
    }
}

/// Index and distance of the centroid closest to `point`.
///
/// Only a strictly smaller distance replaces the current best, so ties keep
/// the lowest index. `centroids` must have at least one row.
pub fn nearest_centroid(
    distance: &dyn DistanceMeasure,
    centroids: &ArrayView2<f64>,
    point: &ArrayView1<f64>,
) -> (usize, f64) {
    let mut best = 0;
    let mut best_dist = distance.distance(&centroids.row(0), point);

    for (i, centroid) in centroids.rows().into_iter().enumerate().skip(1) {
        let dist = distance.distance(&centroid, point);
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }

    (best, best_dist)
}
