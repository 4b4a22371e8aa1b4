use crate::config::KMeansConfig;
use crate::distance::compute_centroid_shift;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Why the iteration stopped
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// The round budget was used up
    MaxIterations,
    /// The summed centroid movement fell below the tolerance
    Converged { shift: f64 },
}

/// Decides after each round whether another round should run.
///
/// Evaluated only once the round's centroid set is fully formed. `rounds`
/// is the number of completed rounds, `previous` the set that was broadcast
/// for the round and `current` the set it produced.
pub trait TerminationCriterion: Debug + Send + Sync {
    fn check(
        &self,
        rounds: usize,
        previous: &ArrayView2<f64>,
        current: &ArrayView2<f64>,
    ) -> Option<TerminationReason>;

    fn should_terminate(
        &self,
        rounds: usize,
        previous: &ArrayView2<f64>,
        current: &ArrayView2<f64>,
    ) -> bool {
        self.check(rounds, previous, current).is_some()
    }
}

/// Stop once `rounds >= max_iters`
#[derive(Debug, Clone, Copy)]
pub struct MaxIterations {
    pub max_iters: usize,
}

impl TerminationCriterion for MaxIterations {
    fn check(
        &self,
        rounds: usize,
        _previous: &ArrayView2<f64>,
        _current: &ArrayView2<f64>,
    ) -> Option<TerminationReason> {
        (rounds >= self.max_iters).then_some(TerminationReason::MaxIterations)
    }
}

/// Stop once the centroid shift of a round is below `tol`
#[derive(Debug, Clone, Copy)]
pub struct CentroidShift {
    pub tol: f64,
}

impl TerminationCriterion for CentroidShift {
    fn check(
        &self,
        _rounds: usize,
        previous: &ArrayView2<f64>,
        current: &ArrayView2<f64>,
    ) -> Option<TerminationReason> {
        let shift = compute_centroid_shift(previous, current);
        (shift < self.tol).then_some(TerminationReason::Converged { shift })
    }
}

/// Convergence check bounded by a round budget
#[derive(Debug, Clone, Copy)]
pub struct MaxIterationsOrConverged {
    pub max_iters: MaxIterations,
    pub shift: CentroidShift,
}

impl TerminationCriterion for MaxIterationsOrConverged {
    fn check(
        &self,
        rounds: usize,
        previous: &ArrayView2<f64>,
        current: &ArrayView2<f64>,
    ) -> Option<TerminationReason> {
        self.shift
            .check(rounds, previous, current)
            .or_else(|| self.max_iters.check(rounds, previous, current))
    }
}

/// Build the criterion described by the configuration
pub fn from_config(config: &KMeansConfig) -> Box<dyn TerminationCriterion> {
    let max_iters = MaxIterations {
        max_iters: config.max_iters,
    };
    match config.tol {
        Some(tol) => Box::new(MaxIterationsOrConverged {
            max_iters,
            shift: CentroidShift { tol },
        }),
        None => Box::new(max_iters),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_max_iterations() {
        let c = array![[0.0]];
        let criterion = MaxIterations { max_iters: 3 };

        assert!(!criterion.should_terminate(1, &c.view(), &c.view()));
        assert!(!criterion.should_terminate(2, &c.view(), &c.view()));
        assert_eq!(
            criterion.check(3, &c.view(), &c.view()),
            Some(TerminationReason::MaxIterations)
        );
    }

    #[test]
    fn test_centroid_shift_uses_previous_as_baseline() {
        let previous = array![[0.0, 0.0], [5.0, 5.0]];
        let moved = array![[0.5, 0.0], [5.0, 5.0]];
        let criterion = CentroidShift { tol: 0.1 };

        assert!(!criterion.should_terminate(1, &previous.view(), &moved.view()));
        assert!(criterion.should_terminate(1, &moved.view(), &moved.view()));
    }

    #[test]
    fn test_from_config() {
        let c = array![[1.0]];
        let budget_only = from_config(&KMeansConfig::new(1).with_max_iters(5));
        assert!(!budget_only.should_terminate(1, &c.view(), &c.view()));
        assert!(budget_only.should_terminate(5, &c.view(), &c.view()));

        let with_tol = from_config(&KMeansConfig::new(1).with_max_iters(5).with_tol(1e-6));
        assert!(matches!(
            with_tol.check(1, &c.view(), &c.view()),
            Some(TerminationReason::Converged { .. })
        ));
    }
}
