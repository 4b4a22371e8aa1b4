use crate::assigner::Assignment;
use ndarray::Array1;
use std::collections::BTreeMap;

/// Running sum and count of the points assigned to one cluster in one round
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAccumulator {
    pub cluster_id: usize,
    pub sum: Array1<f64>,
    pub count: u64,
}

impl ClusterAccumulator {
    pub fn from_assignment(assignment: Assignment) -> Self {
        Self {
            cluster_id: assignment.cluster_id,
            sum: assignment.point,
            count: 1,
        }
    }

    /// Fold another accumulator for the same cluster into this one.
    ///
    /// Associative and commutative: counts match exactly in any order, sums
    /// up to floating point addition.
    pub fn merge(mut self, other: ClusterAccumulator) -> Self {
        debug_assert_eq!(self.cluster_id, other.cluster_id);
        self.sum += &other.sum;
        self.count += other.count;
        self
    }
}

/// Partition-local reduction of one round's assignments, keyed by cluster id.
///
/// Partials from different partitions combine with [`PartialAggregate::merge`],
/// which can run as a tree reduction in any order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialAggregate {
    accumulators: BTreeMap<usize, ClusterAccumulator>,
    cost: f64,
}

impl PartialAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, assignment: Assignment) {
        self.cost += assignment.distance * assignment.distance;
        let incoming = ClusterAccumulator::from_assignment(assignment);
        self.insert(incoming);
    }

    pub fn merge(mut self, other: PartialAggregate) -> Self {
        // Fold the smaller map into the larger one.
        if self.accumulators.len() < other.accumulators.len() {
            let cost = self.cost;
            let mut larger = other;
            for (_, acc) in self.accumulators {
                larger.insert(acc);
            }
            larger.cost += cost;
            return larger;
        }

        for (_, acc) in other.accumulators {
            self.insert(acc);
        }
        self.cost += other.cost;
        self
    }

    /// Sum of squared point-to-centroid distances folded in so far
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Number of clusters that received at least one point
    pub fn len(&self) -> usize {
        self.accumulators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulators.is_empty()
    }

    pub fn get(&self, cluster_id: usize) -> Option<&ClusterAccumulator> {
        self.accumulators.get(&cluster_id)
    }

    /// Accumulators in ascending cluster id order
    pub fn into_accumulators(self) -> Vec<ClusterAccumulator> {
        self.accumulators.into_values().collect()
    }

    fn insert(&mut self, incoming: ClusterAccumulator) {
        match self.accumulators.remove(&incoming.cluster_id) {
            Some(existing) => {
                self.accumulators
                    .insert(incoming.cluster_id, existing.merge(incoming));
            }
            None => {
                self.accumulators.insert(incoming.cluster_id, incoming);
            }
        }
    }
}

/// Reduce a batch of assignments into per-cluster accumulators.
pub fn aggregate<I>(assignments: I) -> PartialAggregate
where
    I: IntoIterator<Item = Assignment>,
{
    let mut partial = PartialAggregate::new();
    for assignment in assignments {
        partial.add(assignment);
    }
    partial
}
