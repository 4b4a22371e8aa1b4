use crate::aggregator::ClusterAccumulator;
use crate::error::KMeansError;
use ndarray::{Array1, Array2, ArrayView2};

/// New centroid set of one round plus the slots that received no points
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedCentroids {
    pub centroids: Array2<f64>,
    pub empty_clusters: Vec<usize>,
}

/// Divide an accumulator's sum by its count, component-wise.
///
/// Returns `None` for an accumulator that never absorbed a point.
pub fn average(acc: ClusterAccumulator) -> Option<(usize, Array1<f64>)> {
    if acc.count == 0 {
        return None;
    }
    let count = acc.count as f64;
    let mut centroid = acc.sum;
    centroid.mapv_inplace(|v| v / count);
    Some((acc.cluster_id, centroid))
}

/// Assemble the ordered centroid set of length `k` for the next round.
///
/// Row `i` is cluster `i`. A cluster without an accumulator keeps its row
/// from `previous`; its id is reported in `empty_clusters`.
pub fn collect_centroids(
    previous: &ArrayView2<f64>,
    accumulators: Vec<ClusterAccumulator>,
) -> Result<CollectedCentroids, KMeansError> {
    let k = previous.nrows();
    let n_features = previous.ncols();

    let mut centroids = previous.to_owned();
    let mut filled = vec![false; k];

    for (cluster_id, centroid) in accumulators.into_iter().filter_map(average) {
        if cluster_id >= k {
            return Err(KMeansError::InvalidK(format!(
                "cluster id {} out of range for k = {}",
                cluster_id, k
            )));
        }
        if centroid.len() != n_features {
            return Err(KMeansError::InvalidDimensions(format!(
                "Expected {} features, got {}",
                n_features,
                centroid.len()
            )));
        }
        centroids.row_mut(cluster_id).assign(&centroid);
        filled[cluster_id] = true;
    }

    let empty_clusters = filled
        .iter()
        .enumerate()
        .filter(|(_, &f)| !f)
        .map(|(i, _)| i)
        .collect();

    Ok(CollectedCentroids {
        centroids,
        empty_clusters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn acc(cluster_id: usize, sum: Array1<f64>, count: u64) -> ClusterAccumulator {
        ClusterAccumulator {
            cluster_id,
            sum,
            count,
        }
    }

    #[test]
    fn test_average_divides_by_count() {
        let (id, centroid) = average(acc(2, array![3.0, 6.0], 3)).unwrap();
        assert_eq!(id, 2);
        assert_eq!(centroid, array![1.0, 2.0]);
        assert!(average(acc(0, array![1.0], 0)).is_none());
    }

    #[test]
    fn test_collect_orders_by_cluster_id() {
        let previous = array![[0.0], [0.0], [0.0]];
        let collected = collect_centroids(
            &previous.view(),
            vec![
                acc(2, array![9.0], 3),
                acc(0, array![2.0], 2),
                acc(1, array![5.0], 1),
            ],
        )
        .unwrap();

        assert_eq!(collected.centroids, array![[1.0], [5.0], [3.0]]);
        assert!(collected.empty_clusters.is_empty());
    }

    #[test]
    fn test_empty_cluster_retains_previous_centroid() {
        let previous = array![[1.0, 1.0], [50.0, 50.0], [10.0, 10.0]];
        let collected = collect_centroids(
            &previous.view(),
            vec![acc(0, array![2.0, 4.0], 2), acc(2, array![11.0, 11.0], 1)],
        )
        .unwrap();

        assert_eq!(collected.centroids.nrows(), 3);
        assert_eq!(collected.centroids.row(1), previous.row(1));
        assert_eq!(collected.centroids.row(0), array![1.0, 2.0]);
        assert_eq!(collected.empty_clusters, vec![1]);
    }

    #[test]
    fn test_out_of_range_cluster_is_rejected() {
        let previous = array![[0.0]];
        let result = collect_centroids(&previous.view(), vec![acc(4, array![1.0], 1)]);
        assert!(matches!(result, Err(KMeansError::InvalidK(_))));
    }
}
