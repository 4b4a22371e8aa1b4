use crate::error::KMeansError;
use ndarray::{Array2, ArrayView2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Select the initial centroid set by sampling `k` points without replacement.
///
/// All points are shuffled with a generator keyed by `seed` and the first `k`
/// are taken, so the same seed and input order always give the same subset.
/// This is a one-shot, single-worker step that runs before the first round.
pub fn select_initial_centroids(
    points: &ArrayView2<f64>,
    k: usize,
    seed: u64,
) -> Result<Array2<f64>, KMeansError> {
    let n_samples = points.nrows();
    let n_features = points.ncols();

    if k == 0 {
        return Err(KMeansError::InvalidK(
            "k must be greater than 0".to_string(),
        ));
    }

    if n_samples < k {
        return Err(KMeansError::InsufficientData(format!(
            "Number of samples ({}) is less than k ({})",
            n_samples, k
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..n_samples).collect();
    indices.shuffle(&mut rng);

    let mut centroids = Array2::zeros((k, n_features));
    for (centroid_idx, &data_idx) in indices.iter().take(k).enumerate() {
        centroids.row_mut(centroid_idx).assign(&points.row(data_idx));
    }

    Ok(centroids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    #[test]
    fn test_select_initial_centroids_shape() {
        let data = Array2::random((100, 8), Uniform::new(-1.0, 1.0));

        let centroids = select_initial_centroids(&data.view(), 5, 42).unwrap();

        assert_eq!(centroids.nrows(), 5);
        assert_eq!(centroids.ncols(), 8);
    }

    #[test]
    fn test_seeding_is_deterministic() {
        let data = Array2::random((200, 4), Uniform::new(-1.0, 1.0));

        let first = select_initial_centroids(&data.view(), 10, 7).unwrap();
        let second = select_initial_centroids(&data.view(), 10, 7).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_seeding_samples_without_replacement() {
        let data = array![[0.0], [1.0], [2.0], [3.0], [4.0]];

        let centroids = select_initial_centroids(&data.view(), 5, 3).unwrap();
        let mut values: Vec<f64> = centroids.iter().copied().collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_seeding_insufficient_data() {
        let data = array![[0.0, 1.0], [2.0, 3.0]];
        let result = select_initial_centroids(&data.view(), 3, 0);
        assert!(matches!(result, Err(KMeansError::InsufficientData(_))));
    }
}
