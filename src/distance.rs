use crate::error::KMeansError;
use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;
use std::fmt::Debug;
use std::sync::Arc;

/// A pluggable vector distance.
///
/// Implementations must be symmetric and non-negative. The assigner only sees
/// this trait, so new measures can be registered without touching it.
pub trait DistanceMeasure: Debug + Send + Sync {
    /// Name used to select this measure from configuration
    fn name(&self) -> &'static str;

    /// Distance between two vectors of equal length
    fn distance(&self, a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64;
}

/// Euclidean (L2) distance: `sqrt(sum((a_i - b_i)^2))`
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanDistance;

impl EuclideanDistance {
    pub const NAME: &'static str = "euclidean";
}

impl DistanceMeasure for EuclideanDistance {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    #[inline]
    fn distance(&self, a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
        squared_euclidean(a, b).sqrt()
    }
}

/// Look up a distance measure by its configuration name
pub fn distance_measure_from_name(name: &str) -> Result<Arc<dyn DistanceMeasure>, KMeansError> {
    match name {
        EuclideanDistance::NAME => Ok(Arc::new(EuclideanDistance)),
        other => Err(KMeansError::UnsupportedDistanceMeasure(other.to_string())),
    }
}

/// Squared L2 distance between two vectors
#[inline]
pub fn squared_euclidean(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Compute centroid shift (sum of L2 norms of centroid movements)
pub fn compute_centroid_shift(
    old_centroids: &ArrayView2<f64>,
    new_centroids: &ArrayView2<f64>,
) -> f64 {
    let k = old_centroids.nrows();

    (0..k)
        .into_par_iter()
        .map(|i| squared_euclidean(&old_centroids.row(i), &new_centroids.row(i)).sqrt())
        .sum()
}
