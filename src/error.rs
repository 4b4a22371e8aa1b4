use thiserror::Error;

/// Error types for the round-based k-means engine
#[derive(Error, Debug)]
pub enum KMeansError {
    /// The number of clusters k is invalid (must be > 0)
    #[error("Invalid k value: {0}")]
    InvalidK(String),

    /// The round budget is invalid (must be > 0)
    #[error("Invalid max_iters value: {0}")]
    InvalidMaxIters(String),

    /// The number of partitions is invalid (must be > 0)
    #[error("Invalid parallelism: {0}")]
    InvalidParallelism(String),

    /// The convergence tolerance is negative or not finite
    #[error("Invalid tolerance: {0}")]
    InvalidTolerance(String),

    /// No distance measure is registered under the given name
    #[error("Unsupported distance measure: {0}. Supported options: 'euclidean'")]
    UnsupportedDistanceMeasure(String),

    /// Not enough data points for the requested number of clusters
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Model has not been fitted yet
    #[error("Model has not been fitted. Call fit() first.")]
    NotFitted,

    /// Dimension mismatch between data and model
    #[error("Dimension mismatch: {0}")]
    InvalidDimensions(String),

    /// A partition received other than exactly one centroid broadcast in a round
    #[error("Partition received {received} centroid broadcasts in round {epoch}, expected 1")]
    BroadcastViolation { epoch: usize, received: usize },

    /// A partition arrived twice, late, or a round was released early
    #[error("Barrier violation: {0}")]
    BarrierViolation(String),

    /// Input was delivered to an assigner after the iteration terminated
    #[error("Assigner for partition {0} has already terminated")]
    AssignerTerminated(usize),

    /// Persisted round state could not be restored
    #[error("Recovery failed: {0}")]
    Recovery(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
