//! Run round-based k-means on a `.npy` matrix and write the centroids back
//! out as `.npy`.
//!
//! Usage: `run-kmeans <input.npy> -o <output.npy> --k 8 --max-iters 20 --seed 0`
//!
//! Resuming reads the points back from the checkpoint, so no input is needed:
//! `run-kmeans -o <output.npy> --checkpoint-dir ckpt --resume`

use clap::Parser;
use ndarray::Array2;
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use roundkmeans_rs::{
    CheckpointStore, EmptyClusterPolicy, FileCheckpointStore, KMeans, KMeansConfig,
};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "run-kmeans", about = "Round-synchronized k-means over a .npy matrix")]
struct Args {
    /// Input matrix of shape (n_samples, n_features), f64
    #[arg(required_unless_present = "resume")]
    input: Option<PathBuf>,

    /// Where to write the (k, n_features) centroid matrix
    #[arg(short, long)]
    output: PathBuf,

    #[arg(long, default_value_t = 2)]
    k: usize,

    #[arg(long, default_value_t = 20)]
    max_iters: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Stop early once the summed centroid shift is below this value
    #[arg(long)]
    tol: Option<f64>,

    /// Number of partitions (defaults to the number of worker threads)
    #[arg(long)]
    parallelism: Option<usize>,

    #[arg(long, default_value = "euclidean")]
    distance_measure: String,

    /// Reseed starved clusters instead of keeping their previous centroid
    #[arg(long)]
    reseed_empty: bool,

    /// Directory for round checkpoints
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Resume from the newest checkpoint in --checkpoint-dir
    #[arg(long, requires = "checkpoint_dir")]
    resume: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = KMeansConfig::new(args.k)
        .with_max_iters(args.max_iters)
        .with_seed(args.seed)
        .with_distance_measure(args.distance_measure);
    if let Some(tol) = args.tol {
        config = config.with_tol(tol);
    }
    if let Some(parallelism) = args.parallelism {
        config = config.with_parallelism(parallelism);
    }
    if args.reseed_empty {
        config = config.with_empty_cluster_policy(EmptyClusterPolicy::Reseed);
    }
    config.validate()?;

    let mut kmeans = KMeans::with_config(config);
    let store = match &args.checkpoint_dir {
        Some(dir) => {
            let store = Arc::new(FileCheckpointStore::new(dir)?);
            kmeans = kmeans.with_checkpoint_store(store.clone());
            Some(store)
        }
        None => None,
    };

    let model = match (&store, args.resume) {
        (Some(store), true) => {
            let checkpoint = store
                .load_latest()?
                .ok_or("no checkpoint found to resume from")?;
            info!(epoch = checkpoint.epoch, "resuming from checkpoint");
            kmeans.resume(checkpoint)?
        }
        _ => {
            let input = args.input.as_ref().ok_or("an input matrix is required")?;
            let reader = BufReader::new(File::open(input)?);
            let data: Array2<f64> = Array2::read_npy(reader)?;
            info!(
                samples = data.nrows(),
                features = data.ncols(),
                path = %input.display(),
                "loaded data"
            );
            kmeans.fit(&data.view())?
        }
    };

    let summary = model.summary();
    info!(
        rounds = summary.rounds,
        reason = ?summary.reason,
        final_inertia = summary.inertia_history.last().copied().unwrap_or_default(),
        "fit complete"
    );

    let writer = File::create(&args.output)?;
    model.centroids().write_npy(writer)?;
    info!(path = %args.output.display(), "saved centroids");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_resume_does_not_need_input() {
        let args = Args::try_parse_from([
            "run-kmeans",
            "-o",
            "centroids.npy",
            "--checkpoint-dir",
            "ckpt",
            "--resume",
        ])
        .unwrap();
        assert!(args.resume);
        assert!(args.input.is_none());
    }

    #[test]
    fn test_fit_requires_input() {
        assert!(Args::try_parse_from(["run-kmeans", "-o", "centroids.npy"]).is_err());

        let args = Args::try_parse_from(["run-kmeans", "points.npy", "-o", "centroids.npy"])
            .unwrap();
        assert_eq!(args.input, Some(PathBuf::from("points.npy")));
    }
}
