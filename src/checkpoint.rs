use crate::assigner::AssignerSnapshot;
use crate::error::KMeansError;
use ndarray::Array2;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Engine state captured at a round boundary.
///
/// Taken after the round's centroid set has been broadcast to every partition
/// and before any partition fires, so resuming replays exactly that round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundCheckpoint {
    /// Round about to fire
    pub epoch: usize,
    /// Centroid set broadcast for `epoch`
    pub centroids: Array2<f64>,
    /// Inertia of every round completed before `epoch`
    pub inertia_history: Vec<f64>,
    /// Starved-cluster occurrences seen before `epoch`
    pub empty_cluster_events: usize,
    /// One snapshot per partition, indexed by partition id
    pub partitions: Vec<AssignerSnapshot>,
}

/// Durable home for round checkpoints
pub trait CheckpointStore: Send + Sync {
    fn save(&self, checkpoint: &RoundCheckpoint) -> Result<(), KMeansError>;

    /// Checkpoint taken at `epoch`, if it is still retained
    fn load(&self, epoch: usize) -> Result<Option<RoundCheckpoint>, KMeansError>;

    /// Most recent checkpoint, if any
    fn load_latest(&self) -> Result<Option<RoundCheckpoint>, KMeansError>;
}

/// Keeps every checkpoint in memory. Mostly useful for tests.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Mutex<Vec<RoundCheckpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.lock().is_empty()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn save(&self, checkpoint: &RoundCheckpoint) -> Result<(), KMeansError> {
        let mut checkpoints = self.checkpoints.lock();
        checkpoints.retain(|c| c.epoch != checkpoint.epoch);
        checkpoints.push(checkpoint.clone());
        Ok(())
    }

    fn load(&self, epoch: usize) -> Result<Option<RoundCheckpoint>, KMeansError> {
        Ok(self
            .checkpoints
            .lock()
            .iter()
            .find(|c| c.epoch == epoch)
            .cloned())
    }

    fn load_latest(&self) -> Result<Option<RoundCheckpoint>, KMeansError> {
        Ok(self
            .checkpoints
            .lock()
            .iter()
            .max_by_key(|c| c.epoch)
            .cloned())
    }
}

/// Writes each checkpoint as a JSON file named `round-<epoch>.json` in a
/// directory, keeping only the newest `retain` files.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    retain: usize,
}

impl FileCheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, KMeansError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, retain: 2 })
    }

    /// Number of checkpoint files to keep (at least one)
    pub fn with_retain(mut self, retain: usize) -> Self {
        self.retain = retain.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(epoch: usize) -> String {
        format!("round-{:08}.json", epoch)
    }

    fn path_for(&self, epoch: usize) -> PathBuf {
        self.dir.join(Self::file_name(epoch))
    }

    fn epochs(&self) -> Result<Vec<usize>, KMeansError> {
        let mut epochs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let epoch = name
                .strip_prefix("round-")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|digits| digits.parse::<usize>().ok());
            // Only names written by `path_for` count.
            if let Some(epoch) = epoch.filter(|&e| name == Self::file_name(e)) {
                epochs.push(epoch);
            }
        }
        epochs.sort_unstable();
        Ok(epochs)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, checkpoint: &RoundCheckpoint) -> Result<(), KMeansError> {
        let path = self.path_for(checkpoint.epoch);
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, serde_json::to_vec(checkpoint)?)?;
        fs::rename(&tmp, &path)?;
        debug!(epoch = checkpoint.epoch, path = %path.display(), "checkpoint written");

        let epochs = self.epochs()?;
        if epochs.len() > self.retain {
            for &old in &epochs[..epochs.len() - self.retain] {
                fs::remove_file(self.path_for(old))?;
            }
        }
        Ok(())
    }

    fn load(&self, epoch: usize) -> Result<Option<RoundCheckpoint>, KMeansError> {
        let path = self.path_for(epoch);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let checkpoint = serde_json::from_slice(&bytes).map_err(|e| {
            KMeansError::Recovery(format!("corrupt checkpoint {}: {}", path.display(), e))
        })?;
        Ok(Some(checkpoint))
    }

    fn load_latest(&self) -> Result<Option<RoundCheckpoint>, KMeansError> {
        match self.epochs()?.last() {
            Some(&epoch) => self.load(epoch),
            None => Ok(None),
        }
    }
}
