use crate::error::KMeansError;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

#[derive(Debug)]
struct BarrierState {
    epoch: usize,
    arrived: Vec<bool>,
    count: usize,
}

/// Round barrier shared by the coordinator and every partition.
///
/// Each partition arrives exactly once per epoch. The coordinator waits until
/// all have arrived, finishes the round's reduction, then releases the epoch.
/// Partitions do not block on the barrier themselves: the coordinator joins
/// every partition task before the next round fires, and the barrier checks
/// that the join saw each partition exactly once for the open epoch.
#[derive(Debug)]
pub struct RoundBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    changed: Condvar,
}

impl RoundBarrier {
    pub fn new(parties: usize) -> Self {
        Self::starting_at(parties, 0)
    }

    /// Barrier whose first open epoch is `epoch`, used when resuming.
    pub fn starting_at(parties: usize, epoch: usize) -> Self {
        Self {
            parties,
            state: Mutex::new(BarrierState {
                epoch,
                arrived: vec![false; parties],
                count: 0,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// The epoch currently open for arrivals
    pub fn epoch(&self) -> usize {
        self.state.lock().epoch
    }

    /// Record that `partition` finished emitting its output for `epoch`.
    pub fn arrive(&self, partition: usize, epoch: usize) -> Result<(), KMeansError> {
        let mut state = self.state.lock();
        if epoch != state.epoch {
            return Err(KMeansError::BarrierViolation(format!(
                "partition {} arrived for epoch {} while epoch {} is open",
                partition, epoch, state.epoch
            )));
        }
        if partition >= self.parties {
            return Err(KMeansError::BarrierViolation(format!(
                "unknown partition {} (barrier has {} parties)",
                partition, self.parties
            )));
        }
        if state.arrived[partition] {
            return Err(KMeansError::BarrierViolation(format!(
                "partition {} arrived twice in epoch {}",
                partition, epoch
            )));
        }

        state.arrived[partition] = true;
        state.count += 1;
        trace!(partition, epoch, arrived = state.count, parties = self.parties, "barrier arrival");

        if state.count == self.parties {
            self.changed.notify_all();
        }
        Ok(())
    }

    /// Block until every partition has arrived for `epoch`.
    ///
    /// Returns immediately if `epoch` was already released.
    pub fn wait(&self, epoch: usize) -> Result<(), KMeansError> {
        let mut state = self.state.lock();
        if epoch > state.epoch {
            return Err(KMeansError::BarrierViolation(format!(
                "cannot wait on future epoch {} (open epoch is {})",
                epoch, state.epoch
            )));
        }
        while state.epoch == epoch && state.count < self.parties {
            self.changed.wait(&mut state);
        }
        Ok(())
    }

    /// Close the open epoch and open the next one. Fails if any partition
    /// has not arrived yet.
    pub fn release(&self) -> Result<usize, KMeansError> {
        let mut state = self.state.lock();
        if state.count != self.parties {
            let missing: Vec<usize> = state
                .arrived
                .iter()
                .enumerate()
                .filter(|(_, &a)| !a)
                .map(|(i, _)| i)
                .collect();
            return Err(KMeansError::BarrierViolation(format!(
                "epoch {} released with partitions {:?} missing",
                state.epoch, missing
            )));
        }

        state.epoch += 1;
        state.count = 0;
        state.arrived.iter_mut().for_each(|a| *a = false);
        self.changed.notify_all();
        Ok(state.epoch)
    }
}
