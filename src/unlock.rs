//! Unlock schedule
//!
//! Timed queue of transactions whose outputs become spendable at a
//! future height. Jobs are ranged by unlock height and unique by
//! transaction hash; a hash enqueued twice keeps its original job.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::crypto::TxHash;
use crate::sync::ContainerId;

/// One pending balance unlock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockJob {
    pub unlock_height: u32,
    pub container_id: ContainerId,
    pub transaction_hash: TxHash,
}

#[derive(Default)]
pub struct UnlockSchedule {
    by_height: BTreeMap<u32, Vec<UnlockJob>>,
    by_hash: HashMap<TxHash, u32>,
}

impl UnlockSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    pub fn contains(&self, transaction_hash: &TxHash) -> bool {
        self.by_hash.contains_key(transaction_hash)
    }

    pub fn unlock_height_of(&self, transaction_hash: &TxHash) -> Option<u32> {
        self.by_hash.get(transaction_hash).copied()
    }

    pub fn enqueue(&mut self, job: UnlockJob) {
        if self.by_hash.contains_key(&job.transaction_hash) {
            return;
        }
        self.by_hash.insert(job.transaction_hash, job.unlock_height);
        self.by_height.entry(job.unlock_height).or_default().push(job);
    }

    pub fn dequeue_by_hash(&mut self, transaction_hash: &TxHash) -> Option<UnlockJob> {
        let height = self.by_hash.remove(transaction_hash)?;
        let jobs = self.by_height.get_mut(&height)?;
        let position = jobs
            .iter()
            .position(|job| job.transaction_hash == *transaction_hash)?;
        let job = jobs.remove(position);
        if jobs.is_empty() {
            self.by_height.remove(&height);
        }
        Some(job)
    }

    /// Drains every job with unlock height at or below `height`.
    pub fn flush_up_to(&mut self, height: u32) -> Vec<UnlockJob> {
        let due: Vec<u32> = self
            .by_height
            .range(..=height)
            .map(|(key, _)| *key)
            .collect();
        let mut flushed = Vec::new();
        for key in due {
            if let Some(jobs) = self.by_height.remove(&key) {
                for job in &jobs {
                    self.by_hash.remove(&job.transaction_hash);
                }
                flushed.extend(jobs);
            }
        }
        flushed
    }

    pub fn jobs(&self) -> Vec<UnlockJob> {
        self.by_height.values().flatten().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.by_height.clear();
        self.by_hash.clear();
    }
}
