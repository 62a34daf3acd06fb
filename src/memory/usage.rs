//! # In-Flight Usage Tracking
//!
//! Every concurrent processing operation registers the bytes it currently
//! holds under its operation id, updates that figure as it goes, and
//! deregisters on completion. The tuner consults only the aggregate sum,
//! so the tracker maintains a running total in a single atomic: the hot
//! query is one load, never a map walk.
//!
//! ## Sharding
//!
//! Registrations from many worker threads must not contend with each other
//! or with batch evaluation. The map is split into [`USAGE_SHARD_COUNT`]
//! shards, each behind its own `RwLock`; an operation id hashes to one
//! shard. The running total is adjusted while the owning shard's write
//! lock is held, so per-key add/remove pairs cannot underflow it.
//!
//! The aggregate is an estimate by design: callers report their own
//! footprint, and the total lags individual updates by a lock handoff.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::config::USAGE_SHARD_COUNT;

/// Concurrent map of in-flight operation id to bytes held.
pub struct UsageTracker {
    shards: Vec<RwLock<HashMap<Uuid, u64>>>,
    total_bytes: AtomicU64,
}

impl UsageTracker {
    pub fn new() -> Self {
        let shards = (0..USAGE_SHARD_COUNT)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self {
            shards,
            total_bytes: AtomicU64::new(0),
        }
    }

    fn shard(&self, operation: Uuid) -> &RwLock<HashMap<Uuid, u64>> {
        let index = (operation.as_u128() % self.shards.len() as u128) as usize;
        &self.shards[index]
    }

    /// Registers or updates the bytes held by `operation`.
    pub fn register(&self, operation: Uuid, bytes: u64) {
        let mut shard = self.shard(operation).write();
        match shard.insert(operation, bytes) {
            Some(previous) if previous <= bytes => {
                self.total_bytes
                    .fetch_add(bytes - previous, Ordering::AcqRel);
            }
            Some(previous) => {
                self.total_bytes
                    .fetch_sub(previous - bytes, Ordering::AcqRel);
            }
            None => {
                self.total_bytes.fetch_add(bytes, Ordering::AcqRel);
            }
        }
    }

    /// Removes `operation` from the tracker. Returns the bytes it held,
    /// or `None` if it was not registered.
    pub fn deregister(&self, operation: Uuid) -> Option<u64> {
        let mut shard = self.shard(operation).write();
        let removed = shard.remove(&operation);
        if let Some(bytes) = removed {
            self.total_bytes.fetch_sub(bytes, Ordering::AcqRel);
        }
        removed
    }

    /// Aggregate bytes across all in-flight operations. One atomic load.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Acquire)
    }

    /// Number of in-flight operations currently registered.
    pub fn operation_count(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.operation_count() == 0
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}
