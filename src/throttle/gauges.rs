//! # Published Engine Gauges
//!
//! The embedding engine reads sizing state far more often than the tuner
//! changes it: before every fetch, in stats endpoints, in log lines. The
//! gauges mirror that state into atomics so readers never touch the
//! evaluation lock.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free mirror of the tuner's externally interesting state.
#[derive(Debug)]
pub struct EngineGauges {
    current_batch_size: AtomicUsize,
    last_batch_items: AtomicUsize,
    remembered_history: AtomicUsize,
}

impl EngineGauges {
    pub(crate) fn new(initial_batch_size: usize, remembered_history: usize) -> Self {
        Self {
            current_batch_size: AtomicUsize::new(initial_batch_size),
            last_batch_items: AtomicUsize::new(0),
            remembered_history: AtomicUsize::new(remembered_history),
        }
    }

    /// The batch size the engine should use for its next cycle.
    pub fn current_batch_size(&self) -> usize {
        self.current_batch_size.load(Ordering::Acquire)
    }

    /// Item count of the most recently completed batch.
    pub fn last_batch_items(&self) -> usize {
        self.last_batch_items.load(Ordering::Acquire)
    }

    /// Current remembered history length.
    pub fn remembered_history(&self) -> usize {
        self.remembered_history.load(Ordering::Acquire)
    }

    pub(crate) fn set_current_batch_size(&self, size: usize) {
        self.current_batch_size.store(size, Ordering::Release);
    }

    pub(crate) fn set_last_batch_items(&self, items: usize) {
        self.last_batch_items.store(items, Ordering::Release);
    }

    pub(crate) fn set_remembered_history(&self, length: usize) {
        self.remembered_history.store(length, Ordering::Release);
    }
}
