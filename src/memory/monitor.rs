//! # Memory Monitoring and Low-Memory Fan-Out
//!
//! Two boundaries live here. [`MemoryMonitor`] answers "how many bytes are
//! available system-wide right now"; [`LowMemoryRegistry`] delivers
//! asynchronous low-memory notifications to every registered handler.
//!
//! The registry is an explicit collaborator passed at construction, not a
//! process-wide singleton. It holds handlers through `Weak` references:
//! deregistration is implicit in dropping the handler, and the registry
//! prunes dead entries on each sweep.
//!
//! ## Locking
//!
//! Notification sweeps upgrade the live handlers under a short read lock,
//! release it, and only then invoke the handlers. Handlers may block (a
//! low-memory sweep typically ends in a reclamation request), so they must
//! never run while the registry lock is held.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use sysinfo::System;
use tracing::debug;

/// System memory query boundary.
pub trait MemoryMonitor: Send + Sync {
    /// Bytes of memory currently available system-wide.
    fn available_bytes(&self) -> u64;
}

/// Production monitor backed by `sysinfo`. Each query refreshes the memory
/// statistics; callers are expected to query once per decision, not in a
/// tight loop.
pub struct SystemMemory {
    system: Mutex<System>,
}

impl SystemMemory {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMonitor for SystemMemory {
    fn available_bytes(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.available_memory()
    }
}

/// Monitor reporting a fixed, settable availability. Used by tests and by
/// embedders that meter memory themselves.
#[derive(Debug)]
pub struct FixedMemory {
    available: AtomicU64,
}

impl FixedMemory {
    pub fn new(available_bytes: u64) -> Self {
        Self {
            available: AtomicU64::new(available_bytes),
        }
    }

    pub fn set_available(&self, bytes: u64) {
        self.available.store(bytes, Ordering::Release);
    }
}

impl MemoryMonitor for FixedMemory {
    fn available_bytes(&self) -> u64 {
        self.available.load(Ordering::Acquire)
    }
}

/// Point-in-time report from a registered low-memory handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowMemoryHandlerStats {
    /// Engine name the handler belongs to.
    pub name: &'static str,
    /// Bytes currently attributed to the handler's in-flight operations.
    pub estimated_used_bytes: u64,
    /// The handler's current batch size.
    pub current_batch_size: usize,
}

/// A participant in low-memory sweeps.
pub trait LowMemoryHandler: Send + Sync {
    /// Memory is scarce; shed load now.
    fn handle_low_memory(&self);

    /// A gentler hint: release caches that can be rebuilt cheaply.
    fn soft_memory_release(&self) {}

    /// Report current footprint for diagnostics.
    fn stats(&self) -> LowMemoryHandlerStats;
}

/// Registry of low-memory handlers.
///
/// Lifetime matches the process (or whatever owns it); handlers come and
/// go. `register` stores a `Weak`, so the registry never keeps a handler
/// alive.
pub struct LowMemoryRegistry {
    handlers: RwLock<Vec<Weak<dyn LowMemoryHandler>>>,
}

impl LowMemoryRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, handler: Weak<dyn LowMemoryHandler>) {
        self.handlers.write().push(handler);
    }

    /// Notifies every live handler that memory is low. Returns the number
    /// of handlers notified. Dead entries are pruned.
    pub fn notify_low_memory(&self) -> usize {
        let live = self.upgrade_and_prune();
        debug!(handlers = live.len(), "low memory notification sweep");
        for handler in &live {
            handler.handle_low_memory();
        }
        live.len()
    }

    /// Asks every live handler to release soft state. Returns the number
    /// of handlers reached.
    pub fn soft_release_all(&self) -> usize {
        let live = self.upgrade_and_prune();
        for handler in &live {
            handler.soft_memory_release();
        }
        live.len()
    }

    /// Collects stats from every live handler.
    pub fn stats(&self) -> Vec<LowMemoryHandlerStats> {
        self.upgrade_and_prune()
            .iter()
            .map(|handler| handler.stats())
            .collect()
    }

    /// Number of currently live handlers.
    pub fn handler_count(&self) -> usize {
        self.upgrade_and_prune().len()
    }

    fn upgrade_and_prune(&self) -> Vec<Arc<dyn LowMemoryHandler>> {
        let (live, had_dead) = {
            let handlers = self.handlers.read();
            let live: Vec<_> = handlers.iter().filter_map(Weak::upgrade).collect();
            let had_dead = live.len() != handlers.len();
            (live, had_dead)
        };

        if had_dead {
            self.handlers
                .write()
                .retain(|handler| handler.strong_count() > 0);
        }

        live
    }
}

impl Default for LowMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}
