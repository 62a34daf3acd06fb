//! # Memory Cooperation
//!
//! This module holds everything the batch-size controller needs to know
//! about memory without owning any of it:
//!
//! - [`UsageTracker`]: sharded accounting of bytes held by in-flight
//!   processing operations, with an O(1) aggregate sum.
//! - [`MemoryMonitor`]: the system-memory query boundary, with a
//!   `sysinfo`-backed production implementation and a fixed-value
//!   implementation for deterministic tests.
//! - [`LowMemoryRegistry`]: explicit fan-out of low-memory notifications
//!   to registered handlers. Handlers are held weakly: a dropped tuner
//!   becomes inert instead of a dangling callback target.
//! - [`ReclamationTrigger`]: the blocking, best-effort reclamation request
//!   boundary with its compacting/optimized mode split.
//!
//! None of these components decide anything; policy lives in
//! [`crate::throttle`].

mod monitor;
mod reclaim;
mod usage;

pub use monitor::{
    FixedMemory, LowMemoryHandler, LowMemoryHandlerStats, LowMemoryRegistry, MemoryMonitor,
    SystemMemory,
};
pub use reclaim::{NoopReclaimer, ReclaimMode, ReclamationTrigger};
pub use usage::UsageTracker;
