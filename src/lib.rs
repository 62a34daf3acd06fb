//! # VellumDB Batch Throttle Core
//!
//! VellumDB is a document-oriented storage engine. Its background processing
//! engines (indexers, replication consumers) pull documents in batches, and
//! after every completed batch they must decide how many items the next batch
//! should admit. This crate implements that decision: a stateful feedback
//! controller that balances throughput against a dynamic memory budget and a
//! configured per-batch latency ceiling.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │        Background Engine (indexing, repl)        │
//! │   completes batch: (items, bytes, duration)      │
//! └───────────────────────┬─────────────────────────┘
//!                         │ auto_throttle_batch_size()
//! ┌───────────────────────▼─────────────────────────┐
//! │              BatchSizeTuner                      │
//! │  1. ceiling guard   (memory pressure)            │
//! │  2. consider decrease                            │
//! │  3. consider increase                            │
//! │  history recorded on every exit path             │
//! ├──────────┬──────────────┬───────────────────────┤
//! │ Usage    │ History      │ Memory / Reclamation  │
//! │ Tracker  │ Window       │ boundaries            │
//! └──────────┴──────────────┴───────────────────────┘
//! ```
//!
//! The per-batch evaluation runs under a single exclusive lock; the
//! low-memory and out-of-memory hooks serialize through the same lock. The
//! usage tracker is sharded and never takes the evaluation lock, so in-flight
//! operations can report their footprint without stalling sizing decisions.
//!
//! ## Quick Start
//!
//! ```ignore
//! use vellumdb::{BatchSizeTuner, EngineProfile, LowMemoryRegistry};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(LowMemoryRegistry::new());
//! let tuner = BatchSizeTuner::builder(EngineProfile::indexing())
//!     .registry(Arc::clone(&registry))
//!     .build()?;
//!
//! loop {
//!     let batch_size = tuner.current_batch_size();
//!     let fetch_cap = tuner.maximum_fetch_size_bytes();
//!     // fetch up to `batch_size` documents, at most `fetch_cap` bytes ...
//!     tuner.auto_throttle_batch_size(items, bytes, elapsed);
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`throttle`]: the tuner, its history window, and published gauges
//! - [`memory`]: usage tracking, memory monitoring, low-memory fan-out,
//!   reclamation trigger boundary
//! - [`config`]: tuning constants and their interdependencies
//! - [`clock`]: injectable monotonic time source

pub mod clock;
pub mod config;
pub mod memory;
pub mod throttle;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::{
    FixedMemory, LowMemoryHandler, LowMemoryHandlerStats, LowMemoryRegistry, MemoryMonitor,
    NoopReclaimer, ReclaimMode, ReclamationTrigger, SystemMemory, UsageTracker,
};
pub use throttle::{BatchSizeTuner, EngineGauges, EngineProfile, ThrottleConfig, TunerBuilder};
