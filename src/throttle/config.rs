//! # Throttle Runtime Configuration
//!
//! Engine-independent limits consumed by the tuner: memory thresholds,
//! latency budget, fetch sizing, and parallelism. Per-engine values
//! (initial and maximum batch size) live in
//! [`EngineProfile`](super::EngineProfile) instead.
//!
//! Configuration is validated when a tuner is built; a config that cannot
//! produce sane sizing decisions is rejected up front.

use std::thread;
use std::time::Duration;

use eyre::{bail, Result};

use crate::config::{
    DEFAULT_DYNAMIC_MEMORY_LIMIT, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_FETCH_MB,
    DEFAULT_MAX_PROCESSING_LATENCY, DEFAULT_RESERVE_THRESHOLD, MIN_FETCH_MB,
};

/// Runtime limits for batch-size control.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Timeout for fetching documents from storage.
    pub fetch_timeout: Duration,
    /// Maximum raw fetch size in megabytes.
    pub max_fetch_mb: u64,
    /// Total bytes in-flight processing may hold before sizing turns
    /// defensive.
    pub dynamic_memory_limit: u64,
    /// Minimum available system memory (bytes) required before batch
    /// sizes may be raised.
    pub reserve_threshold: u64,
    /// Upper bound on concurrently executing processing tasks.
    pub max_parallel_tasks: usize,
    /// Upper bound on a single processing run's duration.
    pub max_processing_latency: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_fetch_mb: DEFAULT_MAX_FETCH_MB,
            dynamic_memory_limit: DEFAULT_DYNAMIC_MEMORY_LIMIT,
            reserve_threshold: DEFAULT_RESERVE_THRESHOLD,
            max_parallel_tasks: thread::available_parallelism()
                .map(|parallelism| parallelism.get())
                .unwrap_or(1),
            max_processing_latency: DEFAULT_MAX_PROCESSING_LATENCY,
        }
    }
}

impl ThrottleConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_fetch_mb < MIN_FETCH_MB {
            bail!(
                "max_fetch_mb {} is below the fetch floor of {} MB",
                self.max_fetch_mb,
                MIN_FETCH_MB
            );
        }
        if self.dynamic_memory_limit == 0 {
            bail!("dynamic_memory_limit must be non-zero");
        }
        if self.max_parallel_tasks == 0 {
            bail!("max_parallel_tasks must be at least 1");
        }
        if self.max_processing_latency.is_zero() {
            bail!("max_processing_latency must be non-zero");
        }
        Ok(())
    }
}
