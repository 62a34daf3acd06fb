//! # Throttle Constants
//!
//! All tuning constants for the batch-size controller, co-located so that
//! interdependent values cannot drift apart. Constants that depend on each
//! other are grouped together and checked with compile-time assertions.
//!
//! ## Dependency Graph
//!
//! ```text
//! DEFAULT_INITIAL_BATCH_SIZE (512)
//!       │
//!       ├─> DEFAULT_MAX_BATCH_SIZE (must be >=)
//!       │
//!       └─> DEFAULT_INITIAL_REPLICATION_BATCH_SIZE (half of indexing)
//!             Replication batches carry full document tuples plus
//!             destination bookkeeping, so they start and cap lower.
//!
//! MIN_FETCH_MB (8)
//!       │
//!       └─> DEFAULT_MAX_FETCH_MB (must be >=)
//!             The fetch cap formula floors at MIN_FETCH_MB; a configured
//!             maximum below the floor would invert the clamp.
//!
//! USAGE_SAFETY_MULTIPLIER (4)
//!       │
//!       └─> tracked bytes × 4 is compared against the dynamic memory
//!           limit. Tracked bytes are a steady-state estimate; the
//!           multiplier covers peak transient overhead during processing.
//! ```
//!
//! ## Empirical Values
//!
//! The following were tuned against production indexing workloads and are
//! load-bearing. Do not adjust them without re-running those measurements:
//!
//! - `INDEXING_COST_FACTOR` (0.25): estimated in-memory indexing cost per
//!   active processing unit, as a fraction of the on-disk batch size.
//! - `FETCH_RESERVE_FACTOR` (1.33): extra headroom kept free when sizing
//!   raw fetches, covering the indexing cost on top of the fetched data.
//! - `LATENCY_PROJECTION_FACTOR` (1.75): projected duration of the next
//!   batch relative to the current one when the batch size doubles.
//! - `USAGE_SAFETY_MULTIPLIER` (4): peak-to-tracked memory ratio.
//! - `SIGNIFICANT_REDUCTION_ITEMS` (4096): reduction magnitude above which
//!   a taper is large enough to also hint the reclaimer.
//! - `INCREASE_GRACE_PERIOD` (3 minutes): cooldown after growth during
//!   which decreases are held.

use std::time::Duration;

// ============================================================================
// UNITS
// ============================================================================

/// Bytes per megabyte; the fetch cap and cost estimates work in MB.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

// ============================================================================
// BATCH SIZE DEFAULTS
// Per-engine profiles start from these; replication runs at half scale.
// ============================================================================

/// Default starting batch size for the indexing engine.
pub const DEFAULT_INITIAL_BATCH_SIZE: usize = 512;

/// Default ceiling for the indexing engine's batch size.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 128 * 1024;

/// Default starting batch size for replication consumers.
pub const DEFAULT_INITIAL_REPLICATION_BATCH_SIZE: usize = DEFAULT_INITIAL_BATCH_SIZE / 2;

/// Default ceiling for replication consumers.
pub const DEFAULT_MAX_REPLICATION_BATCH_SIZE: usize = DEFAULT_MAX_BATCH_SIZE / 2;

const _: () = assert!(
    DEFAULT_INITIAL_BATCH_SIZE <= DEFAULT_MAX_BATCH_SIZE,
    "initial batch size must not exceed the maximum"
);

const _: () = assert!(
    DEFAULT_INITIAL_REPLICATION_BATCH_SIZE <= DEFAULT_MAX_REPLICATION_BATCH_SIZE,
    "replication initial batch size must not exceed the replication maximum"
);

// ============================================================================
// CONTROLLER BEHAVIOR
// Empirical values; see module docs before touching any of these.
// ============================================================================

/// Estimated indexing cost per concurrently active processing unit, as a
/// fraction of the raw batch bytes. Capped by the parallelism limit since
/// only that many units execute at once.
pub const INDEXING_COST_FACTOR: f64 = 0.25;

/// Projected duration of the next batch relative to the current one when
/// the batch size doubles.
pub const LATENCY_PROJECTION_FACTOR: f64 = 1.75;

/// Tracked usage is multiplied by this before comparison against the
/// dynamic memory limit. Covers peak transient overhead beyond the tracked
/// steady-state footprint.
pub const USAGE_SAFETY_MULTIPLIER: u64 = 4;

/// Reduction magnitude (in items) above which a routine workload taper
/// additionally requests an optimized reclamation pass.
pub const SIGNIFICANT_REDUCTION_ITEMS: usize = 4096;

/// Cooldown after a successful increase during which decrease decisions
/// are held.
pub const INCREASE_GRACE_PERIOD: Duration = Duration::from_secs(3 * 60);

/// Starting length of the remembered batch history. Doubles on each
/// out-of-memory event and never shrinks.
pub const INITIAL_REMEMBERED_HISTORY: usize = 1;

const _: () = assert!(SIGNIFICANT_REDUCTION_ITEMS > 0);
const _: () = assert!(INITIAL_REMEMBERED_HISTORY >= 1);

// ============================================================================
// FETCH CAP
// ============================================================================

/// Extra headroom multiplier applied to the reserve threshold when sizing
/// raw fetches. The fetched bytes are only the on-disk data; processing
/// them costs more.
pub const FETCH_RESERVE_FACTOR: f64 = 1.33;

/// Floor of the fetch cap in megabytes. Even under heavy pressure a fetch
/// of this size is allowed so the engine keeps making progress.
pub const MIN_FETCH_MB: u64 = 8;

/// Default maximum raw fetch size in megabytes.
pub const DEFAULT_MAX_FETCH_MB: u64 = 256;

const _: () = assert!(
    MIN_FETCH_MB <= DEFAULT_MAX_FETCH_MB,
    "fetch floor must not exceed the default fetch maximum"
);

// ============================================================================
// MEMORY THRESHOLDS
// ============================================================================

/// Default dynamic memory limit for in-flight processing, in bytes.
pub const DEFAULT_DYNAMIC_MEMORY_LIMIT: u64 = 1024 * BYTES_PER_MB;

/// Default reserve threshold in bytes: the minimum system memory that must
/// remain available before batch sizes may be raised.
pub const DEFAULT_RESERVE_THRESHOLD: u64 = 768 * BYTES_PER_MB;

// ============================================================================
// LATENCY AND FETCH TIMING
// ============================================================================

/// Default upper bound on a single processing run's duration.
pub const DEFAULT_MAX_PROCESSING_LATENCY: Duration = Duration::from_secs(5);

/// Default timeout for fetching documents from storage.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// USAGE TRACKER SHARDING
// ============================================================================

/// Number of independent shards in the usage tracker. Operations hash to a
/// shard by id, so concurrent registrations rarely contend.
pub const USAGE_SHARD_COUNT: usize = 16;

const _: () = assert!(USAGE_SHARD_COUNT > 0);
