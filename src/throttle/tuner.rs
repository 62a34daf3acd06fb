//! # Batch-Size Tuner
//!
//! The feedback controller at the heart of background processing. After
//! every completed batch the owning engine reports what actually happened
//! (items processed, bytes touched, wall time), and the tuner decides the
//! size of the next batch.
//!
//! ## Evaluation Pipeline
//!
//! Exactly one of three branches acts per cycle, in this order:
//!
//! ```text
//! auto_throttle_batch_size(items, bytes, duration)
//!   │
//!   ├─ 1. ceiling guard      memory near the reserve threshold, or
//!   │                        in-flight usage over the safety limit?
//!   │                        reclaim (compacting), re-check, maybe halve
//!   │
//!   ├─ 2. consider decrease  starved AND slow batch, outside the grace
//!   │                        period, not floored, demand cooled off?
//!   │                        halve (plus optimized reclaim on big drops)
//!   │
//!   └─ 3. consider increase  full window of saturated batches, memory
//!                            headroom for 2x, projected latency in
//!                            budget? double, stamp the grace period
//! ```
//!
//! The batch's item count is recorded into the history window on every
//! exit path, including early returns; a drop guard owns that write.
//!
//! ## Locking
//!
//! One mutex serializes the whole evaluation, and the low-memory and
//! out-of-memory hooks take the same mutex. Reclamation runs inside the
//! critical section on purpose: a sizing decision based on pre-reclaim
//! numbers would be stale the moment it was made. The deliberate cost is
//! that a slow reclaimer stalls the next evaluation, never that two
//! evaluations interleave.
//!
//! Reads that the engine performs per cycle (`current_batch_size`,
//! gauges, usage totals) are plain atomic loads and never queue behind an
//! in-flight evaluation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use eyre::{bail, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{
    BYTES_PER_MB, DEFAULT_INITIAL_BATCH_SIZE, DEFAULT_INITIAL_REPLICATION_BATCH_SIZE,
    DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_REPLICATION_BATCH_SIZE, FETCH_RESERVE_FACTOR,
    INCREASE_GRACE_PERIOD, INDEXING_COST_FACTOR, INITIAL_REMEMBERED_HISTORY,
    LATENCY_PROJECTION_FACTOR, MIN_FETCH_MB, SIGNIFICANT_REDUCTION_ITEMS,
    USAGE_SAFETY_MULTIPLIER,
};
use crate::memory::{
    LowMemoryHandler, LowMemoryHandlerStats, LowMemoryRegistry, MemoryMonitor, NoopReclaimer,
    ReclaimMode, ReclamationTrigger, SystemMemory, UsageTracker,
};

use super::{EngineGauges, HistoryWindow, ThrottleConfig};

/// Per-engine capability: the values that differ between consuming
/// engines. The control algorithm itself has no variants.
#[derive(Debug, Clone)]
pub struct EngineProfile {
    /// Engine name, used in gauges, stats, and log events.
    pub name: &'static str,
    /// Batch size the engine starts at and shrinks back to.
    pub initial_batch_size: usize,
    /// Hard ceiling on the batch size.
    pub max_batch_size: usize,
}

impl EngineProfile {
    /// Profile for the document indexing engine.
    pub fn indexing() -> Self {
        Self {
            name: "indexing",
            initial_batch_size: DEFAULT_INITIAL_BATCH_SIZE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    /// Profile for replication consumers. Replication batches carry full
    /// document tuples plus destination bookkeeping, so they run at half
    /// the indexing scale.
    pub fn replication() -> Self {
        Self {
            name: "replication",
            initial_batch_size: DEFAULT_INITIAL_REPLICATION_BATCH_SIZE,
            max_batch_size: DEFAULT_MAX_REPLICATION_BATCH_SIZE,
        }
    }

    pub fn custom(name: &'static str, initial_batch_size: usize, max_batch_size: usize) -> Self {
        Self {
            name,
            initial_batch_size,
            max_batch_size,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.initial_batch_size == 0 {
            bail!("initial_batch_size must be at least 1");
        }
        if self.max_batch_size < self.initial_batch_size {
            bail!(
                "max_batch_size {} is below initial_batch_size {}",
                self.max_batch_size,
                self.initial_batch_size
            );
        }
        Ok(())
    }
}

/// State mutated only under the evaluation lock.
struct TunerState {
    last_increase: Option<Instant>,
    history: HistoryWindow,
}

/// Records the batch's item count when evaluation leaves scope, no
/// matter which branch fired.
struct RecordOnExit<'a> {
    history: &'a mut HistoryWindow,
    gauges: &'a EngineGauges,
    items: usize,
}

impl Drop for RecordOnExit<'_> {
    fn drop(&mut self) {
        self.history.record(self.items);
        self.gauges.set_last_batch_items(self.items);
    }
}

/// Adaptive batch-size controller for one background processing engine.
///
/// Create via [`BatchSizeTuner::builder`]. The tuner registers itself
/// with the low-memory registry it is given; because the registry holds
/// it weakly, dropping the tuner is all the deregistration needed.
pub struct BatchSizeTuner {
    profile: EngineProfile,
    config: ThrottleConfig,
    memory: Arc<dyn MemoryMonitor>,
    reclaimer: Arc<dyn ReclamationTrigger>,
    clock: Arc<dyn Clock>,
    active_units: AtomicUsize,
    usage: UsageTracker,
    gauges: Arc<EngineGauges>,
    current: AtomicUsize,
    state: Mutex<TunerState>,
}

impl BatchSizeTuner {
    pub fn builder(profile: EngineProfile) -> TunerBuilder {
        TunerBuilder::new(profile)
    }

    /// The batch size the engine should use for its next cycle.
    pub fn current_batch_size(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    /// Byte accounting for in-flight operations. Register before an
    /// operation starts holding memory, deregister when it completes.
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Lock-free mirror of the tuner's published state.
    pub fn gauges(&self) -> Arc<EngineGauges> {
        Arc::clone(&self.gauges)
    }

    pub fn profile(&self) -> &EngineProfile {
        &self.profile
    }

    /// Timeout the fetch layer should apply when pulling documents from
    /// storage.
    pub fn fetch_timeout(&self) -> Duration {
        self.config.fetch_timeout
    }

    /// Updates the number of currently active indexable units. Feeds the
    /// growth cost estimate; only `max_parallel_tasks` of them are
    /// costed, since only that many run at once.
    pub fn set_active_units(&self, count: usize) {
        self.active_units.store(count, Ordering::Release);
    }

    /// True when tracked in-flight usage, scaled by the peak-overhead
    /// multiplier, exceeds the dynamic memory limit.
    pub fn is_processing_over_limit(&self) -> bool {
        self.usage
            .total_bytes()
            .saturating_mul(USAGE_SAFETY_MULTIPLIER)
            > self.config.dynamic_memory_limit
    }

    /// Upper bound in bytes on the raw data the fetch layer should load
    /// for the next batch. Purely memory-derived; independent of the
    /// item-count throttle.
    pub fn maximum_fetch_size_bytes(&self) -> u64 {
        // The fetched bytes are only the on-disk data; keep extra
        // headroom free for the cost of processing them.
        let reserve_mb =
            self.config.reserve_threshold as f64 / BYTES_PER_MB as f64 * FETCH_RESERVE_FACTOR;
        let available_mb = self.memory.available_bytes() as f64 / BYTES_PER_MB as f64;
        let cap_mb =
            (self.config.max_fetch_mb as f64).min((available_mb - reserve_mb).max(MIN_FETCH_MB as f64));
        cap_mb as u64 * BYTES_PER_MB
    }

    /// Per-batch evaluation. Call exactly once per completed batch, from
    /// any thread; evaluations are serialized internally.
    ///
    /// `items_processed` is recorded into the history window before this
    /// returns, whichever branch fires.
    pub fn auto_throttle_batch_size(
        &self,
        items_processed: usize,
        bytes_processed: u64,
        duration: Duration,
    ) {
        let mut state = self.state.lock();
        let state = &mut *state;
        let record = RecordOnExit {
            history: &mut state.history,
            gauges: &*self.gauges,
            items: items_processed,
        };

        if self.reduce_if_close_to_memory_ceiling(false) {
            return;
        }
        if self.consider_decreasing(
            items_processed,
            duration,
            state.last_increase,
            &*record.history,
        ) {
            return;
        }
        if self.consider_increasing(items_processed, bytes_processed, duration, &*record.history) {
            state.last_increase = Some(self.clock.now());
        }
    }

    /// Asynchronous low-memory notification. Forces the ceiling guard:
    /// reclamation plus an unconditional reduction. Safe to call
    /// concurrently with per-batch evaluation; both serialize on the
    /// same lock.
    pub fn handle_low_memory(&self) {
        let _state = self.state.lock();
        self.reduce_if_close_to_memory_ceiling(true);
    }

    /// Emergency downshift after an out-of-memory event. Resets the
    /// batch size to a fraction of the configured floor and doubles the
    /// remembered history length, so future growth needs a longer run of
    /// saturated batches.
    pub fn handle_out_of_memory(&self) {
        let mut state = self.state.lock();
        let current = self.current_batch_size();

        let mut emergency = self.profile.initial_batch_size.min(current);
        if self.is_processing_over_limit() {
            emergency /= 4;
        } else {
            emergency /= 2;
        }
        let emergency = emergency.max(1);
        self.set_batch_size(emergency);

        let remembered = state.history.grow();
        self.gauges.set_remembered_history(remembered);

        warn!(
            engine = self.profile.name,
            old = current,
            new = emergency,
            remembered,
            "out of memory, emergency batch size downshift"
        );
    }

    /// Diagnostic snapshot of this tuner.
    pub fn stats(&self) -> LowMemoryHandlerStats {
        LowMemoryHandlerStats {
            name: self.profile.name,
            estimated_used_bytes: self.usage.total_bytes(),
            current_batch_size: self.current_batch_size(),
        }
    }

    /// Ceiling guard. Caller must hold the evaluation lock. Returns true
    /// if it acted (evaluation stops for this cycle).
    fn reduce_if_close_to_memory_ceiling(&self, forced: bool) -> bool {
        let available = self.memory.available_bytes();
        if available >= self.config.reserve_threshold
            && !forced
            && !self.is_processing_over_limit()
        {
            return false;
        }

        // Blocking and possibly slow; an accepted stall. The re-check
        // below must see post-reclamation numbers.
        warn!(
            engine = self.profile.name,
            available, forced, "near memory ceiling, requesting compacting reclamation"
        );
        self.reclaimer.reclaim(ReclaimMode::Compacting, None);

        if self.memory.available_bytes() > self.config.reserve_threshold && !forced {
            // Reclamation freed enough; keep the size for one more cycle.
            return true;
        }

        let current = self.current_batch_size();
        let reduced = self.reduced_batch_size(current);
        self.set_batch_size(reduced);
        warn!(
            engine = self.profile.name,
            old = current,
            new = reduced,
            "reduced batch size near memory ceiling"
        );
        true
    }

    /// Decrease branch. Returns true if evaluation should stop, whether
    /// or not the size changed.
    fn consider_decreasing(
        &self,
        items_processed: usize,
        duration: Duration,
        last_increase: Option<Instant>,
        history: &HistoryWindow,
    ) -> bool {
        let current = self.current_batch_size();
        let over_limit = self.is_processing_over_limit();

        // Oversized memory use always forces a cut; the demand heuristics
        // below only apply while usage is in bounds.
        if !over_limit {
            if items_processed >= current || duration < self.config.max_processing_latency {
                return false;
            }

            if let Some(last) = last_increase {
                if self.clock.now().saturating_duration_since(last) < INCREASE_GRACE_PERIOD {
                    return true;
                }
            }

            if current == self.profile.initial_batch_size {
                return true;
            }

            if history.any_above(current / 2) {
                return true;
            }
        }

        let reduced = self.reduced_batch_size(current);
        self.set_batch_size(reduced);
        debug!(
            engine = self.profile.name,
            old = current,
            new = reduced,
            over_limit,
            "lowered batch size after idle cycle"
        );

        // A routine taper this large leaves a lot of garbage behind;
        // hint the reclaimer without forcing a compaction.
        if current.saturating_sub(reduced) > SIGNIFICANT_REDUCTION_ITEMS {
            self.reclaimer.reclaim(ReclaimMode::Optimized, None);
        }

        true
    }

    /// Increase branch. Returns true if the size was raised; the caller
    /// stamps the grace period.
    fn consider_increasing(
        &self,
        items_processed: usize,
        bytes_processed: u64,
        duration: Duration,
        history: &HistoryWindow,
    ) -> bool {
        let current = self.current_batch_size();

        if items_processed < current
            || self.usage.total_bytes() > self.config.dynamic_memory_limit
        {
            return false;
        }

        // One saturated batch can be luck. Grow only once the whole
        // remembered window ran saturated.
        if !history.is_full() || history.any_below(current) {
            return false;
        }

        // Estimate what doubling costs: the raw bytes again, plus the
        // in-memory indexing overhead per active unit, capped by how many
        // units actually run concurrently.
        let batch_mb = bytes_processed as f64 / BYTES_PER_MB as f64;
        let costed_units = self
            .active_units
            .load(Ordering::Acquire)
            .min(self.config.max_parallel_tasks);
        let batch_plus_indexing_mb = batch_mb * (1.0 + INDEXING_COST_FACTOR * costed_units as f64);

        let available_mb = self.memory.available_bytes() as f64 / BYTES_PER_MB as f64;
        let reserve_mb = self.config.reserve_threshold as f64 / BYTES_PER_MB as f64;
        if available_mb - batch_plus_indexing_mb < reserve_mb {
            return false;
        }

        let projected = duration.mul_f64(LATENCY_PROJECTION_FACTOR);
        if projected > self.config.max_processing_latency {
            return false;
        }

        let raised = current
            .saturating_mul(2)
            .min(self.profile.max_batch_size);
        self.set_batch_size(raised);
        debug!(
            engine = self.profile.name,
            old = current,
            new = raised,
            "raised batch size after sustained saturation"
        );
        true
    }

    /// Halves the current size, floored at the initial size, or a quarter
    /// of it when usage is over the limit (very large documents may need
    /// the batch to shrink well below its normal floor).
    fn reduced_batch_size(&self, current: usize) -> usize {
        let mut floor = self.profile.initial_batch_size;
        if self.is_processing_over_limit() {
            floor /= 4;
        }
        // An emergency downshift may leave the size below the floor; a
        // reduction must never raise it back.
        floor.max(current / 2).min(current).max(1)
    }

    fn set_batch_size(&self, size: usize) {
        let clamped = size.clamp(1, self.profile.max_batch_size);
        self.current.store(clamped, Ordering::Release);
        self.gauges.set_current_batch_size(clamped);
    }
}

impl LowMemoryHandler for BatchSizeTuner {
    fn handle_low_memory(&self) {
        BatchSizeTuner::handle_low_memory(self);
    }

    fn stats(&self) -> LowMemoryHandlerStats {
        BatchSizeTuner::stats(self)
    }
}

/// Builder for [`BatchSizeTuner`].
///
/// Collaborators default to production implementations (`SystemMemory`,
/// `NoopReclaimer`, `SystemClock`, no registry); tests and embedders
/// override what they need.
pub struct TunerBuilder {
    profile: EngineProfile,
    config: ThrottleConfig,
    memory: Option<Arc<dyn MemoryMonitor>>,
    reclaimer: Option<Arc<dyn ReclamationTrigger>>,
    clock: Option<Arc<dyn Clock>>,
    registry: Option<Arc<LowMemoryRegistry>>,
}

impl TunerBuilder {
    pub fn new(profile: EngineProfile) -> Self {
        Self {
            profile,
            config: ThrottleConfig::default(),
            memory: None,
            reclaimer: None,
            clock: None,
            registry: None,
        }
    }

    pub fn config(mut self, config: ThrottleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn memory(mut self, memory: Arc<dyn MemoryMonitor>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn reclaimer(mut self, reclaimer: Arc<dyn ReclamationTrigger>) -> Self {
        self.reclaimer = Some(reclaimer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Registers the built tuner with `registry` for low-memory
    /// notifications. The registry holds it weakly.
    pub fn registry(mut self, registry: Arc<LowMemoryRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validates the configuration and builds the tuner.
    pub fn build(self) -> Result<Arc<BatchSizeTuner>> {
        self.profile.validate()?;
        self.config.validate()?;

        let initial = self.profile.initial_batch_size;
        let gauges = Arc::new(EngineGauges::new(initial, INITIAL_REMEMBERED_HISTORY));

        let tuner = Arc::new(BatchSizeTuner {
            profile: self.profile,
            config: self.config,
            memory: self.memory.unwrap_or_else(|| Arc::new(SystemMemory::new())),
            reclaimer: self.reclaimer.unwrap_or_else(|| Arc::new(NoopReclaimer)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            active_units: AtomicUsize::new(0),
            usage: UsageTracker::new(),
            gauges,
            current: AtomicUsize::new(initial),
            state: Mutex::new(TunerState {
                last_increase: None,
                history: HistoryWindow::new(INITIAL_REMEMBERED_HISTORY),
            }),
        });

        if let Some(registry) = self.registry {
            registry.register(Arc::downgrade(&tuner) as Weak<dyn LowMemoryHandler>);
        }

        Ok(tuner)
    }
}
