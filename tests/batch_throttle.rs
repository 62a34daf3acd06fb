//! # Batch Throttle Integration Tests
//!
//! End-to-end tests of the batch-size controller through its public
//! surface, with injected memory, clock, and reclaimer collaborators.
//!
//! ## Test Coverage
//!
//! 1. Size invariant
//!    - Batch size stays within [1, max] across mixed call sequences
//!
//! 2. Growth discipline
//!    - Single saturated batch holds; second one doubles
//!    - Grace period blocks decreases after growth
//!
//! 3. Shrink discipline
//!    - Starved slow batches halve down to the floor
//!
//! 4. Emergencies
//!    - Low-memory notifications never raise the size
//!    - Out-of-memory downshifts and doubles the remembered history
//!    - Remembered history never decreases
//!
//! 5. Fetch cap
//!    - Bounded between the 8 MB floor and the configured maximum
//!
//! 6. Concurrency
//!    - Parallel evaluations, usage traffic, and low-memory sweeps keep
//!      the invariant

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use uuid::Uuid;
use vellumdb::{
    BatchSizeTuner, Clock, EngineProfile, FixedMemory, LowMemoryRegistry, ManualClock,
    MemoryMonitor, ReclaimMode, ReclamationTrigger, ThrottleConfig,
};

const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * MB;

struct SilentReclaimer;

impl ReclamationTrigger for SilentReclaimer {
    fn reclaim(&self, _mode: ReclaimMode, after: Option<Box<dyn FnOnce() + Send>>) {
        if let Some(after) = after {
            after();
        }
    }
}

struct Fixture {
    tuner: Arc<BatchSizeTuner>,
    memory: Arc<FixedMemory>,
    clock: Arc<ManualClock>,
    registry: Arc<LowMemoryRegistry>,
}

fn fixture(initial: usize, max: usize) -> Fixture {
    fixture_with_config(initial, max, test_config())
}

fn fixture_with_config(initial: usize, max: usize, config: ThrottleConfig) -> Fixture {
    let memory = Arc::new(FixedMemory::new(16 * GB));
    let clock = Arc::new(ManualClock::new());
    let registry = Arc::new(LowMemoryRegistry::new());

    let tuner = BatchSizeTuner::builder(EngineProfile::custom("test", initial, max))
        .config(config)
        .memory(Arc::clone(&memory) as Arc<dyn MemoryMonitor>)
        .clock(Arc::clone(&clock) as Arc<dyn Clock>)
        .reclaimer(Arc::new(SilentReclaimer) as Arc<dyn ReclamationTrigger>)
        .registry(Arc::clone(&registry))
        .build()
        .unwrap();

    Fixture {
        tuner,
        memory,
        clock,
        registry,
    }
}

fn test_config() -> ThrottleConfig {
    ThrottleConfig {
        fetch_timeout: Duration::from_secs(5),
        max_fetch_mb: 256,
        dynamic_memory_limit: GB,
        reserve_threshold: 768 * MB,
        max_parallel_tasks: 4,
        max_processing_latency: Duration::from_secs(5),
    }
}

fn saturated_batch(tuner: &BatchSizeTuner) {
    tuner.auto_throttle_batch_size(tuner.current_batch_size(), MB, Duration::from_millis(10));
}

fn grow_to(fixture: &Fixture, target: usize) {
    for _ in 0..64 {
        if fixture.tuner.current_batch_size() >= target {
            return;
        }
        saturated_batch(&fixture.tuner);
    }
    panic!(
        "could not grow to {}, stuck at {}",
        target,
        fixture.tuner.current_batch_size()
    );
}

// ============================================================================
// Size Invariant
// ============================================================================

#[test]
fn test_batch_size_stays_in_bounds_across_mixed_sequence() {
    let f = fixture(1024, 16384);
    let max = 16384;

    // Deterministic pseudo-random mix of saturated, starved, fast, and
    // slow batches interleaved with emergencies.
    let mut seed: u64 = 0x9E3779B97F4A7C15;
    for round in 0..200 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);

        let current = f.tuner.current_batch_size();
        assert!(current >= 1 && current <= max, "round {round}: {current}");

        let items = (seed % (2 * max as u64)) as usize;
        let duration = if seed & 1 == 0 {
            Duration::from_millis(10)
        } else {
            Duration::from_secs(10)
        };
        f.tuner
            .auto_throttle_batch_size(items.min(current), MB, duration);

        match seed % 13 {
            0 => f.tuner.handle_low_memory(),
            1 => f.tuner.handle_out_of_memory(),
            2 => f.clock.advance(Duration::from_secs(200)),
            _ => {}
        }

        let current = f.tuner.current_batch_size();
        assert!(current >= 1 && current <= max, "round {round}: {current}");
    }
}

// ============================================================================
// Growth Discipline
// ============================================================================

#[test]
fn test_single_saturated_batch_holds_second_doubles() {
    let f = fixture(1024, 16384);

    saturated_batch(&f.tuner);
    assert_eq!(
        f.tuner.current_batch_size(),
        1024,
        "one saturated batch must not grow the size"
    );

    saturated_batch(&f.tuner);
    assert_eq!(
        f.tuner.current_batch_size(),
        2048,
        "second consecutive saturated batch must double"
    );
}

#[test]
fn test_grace_period_blocks_decrease_after_growth() {
    let f = fixture(1024, 16384);
    grow_to(&f, 2048);

    // Starved and slow, but within 3 minutes of the increase.
    f.tuner
        .auto_throttle_batch_size(10, MB, Duration::from_secs(10));
    assert_eq!(f.tuner.current_batch_size(), 2048);

    // The same batch outside the grace period shrinks.
    f.clock.advance(Duration::from_secs(181));
    f.tuner
        .auto_throttle_batch_size(10, MB, Duration::from_secs(10));
    assert_eq!(f.tuner.current_batch_size(), 1024);
}

// ============================================================================
// Shrink Discipline
// ============================================================================

#[test]
fn test_starved_slow_batches_halve_to_floor() {
    let f = fixture(1024, 16384);
    grow_to(&f, 8192);
    f.clock.advance(Duration::from_secs(200));

    // History holds 4096 from the growth run; 4096 is not above 8192/2,
    // so the cut goes through: max(1024, 8192/2) = 4096.
    f.tuner
        .auto_throttle_batch_size(100, MB, Duration::from_secs(10));
    assert_eq!(f.tuner.current_batch_size(), 4096);

    // Keep starving it down to the configured floor.
    for _ in 0..8 {
        f.clock.advance(Duration::from_secs(200));
        f.tuner
            .auto_throttle_batch_size(1, MB, Duration::from_secs(10));
    }
    assert_eq!(f.tuner.current_batch_size(), 1024);
}

// ============================================================================
// Emergencies
// ============================================================================

#[test]
fn test_low_memory_notification_never_raises_size() {
    let f = fixture(1024, 16384);
    grow_to(&f, 4096);

    for _ in 0..4 {
        let before = f.tuner.current_batch_size();
        assert_eq!(f.registry.notify_low_memory(), 1);
        let after = f.tuner.current_batch_size();
        assert!(after <= before, "low memory raised size {before} -> {after}");
    }
}

#[test]
fn test_out_of_memory_recovery_downshift() {
    let f = fixture(1024, 16384);
    grow_to(&f, 4096);
    assert_eq!(f.tuner.gauges().remembered_history(), 1);

    // Over the usage threshold: 1 GB tracked * 4 > 1 GB limit.
    f.tuner.usage().register(Uuid::new_v4(), GB);
    f.tuner.handle_out_of_memory();

    assert_eq!(f.tuner.current_batch_size(), 256);
    assert_eq!(f.tuner.gauges().remembered_history(), 2);
}

#[test]
fn test_remembered_history_never_decreases() {
    let f = fixture(1024, 16384);
    let mut previous = f.tuner.gauges().remembered_history();

    for round in 0..6 {
        // Normal traffic must not move the remembered length.
        saturated_batch(&f.tuner);
        f.tuner
            .auto_throttle_batch_size(5, MB, Duration::from_secs(10));
        assert_eq!(f.tuner.gauges().remembered_history(), previous);

        f.tuner.handle_out_of_memory();
        let grown = f.tuner.gauges().remembered_history();
        assert_eq!(grown, previous * 2, "round {round}");
        previous = grown;
    }
}

#[test]
fn test_growth_needs_longer_run_after_out_of_memory() {
    let f = fixture(1024, 16384);
    f.tuner.handle_out_of_memory();
    assert_eq!(f.tuner.current_batch_size(), 512);
    assert_eq!(f.tuner.gauges().remembered_history(), 2);

    // With a window of two, growth needs two recorded saturated batches
    // on top of the saturated trigger batch.
    saturated_batch(&f.tuner);
    assert_eq!(f.tuner.current_batch_size(), 512);
    saturated_batch(&f.tuner);
    assert_eq!(f.tuner.current_batch_size(), 512);
    saturated_batch(&f.tuner);
    assert_eq!(f.tuner.current_batch_size(), 1024);
}

// ============================================================================
// Fetch Cap
// ============================================================================

#[test]
fn test_fetch_cap_bounded_for_any_available_memory() {
    let f = fixture(1024, 16384);

    for available in [0, MB, 100 * MB, 900 * MB, 1200 * MB, 4 * GB, 100 * GB] {
        f.memory.set_available(available);
        let cap = f.tuner.maximum_fetch_size_bytes();
        assert!(
            cap >= 8 * MB && cap <= 256 * MB,
            "available {available}: cap {cap} out of bounds"
        );
    }
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_evaluations_and_sweeps_keep_invariant() {
    let f = fixture(1024, 16384);
    let stop = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::new();

    for worker in 0..4 {
        let tuner = Arc::clone(&f.tuner);
        let stop = Arc::clone(&stop);
        handles.push(thread::spawn(move || {
            let mut round = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let op = Uuid::new_v4();
                tuner.usage().register(op, (worker as u64 + 1) * MB);

                let current = tuner.current_batch_size();
                let items = if round % 3 == 0 { current } else { current / 2 };
                let duration = if round % 2 == 0 {
                    Duration::from_millis(5)
                } else {
                    Duration::from_secs(10)
                };
                tuner.auto_throttle_batch_size(items, MB, duration);

                tuner.usage().deregister(op);
                round += 1;
            }
        }));
    }

    let registry = Arc::clone(&f.registry);
    let stop_sweeper = Arc::clone(&stop);
    handles.push(thread::spawn(move || {
        while !stop_sweeper.load(Ordering::Relaxed) {
            registry.notify_low_memory();
            thread::yield_now();
        }
    }));

    for _ in 0..50 {
        let current = f.tuner.current_batch_size();
        assert!(current >= 1 && current <= 16384);
        thread::sleep(Duration::from_millis(1));
    }

    stop.store(true, Ordering::Relaxed);
    for handle in handles {
        handle.join().unwrap();
    }

    let current = f.tuner.current_batch_size();
    assert!(current >= 1 && current <= 16384);
    assert!(f.tuner.usage().is_empty());
}
