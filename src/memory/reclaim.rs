//! # Reclamation Trigger Boundary
//!
//! The tuner asks an external subsystem to reclaim memory at two points:
//! a compacting pass when it is close to the memory ceiling, and a lighter
//! optimized pass after a large routine taper. Both are blocking calls and
//! both are best-effort: the tuner proceeds with its sizing decision no
//! matter what the reclaimer did.
//!
//! What "reclaim" means depends on the embedding. Against an allocator it
//! may be a trim; against an arena it may be a compaction; in tests it is
//! usually a recording stub.

use tracing::debug;

/// How aggressive a reclamation pass should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimMode {
    /// Full pass including compaction of large allocations. Slow; used
    /// when the memory ceiling is near.
    Compacting,
    /// Opportunistic pass without compaction. Used after a significant
    /// routine reduction in batch size.
    Optimized,
}

/// Blocking request for memory reclamation.
pub trait ReclamationTrigger: Send + Sync {
    /// Runs a reclamation pass. `after` is invoked once the pass has
    /// completed, regardless of how much was reclaimed.
    fn reclaim(&self, mode: ReclaimMode, after: Option<Box<dyn FnOnce() + Send>>);
}

/// Reclaimer that does nothing. The default for embeddings whose
/// allocator has no useful trim operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReclaimer;

impl ReclamationTrigger for NoopReclaimer {
    fn reclaim(&self, mode: ReclaimMode, after: Option<Box<dyn FnOnce() + Send>>) {
        debug!(?mode, "reclamation requested, no reclaimer configured");
        if let Some(after) = after {
            after();
        }
    }
}
