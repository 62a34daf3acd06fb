//! # Batch History Window
//!
//! A bounded record of recent batch item counts. The tuner reads it to
//! tell sustained demand from a single lucky or unlucky batch: growth
//! requires a full window of saturated batches, and shrinking is held
//! while any remembered batch was still busy.
//!
//! The remembered length only moves in one direction. It doubles on each
//! out-of-memory event and never shrinks, so every emergency permanently
//! raises the bar for future growth.

use std::collections::VecDeque;

/// Ordered record of the last `remembered` batch item counts.
#[derive(Debug)]
pub struct HistoryWindow {
    counts: VecDeque<usize>,
    remembered: usize,
}

impl HistoryWindow {
    pub fn new(remembered: usize) -> Self {
        let remembered = remembered.max(1);
        Self {
            counts: VecDeque::with_capacity(remembered),
            remembered,
        }
    }

    /// Appends a batch's item count, discarding the oldest entries beyond
    /// the remembered length.
    pub fn record(&mut self, items: usize) {
        self.counts.push_back(items);
        while self.counts.len() > self.remembered {
            self.counts.pop_front();
        }
    }

    /// True if any remembered count is strictly above `threshold`.
    pub fn any_above(&self, threshold: usize) -> bool {
        self.counts.iter().any(|&count| count > threshold)
    }

    /// True if any remembered count is strictly below `threshold`.
    pub fn any_below(&self, threshold: usize) -> bool {
        self.counts.iter().any(|&count| count < threshold)
    }

    /// True once the window holds `remembered` entries. After the
    /// remembered length grows, the window reports not-full again until
    /// enough new batches have been recorded.
    pub fn is_full(&self) -> bool {
        self.counts.len() >= self.remembered
    }

    /// Doubles the remembered length. Returns the new length.
    pub fn grow(&mut self) -> usize {
        self.remembered = self.remembered.saturating_mul(2);
        self.remembered
    }

    pub fn remembered(&self) -> usize {
        self.remembered
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.counts.iter().copied()
    }
}
