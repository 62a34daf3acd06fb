//! # Adaptive Batch Sizing
//!
//! The controller that decides, after every completed batch, how many
//! items the next batch should admit. One [`BatchSizeTuner`] exists per
//! background processing engine; the algorithm is identical across
//! engines, and per-engine differences (starting size, ceiling) live in
//! the [`EngineProfile`] capability struct.
//!
//! - [`tuner`]: the evaluation pipeline and emergency hooks
//! - [`history`]: bounded window of recent batch item counts
//! - [`gauges`]: published size slots readable without the evaluation lock
//! - [`config`]: runtime configuration with validation

mod config;
mod gauges;
mod history;
mod tuner;

pub use config::ThrottleConfig;
pub use gauges::EngineGauges;
pub use history::HistoryWindow;
pub use tuner::{BatchSizeTuner, EngineProfile, TunerBuilder};
