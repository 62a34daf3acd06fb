//! # Throttle Configuration Module
//!
//! This module centralizes the tuning constants used by the batch-size
//! controller. Constants are grouped by functional area and their
//! interdependencies are documented and enforced through compile-time
//! assertions.
//!
//! Several of these values are empirical: they were arrived at by running
//! production indexing workloads, not derived from first principles.
//! Changing one of them changes controller behavior and needs a fresh
//! round of workload measurements, so treat them as part of the contract
//! rather than as free parameters.
//!
//! ## Module Organization
//!
//! - [`constants`]: all numeric configuration values with dependency notes

pub mod constants;
pub use constants::*;
