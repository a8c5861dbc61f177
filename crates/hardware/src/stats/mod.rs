//! Counter dumps and derived metrics.
//!
//! This module provides:
//! 1. **Parsing:** [`StatsSnapshot`] reads the kernel's `key value` dump.
//! 2. **Derivation:** [`DerivedMetrics`] computes hit rates, core metrics, and power.

/// Metric derivation and summary printing.
pub mod metrics;

/// Dump parsing and lookup.
pub mod snapshot;

pub use metrics::{ComponentPower, CoreMetrics, DerivedMetrics, LevelMetrics, hit_rate};
pub use snapshot::{StatsSnapshot, TOTAL_SUFFIX};
