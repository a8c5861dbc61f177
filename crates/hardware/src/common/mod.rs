//! Common utilities and types shared across the crate.
//!
//! This module provides fundamental building blocks used by every stage of the pipeline:
//! 1. **Error Handling:** The error taxonomy for configuration, topology, power, stats, kernel, and sinks.
//! 2. **Quantities:** Parsing and formatting of memory sizes and clock frequencies.

/// Error types for every pipeline stage.
pub mod error;

/// Memory-size and frequency parsing.
pub mod size;

pub use error::{
    ConfigError, ExperimentError, KernelError, PowerError, SinkError, StatsError, TopologyError,
};
pub use size::{format_size, parse_frequency, parse_size};
