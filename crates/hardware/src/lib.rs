//! Memory-hierarchy design-space exploration library.
//!
//! This crate drives an external cycle-level simulator through cache, TLB, and CPU design points
//! and reports comparable metrics for each. It provides:
//! 1. **Configuration:** Component specs, CPU/memory/power settings, and the named preset table.
//! 2. **Topology:** Synthesis of a validated component graph with every port wired.
//! 3. **Power:** Per-state dynamic and static power formulas evaluated from live counters.
//! 4. **Statistics:** Counter dump parsing and derivation of hit rates, core metrics, and power.
//! 5. **Simulation:** Kernel boundary, run/sweep orchestration, and result sinks.

/// Common types (error taxonomy, size and frequency quantities).
pub mod common;
/// Experiment configuration (defaults, enums, hierarchical config structures).
pub mod config;
/// Power formulas, states, and per-component models.
pub mod power;
/// Named experiment configurations grouped into sweep families.
pub mod presets;
/// Kernel boundary, experiment runner, and result sinks.
pub mod sim;
/// Counter dump parsing and metric derivation.
pub mod stats;
/// Component graph synthesis and validation.
pub mod topology;

/// Root configuration type; build from a preset or deserialize from JSON.
pub use crate::config::ExperimentConfig;
/// Drives configurations through a kernel into a sink.
pub use crate::sim::ExperimentRunner;
/// Validated component graph; construct with `TopologyGraph::from_config`.
pub use crate::topology::TopologyGraph;
