//! Experiment execution.
//!
//! Connects configuration, topology, power, and stats to an external simulation kernel and a
//! result sink.

/// Kernel trait, workload, and the external-process kernel.
pub mod kernel;

/// Run and sweep orchestration.
pub mod runner;

/// Result rows.
pub mod result;

/// Result sinks.
pub mod sink;

pub use kernel::{CommandKernel, KernelOutcome, STATS_FILE, SimulationKernel, Workload};
pub use result::ExperimentResult;
pub use runner::{ExperimentRunner, SweepFailure, SweepReport};
pub use sink::{CsvDirSink, JsonTableSink, MemorySink, ResultSink};
