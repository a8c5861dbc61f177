//! Error taxonomy for experiment construction, evaluation, and persistence.
//!
//! This module defines every error the pipeline can report. It provides:
//! 1. **Configuration errors:** Unknown preset names and out-of-range parameters (always fatal).
//! 2. **Topology errors:** Unbound, conflicting, or malformed port bindings (construction aborts).
//! 3. **Power errors:** Missing counters and invalid environments (downgraded per component).
//! 4. **Stats errors:** A counter dump that was never produced (downgraded to zero metrics).
//! 5. **Kernel and sink errors:** Failures of the external simulator or of result persistence.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Invalid or unknown experiment configuration.
///
/// Always reported before the simulation kernel is invoked.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The requested preset name is not in the configuration table.
    #[error("unknown configuration '{name}' (available: {available})")]
    UnknownConfiguration {
        /// Name that was requested.
        name: String,
        /// Comma-separated list of valid names.
        available: String,
    },

    /// A parameter is outside its valid range.
    #[error("invalid value for '{field}': {reason}")]
    InvalidParameter {
        /// Dotted path of the offending field (e.g. `cpu.widths.fetch`).
        field: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// A memory size or frequency string could not be parsed.
    #[error("cannot parse '{input}' as a {kind}")]
    InvalidQuantity {
        /// The raw text.
        input: String,
        /// What was expected ("size" or "frequency").
        kind: &'static str,
    },

    /// The workload binary does not exist.
    #[error("workload binary '{}' not found", path.display())]
    MissingBinary {
        /// Path that was checked.
        path: PathBuf,
    },

    /// A power formula override failed to parse.
    #[error("power formula override: {0}")]
    Formula(#[from] PowerError),

    /// A configuration file could not be read.
    #[error("cannot read configuration '{}': {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A configuration file is not valid JSON for [`ExperimentConfig`](crate::config::ExperimentConfig).
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to synthesize a valid component graph.
///
/// Construction is all-or-nothing: no partial topology is ever returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// A declared port has no peer.
    #[error("port '{node}.{port}' is not bound")]
    UnboundPort {
        /// Path of the owning node.
        node: String,
        /// Port name.
        port: String,
    },

    /// A single-peer port was bound a second time.
    #[error("port '{node}.{port}' is already bound")]
    ConflictingBinding {
        /// Path of the owning node.
        node: String,
        /// Port name.
        port: String,
    },

    /// A binding referenced a port the node does not declare.
    #[error("node '{node}' has no port '{port}'")]
    UnknownPort {
        /// Path of the node.
        node: String,
        /// Requested port name.
        port: String,
    },

    /// A binding connected two ports of the wrong direction.
    #[error("cannot bind '{from}' to '{to}': expected requestor -> responder")]
    RoleMismatch {
        /// Requesting side, as `node.port`.
        from: String,
        /// Responding side, as `node.port`.
        to: String,
    },

    /// A component parameter violates its invariants.
    #[error("component '{component}': {reason}")]
    InvalidParameter {
        /// Component name.
        component: String,
        /// Which invariant failed.
        reason: String,
    },

    /// The requested hierarchy shape cannot be built.
    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    /// The memory controller does not serve the configured range.
    #[error("memory controller range {actual} does not match configured range {expected}")]
    MemoryRangeMismatch {
        /// Configured range.
        expected: String,
        /// Range attached to the controller.
        actual: String,
    },

    /// Requests can loop back to a node already on the path.
    #[error("request path loops back through '{0}'")]
    Cycle(String),

    /// The memory controller is not reachable from the CPU.
    #[error("memory controller is not reachable from '{0}'")]
    Unreachable(String),
}

/// Failure to evaluate a power formula.
///
/// Fatal for one evaluation call only; the metrics deriver downgrades it to zero power.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PowerError {
    /// A formula referenced a counter absent from the snapshot.
    #[error("component '{component}' references missing counter '{counter}'")]
    MissingCounter {
        /// Component path.
        component: String,
        /// Fully-qualified counter key that was looked up.
        counter: String,
    },

    /// Voltage, temperature, or elapsed time is unusable.
    #[error("invalid environment: {0}")]
    InvalidEnvironment(String),

    /// Evaluation produced NaN or infinity.
    #[error("formula for '{component}' evaluated to a non-finite value")]
    NonFinite {
        /// Component path.
        component: String,
    },

    /// A textual formula could not be parsed.
    #[error("cannot parse formula '{input}': {reason}")]
    Parse {
        /// The formula text.
        input: String,
        /// What went wrong.
        reason: String,
    },
}

/// Failure to obtain a counter dump.
#[derive(Debug, Error)]
pub enum StatsError {
    /// The dump was never produced by the kernel.
    #[error("statistics unavailable: '{}' does not exist", path.display())]
    Unavailable {
        /// Expected dump location.
        path: PathBuf,
    },

    /// The dump exists but could not be read.
    #[error("cannot read statistics '{}': {source}", path.display())]
    Io {
        /// Dump location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Failure of the external simulation kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The simulator executable could not be started.
    #[error("cannot launch '{}': {source}", program.display())]
    Launch {
        /// Executable path.
        program: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The simulator ran but reported failure.
    #[error("simulation failed: {0}")]
    Failed(String),

    /// The run directory or topology file could not be prepared.
    #[error("cannot prepare run directory '{}': {source}", path.display())]
    Io {
        /// Path being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The topology could not be serialized for the kernel.
    #[error("cannot serialize topology: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure to persist a result row.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing the destination failed.
    #[error("cannot write results to '{}': {source}", path.display())]
    Io {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The existing result table or the new row could not be (de)serialized.
    #[error("result table is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Any failure that aborts a single experiment.
#[derive(Debug, Error)]
pub enum ExperimentError {
    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Topology construction failed; the kernel was not invoked.
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// The kernel failed; no result row was written.
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// The dump exists but could not be read.
    #[error(transparent)]
    Stats(#[from] StatsError),

    /// The result row could not be persisted.
    #[error(transparent)]
    Sink(#[from] SinkError),
}
