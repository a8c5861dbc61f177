//! Experiment orchestration.
//!
//! One run performs, in order:
//! 1. **Validation:** Configuration range checks and the workload binary check.
//! 2. **Topology:** Graph synthesis; a failure here means the kernel is never invoked.
//! 3. **Power:** Model attachment when power modeling is enabled.
//! 4. **Kernel:** Execution in `<output root>/<name>/`.
//! 5. **Metrics:** Dump parsing and derivation; a missing dump yields zeros, not an error.
//! 6. **Persistence:** The assembled row is appended to the sink.

use std::path::{Path, PathBuf};

use crate::common::error::{ConfigError, ExperimentError, StatsError};
use crate::config::ExperimentConfig;
use crate::power::{PowerContext, PowerModelSet};
use crate::stats::{DerivedMetrics, StatsSnapshot};
use crate::topology::TopologyGraph;

use super::kernel::{SimulationKernel, Workload};
use super::result::ExperimentResult;
use super::sink::ResultSink;

/// A configuration that did not produce a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepFailure {
    /// Configuration name.
    pub name: String,
    /// Rendered error.
    pub error: String,
}

/// Outcome of a sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Rows produced, in sweep order.
    pub completed: Vec<ExperimentResult>,
    /// Configurations that aborted, in sweep order.
    pub failed: Vec<SweepFailure>,
}

impl SweepReport {
    /// Whether every configuration produced a row.
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives experiments through a kernel into a sink.
#[derive(Debug)]
pub struct ExperimentRunner<K, S> {
    kernel: K,
    sink: S,
    workload: Workload,
    output_root: PathBuf,
    print_summaries: bool,
}

impl<K: SimulationKernel, S: ResultSink> ExperimentRunner<K, S> {
    /// Creates a runner.
    ///
    /// # Arguments
    ///
    /// * `kernel` - Simulation engine.
    /// * `sink` - Result destination.
    /// * `workload` - Program run by every experiment.
    /// * `output_root` - Parent of the per-experiment run directories.
    pub fn new(kernel: K, sink: S, workload: Workload, output_root: impl Into<PathBuf>) -> Self {
        Self {
            kernel,
            sink,
            workload,
            output_root: output_root.into(),
            print_summaries: false,
        }
    }

    /// Print a summary block to stdout after each experiment.
    #[must_use]
    pub const fn with_summaries(mut self, enabled: bool) -> Self {
        self.print_summaries = enabled;
        self
    }

    /// The kernel.
    pub const fn kernel(&self) -> &K {
        &self.kernel
    }

    /// The sink.
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Directory a configuration runs in.
    pub fn run_dir(&self, name: &str) -> PathBuf {
        self.output_root.join(name)
    }

    /// Runs one experiment end to end.
    ///
    /// # Errors
    ///
    /// * [`ExperimentError::Config`] for an invalid configuration or missing binary.
    /// * [`ExperimentError::Topology`] when the graph cannot be built; the kernel is not invoked.
    /// * [`ExperimentError::Kernel`] when the kernel fails; no row is written.
    /// * [`ExperimentError::Stats`] when a dump exists but cannot be read.
    /// * [`ExperimentError::Sink`] when the row cannot be persisted.
    pub fn run(&mut self, config: &ExperimentConfig) -> Result<ExperimentResult, ExperimentError> {
        config.validate()?;
        self.workload.check()?;

        let graph = TopologyGraph::from_config(&config.hierarchy)?;
        let power = if config.power.enabled {
            let models =
                PowerModelSet::attach_all(&graph, &config.power).map_err(ConfigError::from)?;
            Some(PowerContext::new(models, &config.power))
        } else {
            None
        };

        let run_dir = self.run_dir(&config.name);
        tracing::info!(config = %config.name, dir = %run_dir.display(), "running experiment");
        let outcome = self.kernel.execute(&graph, &self.workload, &run_dir)?;
        if let Some(cause) = &outcome.exit_cause {
            tracing::info!(config = %config.name, %cause, "kernel exited");
        }

        let snapshot = load_snapshot(&outcome.stats_path)?;
        let metrics = DerivedMetrics::derive(
            snapshot.as_ref(),
            &graph.instrumented_components(),
            power.as_ref(),
        );
        let result = ExperimentResult::new(config, metrics, graph.warnings());
        self.sink.append(&result)?;

        if self.print_summaries {
            result.metrics.print_summary(&result.name);
        }
        Ok(result)
    }

    /// Runs every configuration in order, continuing past failures.
    pub fn sweep(&mut self, configs: &[ExperimentConfig]) -> SweepReport {
        let mut report = SweepReport::default();
        for config in configs {
            match self.run(config) {
                Ok(result) => report.completed.push(result),
                Err(e) => {
                    tracing::error!(config = %config.name, error = %e, "experiment failed");
                    if self.print_summaries {
                        println!("\n==========================================================");
                        println!("EXPERIMENT {} FAILED", config.name);
                        println!("  {e}");
                        println!("==========================================================");
                    }
                    report.failed.push(SweepFailure {
                        name: config.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            "sweep finished"
        );
        report
    }
}

/// Reads the dump; a missing dump is downgraded to `None`.
fn load_snapshot(path: &Path) -> Result<Option<StatsSnapshot>, StatsError> {
    match StatsSnapshot::from_path(path) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(StatsError::Unavailable { path }) => {
            tracing::warn!(path = %path.display(), "counter dump missing");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
