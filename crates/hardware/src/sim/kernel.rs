//! Simulation kernel boundary.
//!
//! The cycle-level engine is an external collaborator. The runner hands it a validated topology
//! and a workload and expects a counter dump back in the run directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::common::error::{ConfigError, KernelError};
use crate::topology::TopologyGraph;

/// File name of the serialized topology inside a run directory.
pub const TOPOLOGY_FILE: &str = "topology.json";

/// File name of the counter dump the kernel must produce.
pub const STATS_FILE: &str = "stats.txt";

/// File name of the captured kernel output.
pub const LOG_FILE: &str = "kernel.log";

/// Program executed inside the simulated system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    /// Executable path on the host.
    pub binary: PathBuf,
    /// Program arguments.
    pub args: Vec<String>,
}

impl Workload {
    /// Workload with no arguments.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
        }
    }

    /// Replaces the argument list.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Fails when the binary does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingBinary`].
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.binary.is_file() {
            Ok(())
        } else {
            Err(ConfigError::MissingBinary {
                path: self.binary.clone(),
            })
        }
    }
}

/// What a finished kernel run left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelOutcome {
    /// Where the counter dump should be (it may be missing).
    pub stats_path: PathBuf,
    /// Kernel-reported exit cause, if any.
    pub exit_cause: Option<String>,
}

impl KernelOutcome {
    /// Outcome pointing at the standard dump location in `run_dir`.
    pub fn in_dir(run_dir: &Path) -> Self {
        Self {
            stats_path: run_dir.join(STATS_FILE),
            exit_cause: None,
        }
    }
}

/// Cycle-level simulation engine.
pub trait SimulationKernel {
    /// Runs `workload` on `topology`, writing outputs under `run_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the kernel cannot start or reports failure.
    fn execute(
        &mut self,
        topology: &TopologyGraph,
        workload: &Workload,
        run_dir: &Path,
    ) -> Result<KernelOutcome, KernelError>;
}

/// Kernel backed by an external simulator executable.
///
/// The executable is invoked as
/// `<program> [extra args] --topology <run_dir>/topology.json --outdir <run_dir> -- <binary> [args]`
/// and must leave `stats.txt` in `run_dir`. Its stdout and stderr are captured to `kernel.log`.
#[derive(Debug, Clone)]
pub struct CommandKernel {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl CommandKernel {
    /// Creates a kernel that launches `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Arguments placed before the generated ones.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn command_line(&self, topology_file: &Path, workload: &Workload, run_dir: &Path) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.extend([
            "--topology".to_string(),
            topology_file.display().to_string(),
            "--outdir".to_string(),
            run_dir.display().to_string(),
            "--".to_string(),
            workload.binary.display().to_string(),
        ]);
        args.extend(workload.args.iter().cloned());
        args
    }
}

impl SimulationKernel for CommandKernel {
    fn execute(
        &mut self,
        topology: &TopologyGraph,
        workload: &Workload,
        run_dir: &Path,
    ) -> Result<KernelOutcome, KernelError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| KernelError::Io { path, source }
        };
        fs::create_dir_all(run_dir).map_err(io_err(run_dir))?;
        let topology_file = run_dir.join(TOPOLOGY_FILE);
        fs::write(&topology_file, topology.to_json()?).map_err(io_err(&topology_file))?;

        let args = self.command_line(&topology_file, workload, run_dir);
        tracing::info!(program = %self.program.display(), ?args, "launching kernel");
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| KernelError::Launch {
                program: self.program.clone(),
                source,
            })?;

        let log_file = run_dir.join(LOG_FILE);
        let mut log = output.stdout;
        log.extend_from_slice(&output.stderr);
        fs::write(&log_file, &log).map_err(io_err(&log_file))?;

        if !output.status.success() {
            let tail: String = String::from_utf8_lossy(&output.stderr)
                .lines()
                .last()
                .unwrap_or_default()
                .to_string();
            return Err(KernelError::Failed(format!(
                "'{}' exited with {}{}",
                self.program.display(),
                output.status,
                if tail.is_empty() {
                    String::new()
                } else {
                    format!(": {tail}")
                }
            )));
        }

        let exit_cause = String::from_utf8_lossy(&log)
            .lines()
            .find_map(|l| l.split_once("because ").map(|(_, cause)| cause.trim().to_string()));
        Ok(KernelOutcome {
            exit_cause,
            ..KernelOutcome::in_dir(run_dir)
        })
    }
}
