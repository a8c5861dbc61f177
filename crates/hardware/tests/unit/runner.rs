//! # Experiment Runner Tests
//!
//! Drives the runner against a mock kernel to verify ordering guarantees: the kernel never runs
//! for an invalid topology, a failing kernel leaves no row behind, a missing dump yields an
//! incomplete zero row, and sweeps continue past failures.

use hwsweep_core::common::{ConfigError, ExperimentError, KernelError, TopologyError};
use hwsweep_core::config::{Associativity, ComponentSpec};
use hwsweep_core::presets;
use hwsweep_core::sim::{CsvDirSink, ExperimentRunner, KernelOutcome, MemorySink, Workload};
use pretty_assertions::assert_eq;

use crate::common::fixtures::{self, L1_ONLY_DUMP, workload_binary};
use crate::common::init_tracing;
use crate::common::mocks::kernel::{MockKernel, kernel_without_dump, kernel_writing};

#[test]
fn test_run_produces_complete_row() {
    init_tracing();
    let bin = workload_binary();
    let out = tempfile::tempdir().unwrap();
    let expected_dir = out.path().join("l1_only");

    let mut kernel = MockKernel::new();
    kernel
        .expect_execute()
        .withf(move |topology, _, dir| {
            !topology.contains("system.l2cache") && dir == expected_dir.as_path()
        })
        .times(1)
        .returning(|_, _, dir| {
            std::fs::create_dir_all(dir).unwrap();
            let outcome = KernelOutcome::in_dir(dir);
            std::fs::write(&outcome.stats_path, L1_ONLY_DUMP).unwrap();
            Ok(outcome)
        });

    let mut runner = ExperimentRunner::new(
        kernel,
        MemorySink::new(),
        Workload::new(bin.path()),
        out.path(),
    );
    let result = runner.run(&fixtures::l1_only("l1_only")).unwrap();

    assert!(result.complete);
    assert_eq!(result.name, "l1_only");
    assert_eq!(result.metrics.level("icache").unwrap().hit_rate, 90.0);
    assert_eq!(result.metrics.level("dcache").unwrap().hit_rate, 70.0);
    assert_eq!(runner.sink().results.len(), 1);
    assert_eq!(runner.sink().results[0], result);
}

#[test]
fn test_undecodable_dump_line_still_yields_row() {
    let bin = workload_binary();
    let out = tempfile::tempdir().unwrap();
    let mut kernel = MockKernel::new();
    kernel.expect_execute().times(1).returning(|_, _, dir| {
        std::fs::create_dir_all(dir).unwrap();
        let outcome = KernelOutcome::in_dir(dir);
        let mut bytes = L1_ONLY_DUMP.as_bytes().to_vec();
        bytes.extend_from_slice(b"system.cpu.bogus \xff\xfe 1\n");
        std::fs::write(&outcome.stats_path, bytes).unwrap();
        Ok(outcome)
    });

    let mut runner =
        ExperimentRunner::new(kernel, MemorySink::new(), Workload::new(bin.path()), out.path());
    let result = runner.run(&fixtures::l1_only("l1_only")).unwrap();

    assert!(result.complete);
    assert_eq!(result.metrics.level("icache").unwrap().hit_rate, 90.0);
    assert_eq!(result.metrics.level("dcache").unwrap().hit_rate, 70.0);
    assert_eq!(runner.sink().results.len(), 1);
}

#[test]
fn test_rerun_replaces_memory_row() {
    let bin = workload_binary();
    let out = tempfile::tempdir().unwrap();
    let mut runner = ExperimentRunner::new(
        kernel_writing(L1_ONLY_DUMP),
        MemorySink::new(),
        Workload::new(bin.path()),
        out.path(),
    );
    runner.run(&fixtures::l1_only("same")).unwrap();
    runner.run(&fixtures::l1_only("same")).unwrap();
    runner.run(&fixtures::l1_only("other")).unwrap();

    let names: Vec<&str> = runner.sink().results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["same", "other"]);
}

#[test]
fn test_invalid_topology_never_reaches_kernel() {
    let bin = workload_binary();
    let out = tempfile::tempdir().unwrap();
    let mut kernel = MockKernel::new();
    kernel.expect_execute().times(0);

    let mut config = fixtures::two_level("assoc_0");
    config
        .hierarchy
        .set_component(ComponentSpec::l1i().with_associativity(Associativity::Ways(0)));

    let mut runner =
        ExperimentRunner::new(kernel, MemorySink::new(), Workload::new(bin.path()), out.path());
    let err = runner.run(&config).unwrap_err();
    assert!(matches!(
        err,
        ExperimentError::Topology(TopologyError::InvalidParameter { .. })
    ));
    assert!(runner.sink().results.is_empty());
}

#[test]
fn test_missing_binary_is_a_config_error() {
    let out = tempfile::tempdir().unwrap();
    let mut kernel = MockKernel::new();
    kernel.expect_execute().times(0);

    let mut runner = ExperimentRunner::new(
        kernel,
        MemorySink::new(),
        Workload::new(out.path().join("no_such_program")),
        out.path(),
    );
    assert!(matches!(
        runner.run(&fixtures::two_level("baseline")),
        Err(ExperimentError::Config(ConfigError::MissingBinary { .. }))
    ));
}

#[test]
fn test_kernel_failure_writes_no_row() {
    let bin = workload_binary();
    let out = tempfile::tempdir().unwrap();
    let mut kernel = MockKernel::new();
    kernel
        .expect_execute()
        .times(1)
        .returning(|_, _, _| Err(KernelError::Failed("segfault".to_string())));

    let mut runner =
        ExperimentRunner::new(kernel, MemorySink::new(), Workload::new(bin.path()), out.path());
    let err = runner.run(&fixtures::two_level("baseline")).unwrap_err();
    assert!(matches!(err, ExperimentError::Kernel(KernelError::Failed(_))));
    assert!(runner.sink().results.is_empty());
}

#[test]
fn test_missing_dump_yields_incomplete_row() {
    let bin = workload_binary();
    let out = tempfile::tempdir().unwrap();
    let mut runner = ExperimentRunner::new(
        kernel_without_dump(),
        MemorySink::new(),
        Workload::new(bin.path()),
        out.path(),
    );
    let result = runner.run(&fixtures::two_level("baseline")).unwrap();

    assert!(!result.complete);
    assert!(!result.metrics.stats_available);
    assert!(result.metrics.levels.iter().all(|l| l.hit_rate == 0.0));
    assert_eq!(runner.sink().results.len(), 1);
}

#[test]
fn test_power_rows_and_downgrades() {
    let bin = workload_binary();
    let out = tempfile::tempdir().unwrap();
    let mut runner = ExperimentRunner::new(
        kernel_writing(L1_ONLY_DUMP),
        MemorySink::new(),
        Workload::new(bin.path()),
        out.path(),
    );
    // Every counter the CPU formula reads is in the dump.
    let result = runner.run(&presets::lookup("edge_minor").unwrap()).unwrap();
    assert!(result.complete, "{:?}", result.warnings);
    assert!(result.metrics.total_dynamic_watts > 0.0);

    let mut config = presets::lookup("edge_minor").unwrap();
    config.power.instrument_caches = true;
    config.name = "edge_minor_caches".to_string();
    let mut runner = ExperimentRunner::new(
        kernel_writing("simSeconds 0.001\nsystem.cpu.ipc 1.0\n"),
        MemorySink::new(),
        Workload::new(bin.path()),
        out.path(),
    );
    let result = runner.run(&config).unwrap();
    assert!(!result.complete);
    assert!(!result.warnings.is_empty());
}

#[test]
fn test_topology_warnings_reach_the_row() {
    let bin = workload_binary();
    let out = tempfile::tempdir().unwrap();
    let mut runner = ExperimentRunner::new(
        kernel_writing(L1_ONLY_DUMP),
        MemorySink::new(),
        Workload::new(bin.path()),
        out.path(),
    );
    let result = runner.run(&presets::lookup("tlb_assoc_2").unwrap()).unwrap();
    assert!(result.warnings.iter().any(|w| w.contains("no effect")));
    assert!(
        result
            .parameters
            .contains(&("tlb_assoc".to_string(), "full".to_string()))
    );
}

#[test]
fn test_sweep_continues_past_failures() {
    init_tracing();
    let bin = workload_binary();
    let out = tempfile::tempdir().unwrap();

    let mut broken = fixtures::two_level("broken");
    broken
        .hierarchy
        .set_component(ComponentSpec::l2().with_size(0));
    let configs = vec![
        fixtures::two_level("first"),
        broken,
        fixtures::l1_only("third"),
    ];

    let mut kernel = MockKernel::new();
    kernel.expect_execute().times(2).returning(|_, _, dir| {
        std::fs::create_dir_all(dir).unwrap();
        let outcome = KernelOutcome::in_dir(dir);
        std::fs::write(&outcome.stats_path, L1_ONLY_DUMP).unwrap();
        Ok(outcome)
    });
    let mut runner = ExperimentRunner::new(
        kernel,
        CsvDirSink::new(out.path().join("csv")),
        Workload::new(bin.path()),
        out.path(),
    );
    let report = runner.sweep(&configs);

    assert!(!report.all_succeeded());
    let completed: Vec<&str> = report.completed.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(completed, vec!["first", "third"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "broken");

    let sink = runner.sink();
    assert!(sink.path_for("first").is_file());
    assert!(!sink.path_for("broken").exists());
    assert!(sink.path_for("third").is_file());
}

#[test]
fn test_run_dir_layout() {
    let bin = workload_binary();
    let runner = ExperimentRunner::new(
        kernel_without_dump(),
        MemorySink::new(),
        Workload::new(bin.path()),
        "results",
    );
    assert_eq!(
        runner.run_dir("size_8kB"),
        std::path::PathBuf::from("results/size_8kB")
    );
}
