//! Shared fixtures: counter dumps, workload binaries, and configuration helpers.

use hwsweep_core::config::{ComponentSpec, ExperimentConfig, HierarchyConfig};
use tempfile::NamedTempFile;

/// Dump of a run on the two-L1, no-L2 hierarchy: icache 90 % and dcache 70 %.
pub const L1_ONLY_DUMP: &str = "\
---------- Begin Simulation Statistics ----------
simSeconds                                   0.000500                       # Number of seconds simulated (Second)
simTicks                                    500000000                       # Number of ticks simulated (Tick)
simInsts                                        40000                       # Number of instructions simulated (Count)
system.cpu.numCycles                           500000                       # Number of cpu cycles simulated (Cycle)
system.cpu.ipc                               0.080000                       # IPC: instructions per cycle ((Count/Cycle))
system.cpu.icache.overallHits::total              900                       # number of overall hits (Count)
system.cpu.icache.overallMisses::total            100                       # number of overall misses (Count)
system.cpu.icache.overallAccesses::total         1000                       # number of overall accesses (Count)
system.cpu.dcache.overallHits::total              700                       # number of overall hits (Count)
system.cpu.dcache.overallMisses::total            300                       # number of overall misses (Count)
system.cpu.dcache.overallAccesses::total         1000                       # number of overall accesses (Count)

---------- End Simulation Statistics   ----------
";

/// Dump of a run on the baseline hierarchy with an L2 and TLBs.
pub const FULL_DUMP: &str = "\
---------- Begin Simulation Statistics ----------
simSeconds                                   0.001000
simTicks                                   1000000000
simInsts                                       100000
system.cpu.numCycles                          1000000
system.cpu.icache.overallHits::total             9500
system.cpu.icache.overallMisses::total            500
system.cpu.icache.overallAccesses::total        10000
system.cpu.dcache.overallHits::total             8000
system.cpu.dcache.overallMisses::total           2000
system.cpu.dcache.overallAccesses::total        10000
system.l2cache.overallHits::total                1250
system.l2cache.overallMisses::total              1250
system.l2cache.overallAccesses::total            2500
system.cpu.mmu.itb.exAccesses                   10000
system.cpu.mmu.itb.exMisses                        10
system.cpu.mmu.dtb.rdAccesses                    6000
system.cpu.mmu.dtb.wrAccesses                    4000
system.cpu.mmu.dtb.rdMisses                        60
system.cpu.mmu.dtb.wrMisses                        40
---------- End Simulation Statistics   ----------
";

/// An existing file that passes the workload binary check.
///
/// The returned handle must be kept alive for the duration of the test.
pub fn workload_binary() -> NamedTempFile {
    NamedTempFile::new().expect("create workload binary")
}

/// L1I 16 KiB / 2-way, L1D 64 KiB / 2-way, no L2.
pub fn l1_only(name: &str) -> ExperimentConfig {
    ExperimentConfig::new(
        name,
        HierarchyConfig {
            components: vec![ComponentSpec::l1i(), ComponentSpec::l1d()],
            enable_l2: false,
            ..HierarchyConfig::default()
        },
    )
}

/// The default two-level hierarchy under a given name.
pub fn two_level(name: &str) -> ExperimentConfig {
    ExperimentConfig::new(name, HierarchyConfig::default())
}
