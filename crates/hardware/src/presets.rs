//! Named experiment configurations.
//!
//! Every design point of a sweep is an entry in one static table. An entry carries a short
//! recipe (the single parameter that distinguishes it from its family baseline) and is expanded
//! into a complete [`ExperimentConfig`] on lookup. Families:
//! 1. **Baseline:** The reference two-level hierarchy every other point is compared against.
//! 2. **Cache:** L1 size, associativity, and block size variations with a proportional L2.
//! 3. **Virtual memory:** Page size, TLB size, and TLB associativity variations.
//! 4. **Superscalar:** An out-of-order X86 core with private L1s, single and multi-threaded.
//! 5. **Edge:** An Arm core at 1.2 V / 2 GHz with DDR4 and power modeling enabled.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::error::ConfigError;
use crate::common::size::{GIB, KIB};
use crate::config::{
    AddrRange, Associativity, ComponentSpec, CpuConfig, CpuKind, DramKind, ExperimentConfig,
    HierarchyConfig, Isa, MemoryConfig, PowerConfig,
};

/// Group of related presets run together by a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// Reference hierarchy.
    Baseline,
    /// L1 size / associativity / block size.
    Cache,
    /// Page size and TLB geometry.
    VirtualMemory,
    /// Out-of-order core width and threading.
    Superscalar,
    /// Low-power Arm edge device.
    Edge,
}

impl Family {
    /// Every family, in table order.
    pub const ALL: [Self; 5] = [
        Self::Baseline,
        Self::Cache,
        Self::VirtualMemory,
        Self::Superscalar,
        Self::Edge,
    ];

    /// Parses a family name as accepted by `--family`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownConfiguration`] for an unrecognized name.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        Self::ALL
            .into_iter()
            .find(|f| f.to_string() == name.to_ascii_lowercase().replace('-', "_"))
            .ok_or_else(|| ConfigError::UnknownConfiguration {
                name: name.to_string(),
                available: Self::ALL
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Baseline => "baseline",
            Self::Cache => "cache",
            Self::VirtualMemory => "virtual_memory",
            Self::Superscalar => "superscalar",
            Self::Edge => "edge",
        })
    }
}

/// The one knob a preset turns relative to its family baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recipe {
    Baseline,
    L1Size(u64),
    L1Assoc(u32),
    BlockSize(u64),
    PageSize(u64),
    TlbEntries(u64),
    TlbAssoc(u32),
    OutOfOrder { threads: u32 },
    Edge { kind: CpuKind, l2: bool },
}

/// One entry of the preset table.
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    /// Configuration name (also the result key).
    pub name: &'static str,
    /// Owning family.
    pub family: Family,
    /// One-line description for `hwsweep list`.
    pub description: &'static str,
    recipe: Recipe,
}

impl Preset {
    /// Expands the recipe into a full configuration.
    pub fn config(&self) -> ExperimentConfig {
        let mut config = match self.recipe {
            Recipe::Baseline => baseline(),
            Recipe::L1Size(size) => cache_point(size, 2, None),
            Recipe::L1Assoc(ways) => cache_point(16 * KIB, ways, None),
            Recipe::BlockSize(block) => cache_point(16 * KIB, 2, Some(block)),
            Recipe::PageSize(page) => vm_point(page, 64, 4),
            Recipe::TlbEntries(entries) => vm_point(4 * KIB, entries, 4),
            Recipe::TlbAssoc(ways) => vm_point(4 * KIB, 64, ways),
            Recipe::OutOfOrder { threads } => superscalar(threads),
            Recipe::Edge { kind, l2 } => edge(kind, l2),
        };
        config.name = self.name.to_string();
        config
    }
}

const fn preset(
    name: &'static str,
    family: Family,
    description: &'static str,
    recipe: Recipe,
) -> Preset {
    Preset {
        name,
        family,
        description,
        recipe,
    }
}

/// The preset table.
pub const PRESETS: &[Preset] = &[
    preset("baseline", Family::Baseline, "L1I 16KiB, L1D 64KiB, L2 256KiB, in-order X86 @ 1GHz", Recipe::Baseline),
    preset("size_8kB", Family::Cache, "8KiB 2-way L1s, 128KiB 8-way L2", Recipe::L1Size(8 * KIB)),
    preset("size_16kB", Family::Cache, "16KiB 2-way L1s, 256KiB 8-way L2", Recipe::L1Size(16 * KIB)),
    preset("size_32kB", Family::Cache, "32KiB 2-way L1s, 512KiB 8-way L2", Recipe::L1Size(32 * KIB)),
    preset("size_64kB", Family::Cache, "64KiB 2-way L1s, 1MiB 8-way L2", Recipe::L1Size(64 * KIB)),
    preset("assoc_1", Family::Cache, "direct-mapped 16KiB L1s", Recipe::L1Assoc(1)),
    preset("assoc_2", Family::Cache, "2-way 16KiB L1s", Recipe::L1Assoc(2)),
    preset("assoc_4", Family::Cache, "4-way 16KiB L1s", Recipe::L1Assoc(4)),
    preset("assoc_8", Family::Cache, "8-way 16KiB L1s", Recipe::L1Assoc(8)),
    preset("block_16B", Family::Cache, "16B lines", Recipe::BlockSize(16)),
    preset("block_32B", Family::Cache, "32B lines", Recipe::BlockSize(32)),
    preset("block_64B", Family::Cache, "64B lines", Recipe::BlockSize(64)),
    preset("block_128B", Family::Cache, "128B lines", Recipe::BlockSize(128)),
    preset("page_4kB", Family::VirtualMemory, "4KiB pages", Recipe::PageSize(4 * KIB)),
    preset("page_8kB", Family::VirtualMemory, "8KiB pages (X86 keeps 4KiB)", Recipe::PageSize(8 * KIB)),
    preset("page_16kB", Family::VirtualMemory, "16KiB pages (X86 keeps 4KiB)", Recipe::PageSize(16 * KIB)),
    preset("tlb_32", Family::VirtualMemory, "32-entry TLBs", Recipe::TlbEntries(32)),
    preset("tlb_64", Family::VirtualMemory, "64-entry TLBs", Recipe::TlbEntries(64)),
    preset("tlb_128", Family::VirtualMemory, "128-entry TLBs", Recipe::TlbEntries(128)),
    preset("tlb_assoc_2", Family::VirtualMemory, "2-way TLBs (X86 stays fully associative)", Recipe::TlbAssoc(2)),
    preset("tlb_assoc_4", Family::VirtualMemory, "4-way TLBs (X86 stays fully associative)", Recipe::TlbAssoc(4)),
    preset("tlb_assoc_8", Family::VirtualMemory, "8-way TLBs (X86 stays fully associative)", Recipe::TlbAssoc(8)),
    preset("o3_se", Family::Superscalar, "4-wide out-of-order X86, 32KiB L1s, no L2", Recipe::OutOfOrder { threads: 1 }),
    preset("o3_smt2", Family::Superscalar, "4-wide out-of-order X86, 2 SMT threads", Recipe::OutOfOrder { threads: 2 }),
    preset("edge_minor", Family::Edge, "in-order Arm @ 2GHz, L1s only, CPU power model", Recipe::Edge { kind: CpuKind::InOrder, l2: false }),
    preset("edge_minor_l2", Family::Edge, "in-order Arm @ 2GHz with 256KiB L2", Recipe::Edge { kind: CpuKind::InOrder, l2: true }),
    preset("edge_o3", Family::Edge, "out-of-order Arm @ 2GHz, L1s only", Recipe::Edge { kind: CpuKind::OutOfOrder, l2: false }),
    preset("edge_o3_l2", Family::Edge, "out-of-order Arm @ 2GHz with 256KiB L2", Recipe::Edge { kind: CpuKind::OutOfOrder, l2: true }),
];

/// All preset names, in table order.
pub fn names() -> Vec<&'static str> {
    PRESETS.iter().map(|p| p.name).collect()
}

/// Finds a preset entry by exact name.
pub fn find(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name == name)
}

/// Expands the named preset.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownConfiguration`] listing the valid names.
pub fn lookup(name: &str) -> Result<ExperimentConfig, ConfigError> {
    find(name)
        .map(Preset::config)
        .ok_or_else(|| ConfigError::UnknownConfiguration {
            name: name.to_string(),
            available: names().join(", "),
        })
}

/// Expands every preset of one family, in table order.
pub fn family(family: Family) -> Vec<ExperimentConfig> {
    PRESETS
        .iter()
        .filter(|p| p.family == family)
        .map(Preset::config)
        .collect()
}

fn baseline() -> ExperimentConfig {
    ExperimentConfig::new("baseline", HierarchyConfig::default())
}

/// L1s of equal size and associativity with an L2 sixteen times larger and four times as
/// associative.
fn cache_point(l1_size: u64, ways: u32, line: Option<u64>) -> ExperimentConfig {
    let l1_assoc = Associativity::Ways(ways);
    let hierarchy = HierarchyConfig {
        components: vec![
            ComponentSpec::l1i()
                .with_size(l1_size)
                .with_associativity(l1_assoc),
            ComponentSpec::l1d()
                .with_size(l1_size)
                .with_associativity(l1_assoc),
            ComponentSpec::l2()
                .with_size(l1_size * 16)
                .with_associativity(Associativity::Ways(ways * 4)),
        ],
        cache_line_size_override: line,
        ..HierarchyConfig::default()
    };
    ExperimentConfig::new("cache", hierarchy)
}

fn vm_point(page_size: u64, entries: u64, ways: u32) -> ExperimentConfig {
    let l1_size = 16 * KIB;
    let mut hierarchy = HierarchyConfig {
        components: vec![
            ComponentSpec::l1i().with_size(l1_size),
            ComponentSpec::l1d().with_size(l1_size),
            ComponentSpec::l2(),
        ],
        ..HierarchyConfig::default()
    };
    hierarchy.set_component(
        ComponentSpec::tlb()
            .with_size(entries)
            .with_associativity(Associativity::Ways(ways))
            .with_block_size(page_size),
    );
    ExperimentConfig::new("vm", hierarchy)
}

fn superscalar(threads: u32) -> ExperimentConfig {
    let l1 = 32 * KIB;
    let hierarchy = HierarchyConfig {
        cpu: CpuConfig {
            threads,
            smt: threads > 1,
            ..CpuConfig::new(CpuKind::OutOfOrder)
        },
        components: vec![
            ComponentSpec::l1i().with_size(l1).with_targets(8),
            ComponentSpec::l1d().with_size(l1).with_mshrs(8).with_targets(8),
        ],
        enable_l2: false,
        ..HierarchyConfig::default()
    };
    ExperimentConfig::new("o3", hierarchy)
}

fn edge(kind: CpuKind, l2: bool) -> ExperimentConfig {
    let mut cpu = CpuConfig {
        isa: Isa::Arm,
        clock_hz: 2_000_000_000,
        ..CpuConfig::new(kind)
    };
    if kind == CpuKind::OutOfOrder {
        cpu.rob_entries = 128;
        cpu.phys_int_regs = 128;
        cpu.phys_float_regs = 128;
    }

    let mut components = vec![
        ComponentSpec::l1i().with_size(16 * KIB).with_latency(1),
        ComponentSpec::l1d()
            .with_size(32 * KIB)
            .with_associativity(Associativity::Ways(4)),
    ];
    if l2 {
        components.push(ComponentSpec::l2().with_latency(12));
    }

    let hierarchy = HierarchyConfig {
        cpu,
        components,
        enable_l2: l2,
        memory: MemoryConfig {
            range: AddrRange::new(4 * GIB),
            dram: DramKind::Ddr4_2400,
        },
        cache_line_size_override: None,
    };
    ExperimentConfig {
        name: "edge".to_string(),
        hierarchy,
        power: PowerConfig {
            enabled: true,
            voltage: 1.2,
            ..PowerConfig::default()
        },
    }
}
