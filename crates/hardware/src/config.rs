//! Configuration system for hierarchy experiments.
//!
//! This module defines all configuration structures and enums used to describe one experiment.
//! It provides:
//! 1. **Defaults:** Baseline hardware constants (cache geometry, latencies, TLB, CPU, power).
//! 2. **Component specs:** [`ComponentSpec`] values for L1I, L1D, L2, and TLB levels, built through
//!    explicit builder functions rather than per-level types.
//! 3. **Structures:** Hierarchical config for the CPU, memory, power model, and the whole experiment.
//! 4. **Validation:** Range checks that run before any topology is built or kernel is launched.
//!
//! Configuration is assembled by a single entry point (a preset plus overrides, or a JSON file);
//! there is no global option registry.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::common::error::{ConfigError, TopologyError};
use crate::common::size::{format_frequency, format_size, serde_frequency, serde_size};
use crate::power::{ComponentClass, Expr, PowerState};

/// Default configuration constants.
///
/// These values mirror the baseline hierarchy used for comparison in every sweep.
mod defaults {
    use crate::common::size::{KIB, MIB};

    /// Main memory size (512 MiB).
    pub const MEMORY_SIZE: u64 = 512 * MIB;

    /// CPU clock (1 GHz).
    pub const CPU_CLOCK_HZ: u64 = 1_000_000_000;

    /// Superscalar width for every out-of-order stage.
    pub const PIPELINE_WIDTH: u32 = 4;

    /// Hardware thread count.
    pub const THREADS: u32 = 1;

    /// Most hardware threads the out-of-order kernel model supports.
    pub const MAX_THREADS: u32 = 8;

    /// Reorder buffer entries.
    pub const ROB_ENTRIES: u32 = 192;

    /// Physical integer registers.
    pub const PHYS_INT_REGS: u32 = 256;

    /// Physical floating-point registers.
    pub const PHYS_FLOAT_REGS: u32 = 256;

    /// Load queue entries.
    pub const LQ_ENTRIES: u32 = 32;

    /// Store queue entries.
    pub const SQ_ENTRIES: u32 = 32;

    /// Cache line size in bytes.
    pub const CACHE_LINE: u64 = 64;

    /// L1 instruction cache size (16 KiB).
    pub const L1I_SIZE: u64 = 16 * KIB;

    /// L1 data cache size (64 KiB).
    pub const L1D_SIZE: u64 = 64 * KIB;

    /// L1 associativity (2-way).
    pub const L1_ASSOC: u32 = 2;

    /// L1 tag/data/response latency in cycles.
    pub const L1_LATENCY: u32 = 2;

    /// L1 miss status holding registers.
    pub const L1_MSHRS: u32 = 4;

    /// L1 targets per MSHR.
    pub const L1_TARGETS: u32 = 20;

    /// L2 cache size (256 KiB).
    pub const L2_SIZE: u64 = 256 * KIB;

    /// L2 associativity (8-way).
    pub const L2_ASSOC: u32 = 8;

    /// L2 tag/data/response latency in cycles.
    pub const L2_LATENCY: u32 = 20;

    /// L2 miss status holding registers.
    pub const L2_MSHRS: u32 = 20;

    /// L2 targets per MSHR.
    pub const L2_TARGETS: u32 = 12;

    /// TLB entries.
    pub const TLB_ENTRIES: u64 = 64;

    /// TLB associativity.
    pub const TLB_ASSOC: u32 = 4;

    /// Page size in bytes (4 KiB).
    pub const PAGE_SIZE: u64 = 4 * KIB;

    /// Supply voltage in volts.
    pub const VOLTAGE: f64 = 1.0;

    /// Die temperature in degrees Celsius.
    pub const TEMPERATURE: f64 = 25.0;
}

/// Page size fixed by the X86 architecture regardless of configuration.
pub const X86_PAGE_SIZE: u64 = defaults::PAGE_SIZE;

/// CPU microarchitecture class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuKind {
    /// In-order pipeline (Minor / timing-simple class).
    #[default]
    #[serde(alias = "minor", alias = "inorder")]
    InOrder,
    /// Out-of-order superscalar pipeline (O3 class).
    #[serde(alias = "o3", alias = "ooo")]
    OutOfOrder,
}

impl CpuKind {
    /// Short name used on the command line and in result rows.
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::InOrder => "minor",
            Self::OutOfOrder => "o3",
        }
    }
}

impl fmt::Display for CpuKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Instruction set of the simulated core.
///
/// The ISA matters to the topology: X86 cores need interrupt-controller ports on the memory bus
/// and ignore TLB associativity and page-size settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isa {
    /// x86-64.
    #[default]
    X86,
    /// ARMv8-A (AArch64).
    #[serde(alias = "aarch64")]
    Arm,
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::X86 => "x86",
            Self::Arm => "arm",
        })
    }
}

/// Conditional branch predictor selection handed to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchPredictor {
    /// The kernel's default (tournament-class) predictor.
    #[default]
    #[serde(alias = "simple")]
    Default,
    /// A single-entry, one-bit local predictor that approximates "no prediction".
    #[serde(alias = "none")]
    Minimal,
}

/// DRAM device model attached to the memory controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DramKind {
    /// DDR3-1600, 8 devices of x8.
    #[default]
    #[serde(rename = "DDR3_1600_8x8")]
    Ddr3_1600,
    /// DDR4-2400, 8 devices of x8.
    #[serde(rename = "DDR4_2400_8x8")]
    Ddr4_2400,
}

/// Position of a component in the memory path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentLevel {
    /// Level-1 instruction cache.
    L1I,
    /// Level-1 data cache.
    L1D,
    /// Unified level-2 cache.
    L2,
    /// Translation lookaside buffer (instruction and data side share one spec).
    #[serde(alias = "TLB", alias = "tlb")]
    Tlb,
}

impl ComponentLevel {
    /// Column prefix used in result rows.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::L1I => "l1i",
            Self::L1D => "l1d",
            Self::L2 => "l2",
            Self::Tlb => "tlb",
        }
    }

    /// Whether this level is a cache (as opposed to a TLB).
    pub const fn is_cache(self) -> bool {
        !matches!(self, Self::Tlb)
    }
}

impl fmt::Display for ComponentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::L1I => "L1I",
            Self::L1D => "L1D",
            Self::L2 => "L2",
            Self::Tlb => "TLB",
        })
    }
}

/// Set associativity of a cache or TLB.
///
/// Serialized as an integer way count or the string `"full"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    /// N-way set associative (1 = direct-mapped).
    Ways(u32),
    /// Fully associative.
    Full,
}

impl fmt::Display for Associativity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ways(n) => write!(f, "{n}"),
            Self::Full => f.write_str("full"),
        }
    }
}

impl Serialize for Associativity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Ways(n) => serializer.serialize_u32(*n),
            Self::Full => serializer.serialize_str("full"),
        }
    }
}

impl<'de> Deserialize<'de> for Associativity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Ways(u32),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Ways(n) => Ok(Self::Ways(n)),
            Raw::Text(t) => match t.to_ascii_lowercase().as_str() {
                "full" | "fully_associative" | "fa" => Ok(Self::Full),
                other => other
                    .parse()
                    .map(Self::Ways)
                    .map_err(|_| serde::de::Error::custom(format!("invalid associativity '{t}'"))),
            },
        }
    }
}

/// Parameter set for one cache or TLB level.
///
/// For caches `size` is in bytes and `block_size` is the line size. For TLBs `size` is the
/// entry count and `block_size` is the page size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Display name (e.g. `"L1ICache"`).
    pub name: String,

    /// Hierarchy level.
    pub level: ComponentLevel,

    /// Capacity: bytes for caches, entries for TLBs.
    #[serde(with = "serde_size")]
    pub size: u64,

    /// Set associativity.
    pub associativity: Associativity,

    /// Line size (caches) or page size (TLBs) in bytes.
    #[serde(with = "serde_size", default = "ComponentSpec::default_block_size")]
    pub block_size: u64,

    /// Tag lookup latency in cycles.
    #[serde(default = "ComponentSpec::default_latency")]
    pub tag_latency: u32,

    /// Data array latency in cycles.
    #[serde(default = "ComponentSpec::default_latency")]
    pub data_latency: u32,

    /// Response latency in cycles.
    #[serde(default = "ComponentSpec::default_latency")]
    pub response_latency: u32,

    /// Outstanding miss capacity (MSHRs).
    #[serde(default = "ComponentSpec::default_mshrs", alias = "mshrs")]
    pub max_outstanding_requests: u32,

    /// Targets coalesced per outstanding request.
    #[serde(default = "ComponentSpec::default_targets", alias = "tgts_per_mshr")]
    pub targets_per_request: u32,

    /// Whether clean lines are written back on eviction.
    #[serde(default)]
    pub writeback_clean: bool,
}

impl ComponentSpec {
    fn default_block_size() -> u64 {
        defaults::CACHE_LINE
    }

    fn default_latency() -> u32 {
        defaults::L1_LATENCY
    }

    fn default_mshrs() -> u32 {
        defaults::L1_MSHRS
    }

    fn default_targets() -> u32 {
        defaults::L1_TARGETS
    }

    fn l1(name: &str, level: ComponentLevel, size: u64) -> Self {
        Self {
            name: name.to_string(),
            level,
            size,
            associativity: Associativity::Ways(defaults::L1_ASSOC),
            block_size: defaults::CACHE_LINE,
            tag_latency: defaults::L1_LATENCY,
            data_latency: defaults::L1_LATENCY,
            response_latency: defaults::L1_LATENCY,
            max_outstanding_requests: defaults::L1_MSHRS,
            targets_per_request: defaults::L1_TARGETS,
            writeback_clean: false,
        }
    }

    /// Baseline L1 instruction cache: 16 KiB, 2-way, 64 B lines, 2-cycle, 4 MSHRs.
    pub fn l1i() -> Self {
        Self::l1("L1ICache", ComponentLevel::L1I, defaults::L1I_SIZE)
    }

    /// Baseline L1 data cache: 64 KiB, 2-way, 64 B lines, 2-cycle, 4 MSHRs.
    pub fn l1d() -> Self {
        Self::l1("L1DCache", ComponentLevel::L1D, defaults::L1D_SIZE)
    }

    /// Baseline unified L2: 256 KiB, 8-way, 64 B lines, 20-cycle, 20 MSHRs, 12 targets.
    pub fn l2() -> Self {
        Self {
            name: "L2Cache".to_string(),
            level: ComponentLevel::L2,
            size: defaults::L2_SIZE,
            associativity: Associativity::Ways(defaults::L2_ASSOC),
            block_size: defaults::CACHE_LINE,
            tag_latency: defaults::L2_LATENCY,
            data_latency: defaults::L2_LATENCY,
            response_latency: defaults::L2_LATENCY,
            max_outstanding_requests: defaults::L2_MSHRS,
            targets_per_request: defaults::L2_TARGETS,
            writeback_clean: false,
        }
    }

    /// Baseline TLB: 64 entries, 4-way, 4 KiB pages.
    pub fn tlb() -> Self {
        Self {
            name: "TLB".to_string(),
            level: ComponentLevel::Tlb,
            size: defaults::TLB_ENTRIES,
            associativity: Associativity::Ways(defaults::TLB_ASSOC),
            block_size: defaults::PAGE_SIZE,
            tag_latency: 1,
            data_latency: 1,
            response_latency: 1,
            max_outstanding_requests: 1,
            targets_per_request: 1,
            writeback_clean: false,
        }
    }

    /// Replaces the capacity (bytes, or entries for a TLB).
    #[must_use]
    pub const fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Replaces the associativity.
    #[must_use]
    pub const fn with_associativity(mut self, associativity: Associativity) -> Self {
        self.associativity = associativity;
        self
    }

    /// Replaces the line (or page) size.
    #[must_use]
    pub const fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets tag, data, and response latency to the same value.
    #[must_use]
    pub const fn with_latency(mut self, cycles: u32) -> Self {
        self.tag_latency = cycles;
        self.data_latency = cycles;
        self.response_latency = cycles;
        self
    }

    /// Replaces the MSHR count.
    #[must_use]
    pub const fn with_mshrs(mut self, mshrs: u32) -> Self {
        self.max_outstanding_requests = mshrs;
        self
    }

    /// Replaces the targets-per-MSHR count.
    #[must_use]
    pub const fn with_targets(mut self, targets: u32) -> Self {
        self.targets_per_request = targets;
        self
    }

    /// Enables or disables clean writebacks.
    #[must_use]
    pub const fn with_writeback_clean(mut self, enabled: bool) -> Self {
        self.writeback_clean = enabled;
        self
    }

    /// Returns the parameters the kernel will actually use.
    ///
    /// Caches take the system-wide line size when one is set. X86 TLBs are always fully
    /// associative over 4 KiB pages, whatever was requested.
    #[must_use]
    pub fn effective(&self, isa: Isa, cache_line_size_override: Option<u64>) -> Self {
        let mut spec = self.clone();
        if self.level.is_cache() {
            if let Some(line) = cache_line_size_override {
                spec.block_size = line;
            }
        } else if isa == Isa::X86 {
            spec.associativity = Associativity::Full;
            spec.block_size = X86_PAGE_SIZE;
        }
        spec
    }

    /// Number of allocation units: lines for caches, entries for TLBs.
    pub const fn capacity_units(&self) -> u64 {
        if self.level.is_cache() {
            if self.block_size == 0 {
                0
            } else {
                self.size / self.block_size
            }
        } else {
            self.size
        }
    }

    /// Number of sets (1 when fully associative).
    pub const fn num_sets(&self) -> u64 {
        match self.associativity {
            Associativity::Full => 1,
            Associativity::Ways(0) => 0,
            Associativity::Ways(n) => self.capacity_units() / n as u64,
        }
    }

    /// Checks the structural invariants of this level.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidParameter`] naming the first violated invariant.
    pub fn validate(&self) -> Result<(), TopologyError> {
        let fail = |reason: String| {
            Err(TopologyError::InvalidParameter {
                component: self.name.clone(),
                reason,
            })
        };

        if self.size == 0 {
            return fail("size must be greater than zero".to_string());
        }
        if !self.block_size.is_power_of_two() {
            return fail(format!(
                "block size {} is not a power of two",
                self.block_size
            ));
        }
        if self.level.is_cache() && self.size % self.block_size != 0 {
            return fail(format!(
                "size {} is not a multiple of the block size {}",
                format_size(self.size),
                self.block_size
            ));
        }
        let units = self.capacity_units();
        if units == 0 {
            return fail("capacity holds no blocks".to_string());
        }
        if let Associativity::Ways(ways) = self.associativity {
            if ways == 0 {
                return fail("associativity must be at least 1".to_string());
            }
            if !ways.is_power_of_two() {
                return fail(format!("associativity {ways} is not a power of two"));
            }
            if u64::from(ways) > units {
                return fail(format!(
                    "associativity {ways} exceeds the {units} available blocks"
                ));
            }
        }
        if self.max_outstanding_requests == 0 {
            return fail("max_outstanding_requests must be greater than zero".to_string());
        }
        if self.targets_per_request == 0 {
            return fail("targets_per_request must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Per-stage superscalar widths of an out-of-order core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineWidths {
    /// Fetch width.
    #[serde(default = "PipelineWidths::default_width")]
    pub fetch: u32,
    /// Decode width.
    #[serde(default = "PipelineWidths::default_width")]
    pub decode: u32,
    /// Rename width.
    #[serde(default = "PipelineWidths::default_width")]
    pub rename: u32,
    /// Dispatch width.
    #[serde(default = "PipelineWidths::default_width")]
    pub dispatch: u32,
    /// Issue width.
    #[serde(default = "PipelineWidths::default_width")]
    pub issue: u32,
    /// Commit width.
    #[serde(default = "PipelineWidths::default_width")]
    pub commit: u32,
}

impl PipelineWidths {
    fn default_width() -> u32 {
        defaults::PIPELINE_WIDTH
    }

    /// Same width for every stage.
    pub const fn uniform(width: u32) -> Self {
        Self {
            fetch: width,
            decode: width,
            rename: width,
            dispatch: width,
            issue: width,
            commit: width,
        }
    }

    fn named(&self) -> [(&'static str, u32); 6] {
        [
            ("fetch", self.fetch),
            ("decode", self.decode),
            ("rename", self.rename),
            ("dispatch", self.dispatch),
            ("issue", self.issue),
            ("commit", self.commit),
        ]
    }
}

impl Default for PipelineWidths {
    fn default() -> Self {
        Self::uniform(defaults::PIPELINE_WIDTH)
    }
}

/// CPU model and microarchitectural knobs forwarded to the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuConfig {
    /// In-order or out-of-order core.
    #[serde(default)]
    pub kind: CpuKind,

    /// Instruction set.
    #[serde(default)]
    pub isa: Isa,

    /// Core clock in hertz (accepts `"2GHz"`).
    #[serde(with = "serde_frequency", default = "CpuConfig::default_clock")]
    pub clock_hz: u64,

    /// Superscalar widths (out-of-order only).
    #[serde(default)]
    pub widths: PipelineWidths,

    /// Hardware threads (SMT when greater than one).
    #[serde(default = "CpuConfig::default_threads")]
    pub threads: u32,

    /// Round-robin SMT fetch/commit policies.
    #[serde(default)]
    pub smt: bool,

    /// Reorder buffer entries.
    #[serde(default = "CpuConfig::default_rob")]
    pub rob_entries: u32,

    /// Physical integer registers.
    #[serde(default = "CpuConfig::default_int_regs")]
    pub phys_int_regs: u32,

    /// Physical floating-point registers.
    #[serde(default = "CpuConfig::default_float_regs")]
    pub phys_float_regs: u32,

    /// Load queue entries.
    #[serde(default = "CpuConfig::default_lq")]
    pub lq_entries: u32,

    /// Store queue entries.
    #[serde(default = "CpuConfig::default_sq")]
    pub sq_entries: u32,

    /// Branch predictor selection.
    #[serde(default)]
    pub branch_predictor: BranchPredictor,
}

impl CpuConfig {
    fn default_clock() -> u64 {
        defaults::CPU_CLOCK_HZ
    }

    fn default_threads() -> u32 {
        defaults::THREADS
    }

    fn default_rob() -> u32 {
        defaults::ROB_ENTRIES
    }

    fn default_int_regs() -> u32 {
        defaults::PHYS_INT_REGS
    }

    fn default_float_regs() -> u32 {
        defaults::PHYS_FLOAT_REGS
    }

    fn default_lq() -> u32 {
        defaults::LQ_ENTRIES
    }

    fn default_sq() -> u32 {
        defaults::SQ_ENTRIES
    }

    /// Default configuration for the given core class.
    pub fn new(kind: CpuKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = |field: String, value: u32| {
            if value == 0 {
                Err(ConfigError::InvalidParameter {
                    field,
                    reason: "must be greater than zero".to_string(),
                })
            } else {
                Ok(())
            }
        };
        if self.clock_hz == 0 {
            return Err(ConfigError::InvalidParameter {
                field: "cpu.clock_hz".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        positive("cpu.threads".to_string(), self.threads)?;
        if self.threads > defaults::MAX_THREADS {
            return Err(ConfigError::InvalidParameter {
                field: "cpu.threads".to_string(),
                reason: format!(
                    "at most {} hardware threads are supported",
                    defaults::MAX_THREADS
                ),
            });
        }
        if self.kind == CpuKind::OutOfOrder {
            for (stage, width) in self.widths.named() {
                positive(format!("cpu.widths.{stage}"), width)?;
            }
            positive("cpu.rob_entries".to_string(), self.rob_entries)?;
            positive("cpu.phys_int_regs".to_string(), self.phys_int_regs)?;
            positive("cpu.phys_float_regs".to_string(), self.phys_float_regs)?;
            positive("cpu.lq_entries".to_string(), self.lq_entries)?;
            positive("cpu.sq_entries".to_string(), self.sq_entries)?;
        } else if self.threads > 1 {
            return Err(ConfigError::InvalidParameter {
                field: "cpu.threads".to_string(),
                reason: "multithreading requires an out-of-order core".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            kind: CpuKind::default(),
            isa: Isa::default(),
            clock_hz: defaults::CPU_CLOCK_HZ,
            widths: PipelineWidths::default(),
            threads: defaults::THREADS,
            smt: false,
            rob_entries: defaults::ROB_ENTRIES,
            phys_int_regs: defaults::PHYS_INT_REGS,
            phys_float_regs: defaults::PHYS_FLOAT_REGS,
            lq_entries: defaults::LQ_ENTRIES,
            sq_entries: defaults::SQ_ENTRIES,
            branch_predictor: BranchPredictor::default(),
        }
    }
}

/// Physical address range served by the memory controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrRange {
    /// First byte address.
    #[serde(default)]
    pub start: u64,
    /// Length in bytes (accepts `"512MB"`).
    #[serde(with = "serde_size")]
    pub size: u64,
}

impl AddrRange {
    /// Range `[0, size)`.
    pub const fn new(size: u64) -> Self {
        Self { start: 0, size }
    }

    /// One past the last byte address (saturating).
    pub const fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }
}

impl fmt::Display for AddrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start, self.end())
    }
}

/// Main memory configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Address range attached to the memory controller.
    #[serde(default = "MemoryConfig::default_range")]
    pub range: AddrRange,

    /// DRAM device model.
    #[serde(default)]
    pub dram: DramKind,
}

impl MemoryConfig {
    fn default_range() -> AddrRange {
        AddrRange::new(defaults::MEMORY_SIZE)
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            range: Self::default_range(),
            dram: DramKind::default(),
        }
    }
}

/// Textual replacement for one default power formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaOverride {
    /// Component class the formula applies to.
    pub class: ComponentClass,
    /// Power state the formula applies to.
    pub state: PowerState,
    /// Dynamic power expression.
    pub dynamic: String,
    /// Static power expression.
    #[serde(rename = "static")]
    pub static_power: String,
}

/// Power model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerConfig {
    /// Attach power models and report power columns.
    #[serde(default)]
    pub enabled: bool,

    /// Supply voltage in volts.
    #[serde(default = "PowerConfig::default_voltage")]
    pub voltage: f64,

    /// Die temperature in degrees Celsius.
    #[serde(default = "PowerConfig::default_temperature")]
    pub temperature: f64,

    /// Also instrument caches (the CPU is always instrumented when enabled).
    ///
    /// When unset, caches get no power model and no power columns. They are left out of the
    /// power totals rather than reported as zero-watt components with a missing-model warning,
    /// so a CPU-only power row can still be `complete`.
    #[serde(default)]
    pub instrument_caches: bool,

    /// Per-(class, state) formula replacements.
    #[serde(default)]
    pub overrides: Vec<FormulaOverride>,
}

impl PowerConfig {
    fn default_voltage() -> f64 {
        defaults::VOLTAGE
    }

    fn default_temperature() -> f64 {
        defaults::TEMPERATURE
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.voltage.is_finite() || self.voltage < 0.0 {
            return Err(ConfigError::InvalidParameter {
                field: "power.voltage".to_string(),
                reason: format!("{} is not a valid supply voltage", self.voltage),
            });
        }
        if !self.temperature.is_finite() {
            return Err(ConfigError::InvalidParameter {
                field: "power.temperature".to_string(),
                reason: "must be finite".to_string(),
            });
        }
        for entry in &self.overrides {
            let _ = Expr::parse(&entry.dynamic)?;
            let _ = Expr::parse(&entry.static_power)?;
        }
        Ok(())
    }
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            voltage: defaults::VOLTAGE,
            temperature: defaults::TEMPERATURE,
            instrument_caches: false,
            overrides: Vec::new(),
        }
    }
}

/// Declarative description of one memory hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Core model.
    #[serde(default)]
    pub cpu: CpuConfig,

    /// Ordered component specs (L1I, L1D, optional L2, optional TLB).
    pub components: Vec<ComponentSpec>,

    /// Insert the L2 between the L1 bus and the system bus.
    #[serde(default)]
    pub enable_l2: bool,

    /// Main memory.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// System-wide line size applied to every cache.
    #[serde(default)]
    pub cache_line_size_override: Option<u64>,
}

impl HierarchyConfig {
    /// First spec at the given level.
    pub fn component(&self, level: ComponentLevel) -> Option<&ComponentSpec> {
        self.components.iter().find(|c| c.level == level)
    }

    /// Mutable access to the first spec at the given level.
    pub fn component_mut(&mut self, level: ComponentLevel) -> Option<&mut ComponentSpec> {
        self.components.iter_mut().find(|c| c.level == level)
    }

    /// Replaces the spec at `spec.level`, or appends it.
    pub fn set_component(&mut self, spec: ComponentSpec) {
        match self.component_mut(spec.level) {
            Some(slot) => *slot = spec,
            None => self.components.push(spec),
        }
    }

    /// Line size caches will actually use.
    pub fn effective_line_size(&self) -> u64 {
        self.cache_line_size_override.unwrap_or_else(|| {
            self.component(ComponentLevel::L1D)
                .map_or(defaults::CACHE_LINE, |c| c.block_size)
        })
    }
}

impl Default for HierarchyConfig {
    /// Baseline two-level hierarchy: L1I 16 KiB, L1D 64 KiB, L2 256 KiB, in-order X86 core.
    fn default() -> Self {
        Self {
            cpu: CpuConfig::default(),
            components: vec![ComponentSpec::l1i(), ComponentSpec::l1d(), ComponentSpec::l2()],
            enable_l2: true,
            memory: MemoryConfig::default(),
            cache_line_size_override: None,
        }
    }
}

/// Root configuration of one experiment.
///
/// # Examples
///
/// ```
/// use hwsweep_core::config::{Associativity, ComponentLevel, ExperimentConfig};
///
/// let json = r#"{
///     "name": "assoc_4",
///     "hierarchy": {
///         "cpu": { "kind": "minor", "clock_hz": "1GHz" },
///         "components": [
///             { "name": "L1ICache", "level": "L1I", "size": "16kB", "associativity": 4 },
///             { "name": "L1DCache", "level": "L1D", "size": "16kB", "associativity": 4 }
///         ],
///         "memory": { "range": { "size": "512MB" } }
///     }
/// }"#;
///
/// let config = ExperimentConfig::from_json_str(json).unwrap();
/// let l1d = config.hierarchy.component(ComponentLevel::L1D).unwrap();
/// assert_eq!(l1d.size, 16 * 1024);
/// assert_eq!(l1d.associativity, Associativity::Ways(4));
/// assert!(!config.hierarchy.enable_l2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Configuration identity; also the result-row key.
    pub name: String,

    /// Hardware description.
    pub hierarchy: HierarchyConfig,

    /// Power modeling.
    #[serde(default)]
    pub power: PowerConfig,
}

impl ExperimentConfig {
    /// Creates a configuration with power modeling disabled.
    pub fn new(name: impl Into<String>, hierarchy: HierarchyConfig) -> Self {
        Self {
            name: name.into(),
            hierarchy,
            power: PowerConfig::default(),
        }
    }

    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed input.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Json`].
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Range checks that must pass before anything is built.
    ///
    /// Component geometry is checked by the topology builder instead.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty()
            || self
                .name
                .chars()
                .any(|c| c == '/' || c == '\\' || c.is_whitespace())
        {
            return Err(ConfigError::InvalidParameter {
                field: "name".to_string(),
                reason: format!("'{}' is not usable as a result key", self.name),
            });
        }
        self.hierarchy.cpu.validate()?;
        if self.hierarchy.memory.range.size == 0 {
            return Err(ConfigError::InvalidParameter {
                field: "memory.range.size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(line) = self.hierarchy.cache_line_size_override {
            if !line.is_power_of_two() {
                return Err(ConfigError::InvalidParameter {
                    field: "cache_line_size_override".to_string(),
                    reason: format!("{line} is not a power of two"),
                });
            }
        }
        self.power.validate()
    }

    /// Every configuration parameter as `(column, value)` pairs, in result-row order.
    pub fn parameters(&self) -> Vec<(String, String)> {
        let h = &self.hierarchy;
        let mut params = vec![
            ("cpu_type".to_string(), h.cpu.kind.to_string()),
            ("isa".to_string(), h.cpu.isa.to_string()),
            ("cpu_clock".to_string(), format_frequency(h.cpu.clock_hz)),
            ("threads".to_string(), h.cpu.threads.to_string()),
            ("enable_l2".to_string(), h.enable_l2.to_string()),
            ("mem_size".to_string(), format_size(h.memory.range.size)),
            ("cache_line_size".to_string(), h.effective_line_size().to_string()),
        ];
        if h.cpu.kind == CpuKind::OutOfOrder {
            for (stage, width) in h.cpu.widths.named() {
                params.push((format!("{stage}_width"), width.to_string()));
            }
        }
        // An L2 without `enable_l2` never reaches the topology, so it gets no columns.
        for spec in h
            .components
            .iter()
            .filter(|c| h.enable_l2 || c.level != ComponentLevel::L2)
        {
            let spec = spec.effective(h.cpu.isa, h.cache_line_size_override);
            let p = spec.level.prefix();
            if spec.level.is_cache() {
                params.push((format!("{p}_size"), format_size(spec.size)));
                params.push((format!("{p}_assoc"), spec.associativity.to_string()));
                params.push((format!("{p}_block_size"), spec.block_size.to_string()));
            } else {
                params.push((format!("{p}_entries"), spec.size.to_string()));
                params.push((format!("{p}_assoc"), spec.associativity.to_string()));
                params.push(("page_size".to_string(), format_size(spec.block_size)));
            }
            params.push((format!("{p}_tag_latency"), spec.tag_latency.to_string()));
            params.push((format!("{p}_data_latency"), spec.data_latency.to_string()));
            params.push((
                format!("{p}_response_latency"),
                spec.response_latency.to_string(),
            ));
            params.push((
                format!("{p}_mshrs"),
                spec.max_outstanding_requests.to_string(),
            ));
            params.push((
                format!("{p}_tgts_per_mshr"),
                spec.targets_per_request.to_string(),
            ));
        }
        if self.power.enabled {
            params.push(("voltage".to_string(), self.power.voltage.to_string()));
            params.push(("temperature".to_string(), self.power.temperature.to_string()));
        }
        params
    }
}
