//! Topology synthesis from a hierarchy description.
//!
//! The builder performs:
//! 1. **Core:** Adds `system` and `system.cpu` with its instruction and data ports.
//! 2. **L1s:** One cache per CPU port, bound CPU port → `cpu_side`.
//! 3. **Buses:** `system.l2bus` + `system.l2cache` + `system.membus` with an L2, otherwise the
//!    L1s bind straight to `system.membus`.
//! 4. **MMU:** Instruction and data TLB nodes under `system.cpu.mmu`.
//! 5. **Interrupts and memory:** Per-thread X86 interrupt controllers, the memory controller, and
//!    the system port, followed by whole-graph validation.

use crate::common::error::TopologyError;
use crate::common::size::format_size;
use crate::config::{
    Associativity, ComponentLevel, ComponentSpec, CpuConfig, HierarchyConfig, Isa, MemoryConfig,
    X86_PAGE_SIZE,
};

use super::graph::{BusKind, NodeKind, TlbSide, TopologyGraph};

const SYSTEM: &str = "system";
const CPU: &str = "system.cpu";
const L2_BUS: &str = "system.l2bus";
const L2_CACHE: &str = "system.l2cache";
const MEM_BUS: &str = "system.membus";
const MEM_CTRL: &str = "system.mem_ctrl";
const ITB: &str = "system.cpu.mmu.itb";
const DTB: &str = "system.cpu.mmu.dtb";

impl TopologyGraph {
    /// Builds the graph for a hierarchy configuration.
    ///
    /// # Errors
    ///
    /// See [`build`].
    pub fn from_config(config: &HierarchyConfig) -> Result<Self, TopologyError> {
        build(
            &config.cpu,
            &config.components,
            config.enable_l2,
            &config.memory,
            config.cache_line_size_override,
        )
    }
}

/// Synthesizes and validates a component graph.
///
/// # Arguments
///
/// * `cpu` - Core model; the ISA decides interrupt wiring and TLB behaviour.
/// * `cache_specs` - Ordered L1I / L1D / L2 / TLB specs.
/// * `enable_l2` - Insert the L2 between the L1 bus and the system bus.
/// * `memory` - Range and DRAM model attached to the memory controller.
/// * `cache_line_size_override` - System-wide line size replacing every cache's block size.
///
/// # Returns
///
/// The validated graph, or the first construction error. No partial graph is returned.
///
/// # Errors
///
/// * [`TopologyError::InvalidParameter`] when a spec violates its invariants.
/// * [`TopologyError::InvalidHierarchy`] when `enable_l2` is set without an L2 spec, or a level
///   that must be unique appears twice.
/// * [`TopologyError::UnboundPort`] when an L1 is missing.
/// * [`TopologyError::ConflictingBinding`] when two caches claim the same CPU port.
pub fn build(
    cpu: &CpuConfig,
    cache_specs: &[ComponentSpec],
    enable_l2: bool,
    memory: &MemoryConfig,
    cache_line_size_override: Option<u64>,
) -> Result<TopologyGraph, TopologyError> {
    let mut graph = TopologyGraph::new();

    let mut specs = Vec::with_capacity(cache_specs.len());
    for requested in cache_specs {
        if !requested.level.is_cache() {
            requested.validate()?;
        }
        let spec = requested.effective(cpu.isa, cache_line_size_override);
        spec.validate()?;
        specs.push(spec);
    }

    let l2_specs: Vec<&ComponentSpec> = specs
        .iter()
        .filter(|s| s.level == ComponentLevel::L2)
        .collect();
    if l2_specs.len() > 1 {
        return Err(TopologyError::InvalidHierarchy(
            "more than one L2 spec".to_string(),
        ));
    }
    let l2 = match (enable_l2, l2_specs.first()) {
        (true, Some(spec)) => Some(*spec),
        (true, None) => {
            return Err(TopologyError::InvalidHierarchy(
                "L2 enabled but no L2 spec given".to_string(),
            ));
        }
        (false, Some(spec)) => {
            tracing::debug!(component = %spec.name, "L2 spec ignored: L2 disabled");
            None
        }
        (false, None) => None,
    };

    graph.add_node(SYSTEM, NodeKind::System)?;
    graph.add_node(CPU, NodeKind::Cpu(cpu.clone()))?;

    let first_bus = if l2.is_some() { L2_BUS } else { MEM_BUS };
    graph.add_node(
        first_bus,
        NodeKind::Bus {
            bus: if l2.is_some() {
                BusKind::L2Crossbar
            } else {
                BusKind::SystemCrossbar
            },
        },
    )?;

    for spec in specs.iter().filter(|s| {
        matches!(s.level, ComponentLevel::L1I | ComponentLevel::L1D)
    }) {
        let (base, cpu_port) = if spec.level == ComponentLevel::L1I {
            ("system.cpu.icache", "icache_port")
        } else {
            ("system.cpu.dcache", "dcache_port")
        };
        let path = unique_path(&graph, base);
        graph.add_node(path.as_str(), NodeKind::Cache(spec.clone()))?;
        graph.bind((CPU, cpu_port), (&path, "cpu_side"))?;
        graph.bind((&path, "mem_side"), (first_bus, "cpu_side_ports"))?;
    }

    if let Some(spec) = l2 {
        graph.add_node(L2_CACHE, NodeKind::Cache(spec.clone()))?;
        graph.add_node(
            MEM_BUS,
            NodeKind::Bus {
                bus: BusKind::SystemCrossbar,
            },
        )?;
        graph.bind((L2_BUS, "mem_side_ports"), (L2_CACHE, "cpu_side"))?;
        graph.bind((L2_CACHE, "mem_side"), (MEM_BUS, "cpu_side_ports"))?;
    }

    let tlbs: Vec<&ComponentSpec> = specs
        .iter()
        .filter(|s| s.level == ComponentLevel::Tlb)
        .collect();
    match tlbs.as_slice() {
        [] => {}
        [spec] => add_tlbs(&mut graph, cpu.isa, spec, cache_specs)?,
        _ => {
            return Err(TopologyError::InvalidHierarchy(
                "more than one TLB spec".to_string(),
            ));
        }
    }

    if cpu.isa == Isa::X86 {
        for thread in 0..cpu.threads {
            let path = format!("system.cpu.interrupts{thread}");
            graph.add_node(path.as_str(), NodeKind::InterruptController { thread })?;
            graph.bind((MEM_BUS, "mem_side_ports"), (&path, "pio"))?;
            graph.bind((&path, "int_requestor"), (MEM_BUS, "cpu_side_ports"))?;
            graph.bind((MEM_BUS, "mem_side_ports"), (&path, "int_responder"))?;
        }
    }

    graph.add_node(
        MEM_CTRL,
        NodeKind::MemoryController {
            range: memory.range,
            dram: memory.dram,
        },
    )?;
    graph.bind((MEM_BUS, "mem_side_ports"), (MEM_CTRL, "port"))?;
    graph.bind((SYSTEM, "system_port"), (MEM_BUS, "cpu_side_ports"))?;

    graph.validate(&memory.range)?;
    tracing::debug!(
        nodes = graph.nodes().len(),
        edges = graph.edges().len(),
        l2 = l2.is_some(),
        "topology built"
    );
    Ok(graph)
}

/// `base`, or `base1`, `base2`, ... when taken.
fn unique_path(graph: &TopologyGraph, base: &str) -> String {
    if !graph.contains(base) {
        return base.to_string();
    }
    (1..)
        .map(|i| format!("{base}{i}"))
        .find(|p| !graph.contains(p))
        .unwrap_or_else(|| base.to_string())
}

fn add_tlbs(
    graph: &mut TopologyGraph,
    isa: Isa,
    effective: &ComponentSpec,
    requested: &[ComponentSpec],
) -> Result<(), TopologyError> {
    if isa == Isa::X86 {
        if let Some(asked) = requested.iter().find(|s| s.level == ComponentLevel::Tlb) {
            if asked.associativity != Associativity::Full || asked.block_size != X86_PAGE_SIZE {
                graph.warn(format!(
                    "X86 TLBs are fully associative over {} pages; requested {}-way with {} pages has no effect",
                    format_size(X86_PAGE_SIZE),
                    asked.associativity,
                    format_size(asked.block_size)
                ));
            }
        }
    }
    graph.add_node(
        ITB,
        NodeKind::Tlb {
            side: TlbSide::Instruction,
            spec: effective.clone(),
        },
    )?;
    graph.add_node(
        DTB,
        NodeKind::Tlb {
            side: TlbSide::Data,
            spec: effective.clone(),
        },
    )
}
