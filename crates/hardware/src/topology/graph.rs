//! Component graph: nodes, ports, and request edges.
//!
//! Nodes are addressed by dotted paths (`system.cpu.dcache`). Every node declares its ports up
//! front; edges may only connect a requestor port to a responder port, and a single-peer port
//! accepts exactly one edge. [`TopologyGraph::validate`] checks the finished graph as a whole.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::common::error::TopologyError;
use crate::common::size::format_size;
use crate::config::{AddrRange, ComponentLevel, ComponentSpec, CpuConfig, DramKind};

/// Direction of a port relative to request flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortRole {
    /// Issues requests (downstream-facing).
    Requestor,
    /// Receives requests (upstream-facing).
    Responder,
}

/// How many peers a port accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    /// Exactly one peer.
    Single,
    /// One or more peers.
    Vector,
}

/// A named connection point on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Port {
    /// Port name (e.g. `cpu_side`).
    pub name: &'static str,
    /// Request direction.
    pub role: PortRole,
    /// Peer count rule.
    pub multiplicity: Multiplicity,
}

impl Port {
    const fn single(name: &'static str, role: PortRole) -> Self {
        Self {
            name,
            role,
            multiplicity: Multiplicity::Single,
        }
    }

    const fn vector(name: &'static str, role: PortRole) -> Self {
        Self {
            name,
            role,
            multiplicity: Multiplicity::Vector,
        }
    }
}

/// Crossbar flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BusKind {
    /// Crossbar between the L1s and the L2.
    L2Crossbar,
    /// System crossbar in front of the memory controller.
    SystemCrossbar,
}

/// Which side of the MMU a TLB serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TlbSide {
    /// Instruction TLB (`itb`).
    Instruction,
    /// Data TLB (`dtb`).
    Data,
}

/// Node payload, serialized with a `type` tag for the kernel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Root container.
    System,
    /// The core.
    Cpu(CpuConfig),
    /// One cache level (effective parameters).
    Cache(ComponentSpec),
    /// One TLB (effective parameters).
    Tlb {
        /// Instruction or data side.
        side: TlbSide,
        /// Effective geometry.
        spec: ComponentSpec,
    },
    /// A crossbar.
    Bus {
        /// Crossbar flavour.
        bus: BusKind,
    },
    /// DRAM controller.
    MemoryController {
        /// Served address range.
        range: AddrRange,
        /// DRAM device model.
        dram: DramKind,
    },
    /// Per-thread interrupt controller (X86 only).
    InterruptController {
        /// Hardware thread index.
        thread: u32,
    },
}

impl NodeKind {
    /// Ports declared by nodes of this kind.
    pub fn ports(&self) -> Vec<Port> {
        use PortRole::{Requestor, Responder};
        match self {
            Self::System => vec![Port::single("system_port", Requestor)],
            Self::Cpu(_) => vec![
                Port::single("icache_port", Requestor),
                Port::single("dcache_port", Requestor),
            ],
            Self::Cache(_) => vec![
                Port::single("cpu_side", Responder),
                Port::single("mem_side", Requestor),
            ],
            Self::Tlb { .. } => Vec::new(),
            Self::Bus { .. } => vec![
                Port::vector("cpu_side_ports", Responder),
                Port::vector("mem_side_ports", Requestor),
            ],
            Self::MemoryController { .. } => vec![Port::single("port", Responder)],
            Self::InterruptController { .. } => vec![
                Port::single("pio", Responder),
                Port::single("int_requestor", Requestor),
                Port::single("int_responder", Responder),
            ],
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::System => "System",
            Self::Cpu(_) => "CPU",
            Self::Cache(_) => "Cache",
            Self::Tlb { .. } => "TLB",
            Self::Bus { bus: BusKind::L2Crossbar } => "L2XBar",
            Self::Bus { bus: BusKind::SystemCrossbar } => "SystemXBar",
            Self::MemoryController { .. } => "MemCtrl",
            Self::InterruptController { .. } => "Interrupts",
        }
    }
}

/// One component in the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    /// Dotted path (`system.cpu.icache`).
    pub path: String,
    /// Payload.
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Declared ports.
    pub ports: Vec<Port>,
}

impl Node {
    /// Looks up a declared port.
    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }
}

/// One end of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    /// Node path.
    pub node: String,
    /// Port name.
    pub port: String,
}

impl Endpoint {
    /// Creates an endpoint from a node path and port name.
    pub fn new(node: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.port)
    }
}

/// Directed request edge from a requestor port to a responder port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    /// Requesting side.
    pub from: Endpoint,
    /// Responding side.
    pub to: Endpoint,
}

/// What a power model or metric row is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentRole {
    /// The core.
    Cpu,
    /// A cache at the given level.
    Cache(ComponentLevel),
    /// Instruction-side TLB.
    InstructionTlb,
    /// Data-side TLB.
    DataTlb,
}

/// A graph component whose counters are reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentedComponent {
    /// Node path; counter keys are `<path>.<name>`.
    pub path: String,
    /// Role in the hierarchy.
    pub role: ComponentRole,
}

impl InstrumentedComponent {
    /// Creates an entry.
    pub fn new(path: impl Into<String>, role: ComponentRole) -> Self {
        Self {
            path: path.into(),
            role,
        }
    }

    /// Short column prefix (`icache`, `dcache`, `l2`, `itlb`, `dtlb`, `cpu`).
    pub const fn label(&self) -> &'static str {
        match self.role {
            ComponentRole::Cpu => "cpu",
            ComponentRole::Cache(ComponentLevel::L1I) => "icache",
            ComponentRole::Cache(ComponentLevel::L1D) => "dcache",
            ComponentRole::Cache(ComponentLevel::L2) => "l2",
            ComponentRole::Cache(ComponentLevel::Tlb) | ComponentRole::DataTlb => "dtlb",
            ComponentRole::InstructionTlb => "itlb",
        }
    }
}

/// Validated component graph of one experiment.
///
/// Built by [`build`](super::build); immutable once returned.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TopologyGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    warnings: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    #[serde(skip)]
    bindings: HashMap<Endpoint, usize>,
}

impl TopologyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with the ports its kind declares.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidHierarchy`] if the path is already taken.
    pub fn add_node(&mut self, path: impl Into<String>, kind: NodeKind) -> Result<(), TopologyError> {
        let path = path.into();
        if self.index.contains_key(&path) {
            return Err(TopologyError::InvalidHierarchy(format!(
                "duplicate node '{path}'"
            )));
        }
        let ports = kind.ports();
        let _ = self.index.insert(path.clone(), self.nodes.len());
        self.nodes.push(Node { path, kind, ports });
        Ok(())
    }

    /// Connects `requestor` to `responder`.
    ///
    /// # Arguments
    ///
    /// * `requestor` - `(node path, port name)` of the requesting side.
    /// * `responder` - `(node path, port name)` of the responding side.
    ///
    /// # Errors
    ///
    /// * [`TopologyError::UnknownPort`] if either node or port does not exist.
    /// * [`TopologyError::RoleMismatch`] if the roles are not requestor then responder.
    /// * [`TopologyError::ConflictingBinding`] if a single-peer port is already bound.
    pub fn bind(
        &mut self,
        requestor: (&str, &str),
        responder: (&str, &str),
    ) -> Result<(), TopologyError> {
        let from = self.lookup_port(requestor.0, requestor.1)?;
        let to = self.lookup_port(responder.0, responder.1)?;
        let from_ep = Endpoint::new(requestor.0, requestor.1);
        let to_ep = Endpoint::new(responder.0, responder.1);

        if from.role != PortRole::Requestor || to.role != PortRole::Responder {
            return Err(TopologyError::RoleMismatch {
                from: from_ep.to_string(),
                to: to_ep.to_string(),
            });
        }
        for (port, ep) in [(from, &from_ep), (to, &to_ep)] {
            if port.multiplicity == Multiplicity::Single && self.binding_count(ep) > 0 {
                return Err(TopologyError::ConflictingBinding {
                    node: ep.node.clone(),
                    port: ep.port.clone(),
                });
            }
        }

        tracing::trace!(from = %from_ep, to = %to_ep, "bind");
        *self.bindings.entry(from_ep.clone()).or_default() += 1;
        *self.bindings.entry(to_ep.clone()).or_default() += 1;
        self.edges.push(Edge {
            from: from_ep,
            to: to_ep,
        });
        Ok(())
    }

    fn lookup_port(&self, node: &str, port: &str) -> Result<Port, TopologyError> {
        self.node(node)
            .and_then(|n| n.port(port))
            .copied()
            .ok_or_else(|| TopologyError::UnknownPort {
                node: node.to_string(),
                port: port.to_string(),
            })
    }

    /// Records a non-fatal construction note (e.g. an ignored parameter).
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.warnings.push(message);
    }

    /// Number of edges touching the given endpoint.
    pub fn binding_count(&self, endpoint: &Endpoint) -> usize {
        self.bindings.get(endpoint).copied().unwrap_or_default()
    }

    /// Whole-graph checks run after construction.
    ///
    /// 1. Every single port is bound exactly once and every vector port at least once.
    /// 2. Exactly one memory controller serves `memory_range`.
    /// 3. Every request path from the CPU ends at the memory controller without revisiting a node.
    ///
    /// # Errors
    ///
    /// Returns the first violated check as a [`TopologyError`].
    pub fn validate(&self, memory_range: &AddrRange) -> Result<(), TopologyError> {
        for node in &self.nodes {
            for port in &node.ports {
                let count = self.binding_count(&Endpoint::new(node.path.as_str(), port.name));
                let ok = match port.multiplicity {
                    Multiplicity::Single => count == 1,
                    Multiplicity::Vector => count >= 1,
                };
                if !ok {
                    let err = if count == 0 {
                        TopologyError::UnboundPort {
                            node: node.path.clone(),
                            port: port.name.to_string(),
                        }
                    } else {
                        TopologyError::ConflictingBinding {
                            node: node.path.clone(),
                            port: port.name.to_string(),
                        }
                    };
                    return Err(err);
                }
            }
        }

        let controllers: Vec<&Node> = self
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::MemoryController { .. }))
            .collect();
        let mem_ctrl = match controllers.as_slice() {
            [one] => *one,
            [] => {
                return Err(TopologyError::InvalidHierarchy(
                    "no memory controller".to_string(),
                ));
            }
            _ => {
                return Err(TopologyError::InvalidHierarchy(
                    "more than one memory controller".to_string(),
                ));
            }
        };
        if let NodeKind::MemoryController { range, .. } = &mem_ctrl.kind {
            if range != memory_range {
                return Err(TopologyError::MemoryRangeMismatch {
                    expected: memory_range.to_string(),
                    actual: range.to_string(),
                });
            }
        }

        let cpu = self
            .cpu()
            .ok_or_else(|| TopologyError::InvalidHierarchy("no CPU node".to_string()))?;
        let mut on_path = HashSet::new();
        let mut done = HashSet::new();
        self.walk(&cpu.path, &mem_ctrl.path, &mut on_path, &mut done)
    }

    /// Depth-first walk of the request path. Interrupt controllers are endpoints, not hops.
    fn walk<'a>(
        &'a self,
        node: &'a str,
        target: &str,
        on_path: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<(), TopologyError> {
        if node == target || done.contains(node) {
            return Ok(());
        }
        if !on_path.insert(node) {
            return Err(TopologyError::Cycle(node.to_string()));
        }
        let next: Vec<&str> = self
            .edges
            .iter()
            .filter(|e| e.from.node == node)
            .map(|e| e.to.node.as_str())
            .filter(|to| {
                !matches!(
                    self.node(to).map(|n| &n.kind),
                    Some(NodeKind::InterruptController { .. })
                )
            })
            .collect();
        if next.is_empty() {
            return Err(TopologyError::Unreachable(node.to_string()));
        }
        for to in next {
            self.walk(to, target, on_path, done)?;
        }
        let _ = on_path.remove(node);
        let _ = done.insert(node);
        Ok(())
    }

    /// Node at `path`, if any.
    pub fn node(&self, path: &str) -> Option<&Node> {
        self.index.get(path).map(|&i| &self.nodes[i])
    }

    /// Whether a node exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All edges in binding order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Construction warnings.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Peers bound to `(node, port)`, in binding order.
    pub fn peers(&self, node: &str, port: &str) -> Vec<&Endpoint> {
        let ep = Endpoint::new(node, port);
        self.edges
            .iter()
            .filter_map(|e| {
                if e.from == ep {
                    Some(&e.to)
                } else if e.to == ep {
                    Some(&e.from)
                } else {
                    None
                }
            })
            .collect()
    }

    /// The CPU node.
    pub fn cpu(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| matches!(n.kind, NodeKind::Cpu(_)))
    }

    /// Cache nodes in insertion order.
    pub fn caches(&self) -> impl Iterator<Item = (&str, &ComponentSpec)> {
        self.nodes.iter().filter_map(|n| match &n.kind {
            NodeKind::Cache(spec) => Some((n.path.as_str(), spec)),
            _ => None,
        })
    }

    /// Components whose counters are reported: CPU, caches, then TLBs.
    pub fn instrumented_components(&self) -> Vec<InstrumentedComponent> {
        let mut out = Vec::new();
        for node in &self.nodes {
            let role = match &node.kind {
                NodeKind::Cpu(_) => ComponentRole::Cpu,
                NodeKind::Cache(spec) => ComponentRole::Cache(spec.level),
                NodeKind::Tlb {
                    side: TlbSide::Instruction,
                    ..
                } => ComponentRole::InstructionTlb,
                NodeKind::Tlb {
                    side: TlbSide::Data,
                    ..
                } => ComponentRole::DataTlb,
                _ => continue,
            };
            out.push(InstrumentedComponent::new(node.path.as_str(), role));
        }
        out
    }

    /// Pretty JSON handed to the simulation kernel.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for TopologyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Nodes ({}):", self.nodes.len())?;
        for node in &self.nodes {
            write!(f, "  {:<28} {:<12}", node.path, node.kind.label())?;
            match &node.kind {
                NodeKind::Cache(spec) => write!(
                    f,
                    " {} {}-way {}B lines, {}cyc",
                    format_size(spec.size),
                    spec.associativity,
                    spec.block_size,
                    spec.data_latency
                )?,
                NodeKind::Tlb { spec, .. } => write!(
                    f,
                    " {} entries {}-way, {} pages",
                    spec.size,
                    spec.associativity,
                    format_size(spec.block_size)
                )?,
                NodeKind::Cpu(cpu) => write!(f, " {} {} x{}", cpu.isa, cpu.kind, cpu.threads)?,
                NodeKind::MemoryController { range, .. } => write!(f, " {range}")?,
                _ => {}
            }
            writeln!(f)?;
        }
        writeln!(f, "Edges ({}):", self.edges.len())?;
        for edge in &self.edges {
            writeln!(f, "  {} -> {}", edge.from, edge.to)?;
        }
        for w in &self.warnings {
            writeln!(f, "warning: {w}")?;
        }
        Ok(())
    }
}
