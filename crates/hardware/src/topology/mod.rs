//! Memory-hierarchy topology synthesis.
//!
//! Turns a declarative [`HierarchyConfig`](crate::config::HierarchyConfig) into a validated
//! component graph with every port wired. Construction is all-or-nothing.

/// Graph synthesis from configuration.
pub mod builder;

/// Nodes, ports, edges, and whole-graph validation.
pub mod graph;

pub use builder::build;
pub use graph::{
    BusKind, ComponentRole, Edge, Endpoint, InstrumentedComponent, Multiplicity, Node, NodeKind,
    Port, PortRole, TlbSide, TopologyGraph,
};
