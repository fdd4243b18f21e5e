//! Graph nodes and their capability flags.
//!
//! Nodes live in the graph's arena and are referred to by [`NodeId`]
//! handles. Input edges are ordered and owned by the consuming node; usage
//! edges are the reverse index, maintained by the graph, with no ownership
//! implications. Fixed nodes additionally carry control successor edges and
//! their reverse index (predecessors).

use bitflags::bitflags;

use crate::ir::ops::NodeOp;
use crate::ir::stamp::Stamp;

/// Handle for a node in a [`crate::ir::Graph`] arena.
///
/// Ids are assigned in creation order and never reused, which makes them a
/// stable tie-breaker wherever the scheduler needs a deterministic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The arena index of this handle.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Whether a node has an intrinsic position in control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// The node is part of the fixed control-flow skeleton.
    Fixed,
    /// The node produces a value and is placed by the scheduler.
    Floating,
}

bitflags! {
    /// Optional capabilities a node's operation implements.
    ///
    /// Resolved once from [`NodeOp::flags`] at creation; the canonicalizer
    /// and lowering pipeline dispatch on these instead of matching every
    /// operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// The node can rewrite itself into lower-level nodes.
        const LOWERABLE = 1 << 0;
        /// The node can rewrite itself from local information alone.
        const CANONICALIZABLE = 1 << 1;
        /// The node can rewrite itself given the full provider toolset.
        const SIMPLIFIABLE = 1 << 2;
        /// The node can be folded when its input is a tracked synthetic
        /// object.
        const VIRTUALIZABLE = 1 << 3;
        /// The node is a speculative guard.
        const GUARD = 1 << 4;
    }
}

/// A node in the graph: operation, stamp, and its edges.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) op: NodeOp,
    pub(crate) stamp: Stamp,
    pub(crate) inputs: Vec<NodeId>,
    pub(crate) successors: Vec<NodeId>,
    pub(crate) usages: Vec<NodeId>,
    pub(crate) preds: Vec<NodeId>,
}

impl Node {
    /// The node's operation.
    #[must_use]
    pub fn op(&self) -> &NodeOp {
        &self.op
    }

    /// The node's stamp.
    #[must_use]
    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    /// The ordered input edges.
    #[must_use]
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// The control successor edges (fixed nodes only; empty otherwise).
    #[must_use]
    pub fn successors(&self) -> &[NodeId] {
        &self.successors
    }

    /// The nodes that consume this node as an input.
    #[must_use]
    pub fn usages(&self) -> &[NodeId] {
        &self.usages
    }

    /// The control predecessor edges (fixed nodes only; empty otherwise).
    #[must_use]
    pub fn preds(&self) -> &[NodeId] {
        &self.preds
    }

    /// Whether the node is fixed or floating.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.op.kind()
    }

    /// The node's capability flags.
    #[must_use]
    pub fn flags(&self) -> NodeFlags {
        self.op.flags()
    }

    /// Whether the node implements the given capability.
    #[must_use]
    pub fn has_flag(&self, flag: NodeFlags) -> bool {
        self.op.flags().contains(flag)
    }
}
