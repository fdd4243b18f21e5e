//! Floating-node placement and per-block node ordering.
//!
//! Fixed nodes already have a position; the scheduler's job is to pick a
//! block for every live floating node and a total order inside each block.
//! The *latest* block of a node is the deepest block dominating all of its
//! usages (phi usages count at the corresponding predecessor block, not at
//! the merge); the *earliest* block is the deepest block among its inputs.
//! The earliest block must dominate the latest one, or the graph is
//! malformed and scheduling aborts. Phis are pinned to their merge block;
//! guards float like any other value, bounded below by their anchor input
//! and by their condition. The placement policy only moves unpinned values
//! between their earliest and latest legal blocks.

use std::collections::HashMap;

use crate::ir::{Graph, NodeId, NodeKind, NodeOp};
use crate::schedule::block::BlockId;
use crate::schedule::cfg::ControlFlowGraph;
use crate::utils::BitSet;
use crate::Result;

/// Placement policy for floating nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingMode {
    /// Hoist values to the earliest block their inputs allow.
    Earliest,
    /// Sink values to the latest block their usages allow.
    #[default]
    Latest,
}

/// A complete schedule: blocks, dominance trees, and a totally ordered node
/// list per block.
pub struct Schedule {
    cfg: ControlFlowGraph,
    placement: HashMap<NodeId, BlockId>,
    block_nodes: Vec<Vec<NodeId>>,
}

impl Schedule {
    /// Schedules the graph under the given placement policy.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnschedulableNode`] if a floating node admits
    /// no placement consistent with dominance, or an invariant violation if
    /// the fixed skeleton itself is malformed.
    pub fn build(graph: &Graph, mode: SchedulingMode) -> Result<Self> {
        let cfg = ControlFlowGraph::build(graph)?;
        let mut placer = Placer {
            graph,
            cfg: &cfg,
            latest_memo: HashMap::new(),
            in_progress: BitSet::new(),
        };

        let mut placement: HashMap<NodeId, BlockId> = HashMap::new();
        for node in graph.node_ids() {
            if graph.node(node).kind() != NodeKind::Floating {
                continue;
            }
            let Some(latest) = placer.latest(node)? else {
                // No live scheduled usage reaches this node; it is dead and
                // gets no placement.
                continue;
            };
            let chosen = if placer.is_pinned(node) {
                latest
            } else {
                let earliest = placer.earliest(node)?;
                if !cfg.dominates(earliest, latest) {
                    return Err(crate::Error::UnschedulableNode(format!(
                        "{node}: earliest block {earliest} does not dominate latest block {latest}"
                    )));
                }
                match mode {
                    SchedulingMode::Earliest => earliest,
                    SchedulingMode::Latest => latest,
                }
            };
            placement.insert(node, chosen);
        }

        let block_nodes = order_blocks(graph, &cfg, &placement);
        Ok(Self {
            cfg,
            placement,
            block_nodes,
        })
    }

    /// The control-flow graph this schedule was computed over.
    #[must_use]
    pub fn cfg(&self) -> &ControlFlowGraph {
        &self.cfg
    }

    /// The totally ordered nodes of a block: fixed nodes in control order
    /// with each floating node placed before its first consumer.
    #[must_use]
    pub fn nodes_for(&self, block: BlockId) -> &[NodeId] {
        &self.block_nodes[block.index()]
    }

    /// The block a node was assigned to.
    ///
    /// Fixed nodes answer their skeleton block; floating nodes their
    /// placement; dead floating nodes and unreachable fixed nodes answer
    /// `None`.
    #[must_use]
    pub fn block_for(&self, node: NodeId) -> Option<BlockId> {
        self.placement
            .get(&node)
            .copied()
            .or_else(|| self.cfg.block_of(node))
    }
}

struct Placer<'a> {
    graph: &'a Graph,
    cfg: &'a ControlFlowGraph,
    latest_memo: HashMap<NodeId, Option<BlockId>>,
    in_progress: BitSet,
}

impl Placer<'_> {
    /// Phis execute at their merge and may not be moved by the placement
    /// policy. Guards are not pinned: their anchor is an ordinary input, so
    /// `earliest` already keeps them at or below the anchor block even when
    /// the condition is defined deeper.
    fn is_pinned(&self, node: NodeId) -> bool {
        matches!(self.graph.node(node).op(), NodeOp::Phi)
    }

    /// The deepest block dominating every usage of `node`, or `None` for a
    /// node nothing live consumes.
    fn latest(&mut self, node: NodeId) -> Result<Option<BlockId>> {
        if self.graph.node(node).kind() == NodeKind::Fixed {
            return Ok(self.cfg.block_of(node));
        }
        if let Some(&memo) = self.latest_memo.get(&node) {
            return Ok(memo);
        }
        if matches!(self.graph.node(node).op(), NodeOp::Phi) {
            let merge = self.graph.node(node).inputs()[0];
            let block = self.cfg.block_of(merge);
            self.latest_memo.insert(node, block);
            return Ok(block);
        }
        if self.in_progress.contains(node.index()) {
            return Err(invariant_error!(
                "cycle through floating node {node} while scheduling"
            ));
        }
        self.in_progress.insert(node.index());

        let mut result: Option<BlockId> = None;
        let users = self.graph.node(node).usages().to_vec();
        for user in users {
            for block in self.usage_blocks(node, user)? {
                result = Some(match result {
                    None => block,
                    Some(current) => self.cfg.common_dominator(current, block),
                });
            }
        }

        self.in_progress.remove(node.index());
        self.latest_memo.insert(node, result);
        Ok(result)
    }

    /// The blocks where `user`'s consumption of `node` takes effect.
    ///
    /// A phi consumes each value input at the end of the corresponding
    /// merge predecessor, not at the merge itself.
    fn usage_blocks(&mut self, node: NodeId, user: NodeId) -> Result<Vec<BlockId>> {
        if matches!(self.graph.node(user).op(), NodeOp::Phi) {
            let merge = self.graph.node(user).inputs()[0];
            let ends = self.graph.node(merge).inputs().to_vec();
            let mut blocks = Vec::new();
            for (slot, &value) in self.graph.node(user).inputs().iter().enumerate().skip(1) {
                if value == node {
                    if let Some(block) = self.cfg.block_of(ends[slot - 1]) {
                        blocks.push(block);
                    }
                }
            }
            return Ok(blocks);
        }
        match self.latest(user)? {
            Some(block) => Ok(vec![block]),
            None => Ok(Vec::new()),
        }
    }

    /// The deepest block among the node's inputs; values cannot float above
    /// the blocks producing their inputs.
    fn earliest(&mut self, node: NodeId) -> Result<BlockId> {
        let mut deepest = self.cfg.entry();
        let inputs = self.graph.node(node).inputs().to_vec();
        for input in inputs {
            let block = match self.graph.node(input).kind() {
                NodeKind::Fixed => self.cfg.block_of(input),
                NodeKind::Floating => {
                    if self.is_pinned(input) {
                        self.latest(input)?
                    } else {
                        Some(self.earliest(input)?)
                    }
                }
            };
            let Some(block) = block else {
                return Err(crate::Error::UnschedulableNode(format!(
                    "{node}: input {input} has no block"
                )));
            };
            if self.cfg.dominates(deepest, block) {
                deepest = block;
            } else if !self.cfg.dominates(block, deepest) {
                return Err(crate::Error::UnschedulableNode(format!(
                    "{node}: inputs on dominance-incomparable blocks"
                )));
            }
        }
        Ok(deepest)
    }
}

/// Builds the per-block total order: fixed nodes in control order, each
/// same-block floating dependency emitted before its first consumer, and
/// any floating node not consumed in its own block emitted before the
/// terminator.
fn order_blocks(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    placement: &HashMap<NodeId, BlockId>,
) -> Vec<Vec<NodeId>> {
    let mut floats_per_block: Vec<Vec<NodeId>> = vec![Vec::new(); cfg.block_count()];
    for node in graph.node_ids() {
        if let Some(&block) = placement.get(&node) {
            floats_per_block[block.index()].push(node);
        }
    }

    let mut result = Vec::with_capacity(cfg.block_count());
    for block in cfg.blocks() {
        let mut order = Vec::new();
        let mut emitted = BitSet::new();
        for &fixed in block.fixed() {
            if fixed == block.end() {
                for &float in &floats_per_block[block.id().index()] {
                    emit_floating(graph, block.id(), placement, float, &mut emitted, &mut order);
                }
            } else {
                for &input in graph.node(fixed).inputs() {
                    emit_floating(graph, block.id(), placement, input, &mut emitted, &mut order);
                }
            }
            order.push(fixed);
        }
        result.push(order);
    }
    result
}

fn emit_floating(
    graph: &Graph,
    block: BlockId,
    placement: &HashMap<NodeId, BlockId>,
    node: NodeId,
    emitted: &mut BitSet,
    order: &mut Vec<NodeId>,
) {
    if placement.get(&node) != Some(&block) || emitted.contains(node.index()) {
        return;
    }
    emitted.insert(node.index());
    // Phis take their values from predecessor blocks; recursing into them
    // here would order a merge's phi after in-block consumers.
    if !matches!(graph.node(node).op(), NodeOp::Phi) {
        for &input in graph.node(node).inputs() {
            emit_floating(graph, block, placement, input, emitted, order);
        }
    }
    order.push(node);
}
