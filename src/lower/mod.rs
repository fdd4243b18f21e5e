//! The lowering pipeline: progressive rewriting of high-level nodes.
//!
//! ```text
//!             +------------------------------------------+
//!             |              LoweringPhase               |
//!             |                                          |
//!  graph ---> |  schedule --> dominance walk --> lower   | ---> graph
//!             |      ^            |                |     |
//!             |      |         guards          new nodes |
//!             |      |        (tool.rs)            |     |
//!             |      +------ canonicalize <--------+     |
//!             +------------------------------------------+
//! ```
//!
//! A round schedules the graph, walks the dominator tree in pre-order with
//! the always-reached (postdominator) child first to maximize guard reuse,
//! and lowers every lowerable node against a per-path tool. Nodes a
//! lowering rule introduces are drained to completion before moving on;
//! leaving a new lowerable node behind is a fatal bug in the rule. After
//! the walk the graph is verified and the round's new nodes are
//! canonicalized. A second round must create no nodes at all; if it does,
//! some rule failed to converge and the pipeline aborts.

pub mod canon;
pub(crate) mod devirt;
mod tool;

pub use canon::{canonicalize, canonicalize_since};
pub use tool::LoweringTool;

use crate::events::EventKind;
use crate::ir::{Graph, NodeFlags, NodeId, NodeKind, NodeOp};
use crate::providers::PhaseContext;
use crate::schedule::{BlockId, Schedule};
use crate::utils::BitSet;
use crate::Result;

/// The fixed-point lowering driver.
pub struct LoweringPhase;

impl LoweringPhase {
    /// Lowers the graph to convergence.
    ///
    /// Runs one full round, then a verification round that must not create
    /// any node.
    ///
    /// # Errors
    ///
    /// Propagates scheduling and verification failures, and reports an
    /// invariant violation if lowering has not converged after the first
    /// round.
    pub fn run(graph: &mut Graph, ctx: &mut PhaseContext) -> Result<()> {
        Self::round(graph, ctx, 0)?;
        let converged = graph.mark();
        Self::round(graph, ctx, 1)?;
        let stray = graph.nodes_created_since(converged);
        if !stray.is_empty() {
            return Err(invariant_error!(
                "lowering did not converge: verification round created {stray:?}"
            ));
        }
        Ok(())
    }

    fn round(graph: &mut Graph, ctx: &mut PhaseContext, round: usize) -> Result<()> {
        ctx.events
            .record(EventKind::LoweringRound)
            .message(format!("round {round}"));
        let mark = graph.mark();
        let schedule = Schedule::build(graph, ctx.options.scheduling)?;
        let mut active_guards = BitSet::new();
        Self::process_block(
            graph,
            ctx,
            &schedule,
            schedule.cfg().entry(),
            &mut active_guards,
            None,
        )?;
        graph.verify()?;
        canon::canonicalize_incremental(graph, ctx, mark)?;
        graph.verify()?;
        Ok(())
    }

    /// Processes a block, then its dominated children: the always-reached
    /// child inherits this path's anchor, the others start a fresh sub-tree.
    fn process_block(
        graph: &mut Graph,
        ctx: &mut PhaseContext,
        schedule: &Schedule,
        block: BlockId,
        active_guards: &mut BitSet,
        parent_anchor: Option<NodeId>,
    ) -> Result<()> {
        let begin = schedule.cfg().block(block).begin();
        let anchor = parent_anchor.unwrap_or(begin);
        let anchor = Self::process(graph, ctx, schedule, block, active_guards, anchor)?;

        let block_ref = schedule.cfg().block(block);
        let dominated = block_ref.dominated().to_vec();
        let always_reached = block_ref
            .postdominator()
            .filter(|child| dominated.contains(child));
        if let Some(child) = always_reached {
            Self::process_block(graph, ctx, schedule, child, active_guards, Some(anchor))?;
        }
        for child in dominated {
            if Some(child) == always_reached {
                continue;
            }
            Self::process_block(graph, ctx, schedule, child, active_guards, None)?;
        }

        // Guards anchored at this sub-tree's root must not be reused by
        // sibling blocks it does not dominate.
        if parent_anchor.is_none() && ctx.options.eliminate_guards && graph.is_alive(begin) {
            for &user in graph.node(begin).usages() {
                active_guards.remove(user.index());
            }
        }
        Ok(())
    }

    /// Lowers the scheduled nodes of one block, returning the (possibly
    /// re-anchored) guard anchor for the always-reached child.
    fn process(
        graph: &mut Graph,
        ctx: &mut PhaseContext,
        schedule: &Schedule,
        block: BlockId,
        active_guards: &mut BitSet,
        mut anchor: NodeId,
    ) -> Result<NodeId> {
        let nodes = schedule.nodes_for(block).to_vec();
        let mut last_fixed = schedule.cfg().block(block).begin();

        for (position, &node) in nodes.iter().enumerate() {
            if graph.is_deleted(node) {
                continue;
            }
            if graph.node(node).has_flag(NodeFlags::LOWERABLE) {
                let pre_mark = graph.mark();
                {
                    let mut tool =
                        LoweringTool::new(graph, ctx, active_guards, anchor, last_fixed);
                    lower_node(&mut tool, node)?;
                    last_fixed = tool.last_fixed;
                }

                // Drain lowerable nodes the rewrite introduced; lowering
                // must be recursively complete before moving on.
                let mut cursor = pre_mark;
                let mut passes = 0usize;
                loop {
                    let window = graph.nodes_created_since(cursor);
                    cursor = graph.mark();
                    let pending: Vec<NodeId> = window
                        .into_iter()
                        .filter(|&n| {
                            graph.is_alive(n) && graph.node(n).has_flag(NodeFlags::LOWERABLE)
                        })
                        .collect();
                    if pending.is_empty() {
                        break;
                    }
                    passes += 1;
                    if passes > ctx.options.max_iterations {
                        return Err(invariant_error!(
                            "recursive lowering below {node} did not terminate"
                        ));
                    }
                    for introduced in pending {
                        if graph.is_deleted(introduced) {
                            continue;
                        }
                        let mut tool =
                            LoweringTool::new(graph, ctx, active_guards, anchor, last_fixed);
                        lower_node(&mut tool, introduced)?;
                        last_fixed = tool.last_fixed;
                    }
                }
                for introduced in graph.nodes_created_since(pre_mark) {
                    if graph.is_alive(introduced)
                        && graph.node(introduced).has_flag(NodeFlags::LOWERABLE)
                    {
                        return Err(invariant_error!(
                            "lowering of {node} left lowerable node {introduced} behind"
                        ));
                    }
                }

                if graph.is_deleted(anchor) {
                    let next_fixed = nodes[position + 1..]
                        .iter()
                        .copied()
                        .find(|&n| graph.is_alive(n) && graph.node(n).kind() == NodeKind::Fixed);
                    anchor = graph.prev_begin(next_fixed.unwrap_or(last_fixed))?;
                }
            }
            if graph.is_alive(node) && graph.node(node).op().is_fixed_with_next() {
                last_fixed = node;
            }
        }
        Ok(anchor)
    }
}

/// Per-operation lowering rules.
fn lower_node(tool: &mut LoweringTool, node: NodeId) -> Result<()> {
    let op = tool.graph.node(node).op().clone();
    match op {
        NodeOp::LoadField { location } => {
            let receiver = tool.graph.node(node).inputs()[0];
            let stamp = *tool.graph.node(node).stamp();
            let guard = tool.create_null_check_guard(node, receiver)?;
            // A floating guard is carried as the read's guard input; a fixed
            // null check already sits in the chain before the read.
            let read = match guard {
                Some(guard) if tool.graph.node(guard).kind() == NodeKind::Floating => tool
                    .graph
                    .add(NodeOp::Read { location }, stamp, &[receiver, guard]),
                _ => tool.graph.add(NodeOp::Read { location }, stamp, &[receiver]),
            };
            tool.graph.replace_fixed_with_fixed(node, read)?;
            tool.last_fixed = read;
            tool.ctx
                .events
                .record(EventKind::Lowered)
                .node(read)
                .message("field load");
        }
        NodeOp::LoadHub => {
            let stamps = tool.ctx.stamps;
            let read = stamps.lower_load_hub(tool.graph, node, tool.last_fixed)?;
            tool.last_fixed = read;
            tool.ctx
                .events
                .record(EventKind::Lowered)
                .node(read)
                .message("hub load");
        }
        NodeOp::InstanceOf { .. } => {
            let stamps = tool.ctx.stamps;
            let compare = stamps.lower_instance_of(tool.graph, node)?;
            tool.ctx
                .events
                .record(EventKind::Lowered)
                .node(compare)
                .message("type check");
        }
        _ => {}
    }
    Ok(())
}
