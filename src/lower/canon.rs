//! Canonicalization: local rewriting to a fixed point.
//!
//! Every rule here is order independent and uses only the node, its inputs'
//! stamps and constants, and the providers; a rule either produces a
//! strictly simpler replacement or leaves the node alone. The driver is a
//! worklist: replacing a node re-enqueues its former usages, since they may
//! now canonicalize too, and the pass ends when the worklist drains. Call
//! targets are handled by [`crate::lower::devirt`] through the same
//! worklist.

use std::collections::VecDeque;

use crate::events::EventKind;
use crate::ir::{Constant, Graph, Mark, NodeFlags, NodeId, NodeOp, Stamp};
use crate::lower::devirt;
use crate::providers::PhaseContext;
use crate::Result;

/// Canonicalizes every applicable node in the graph to a fixed point.
pub fn canonicalize(graph: &mut Graph, ctx: &mut PhaseContext) -> Result<()> {
    let seed: Vec<NodeId> = graph.node_ids().collect();
    run_worklist(graph, ctx, seed, true)
}

/// Canonicalizes the nodes created since `mark`, plus anything their
/// rewrites expose.
pub fn canonicalize_since(graph: &mut Graph, ctx: &mut PhaseContext, mark: Mark) -> Result<()> {
    run_worklist(graph, ctx, seed_since(graph, mark), true)
}

/// The incremental sweep run inside a lowering round.
///
/// Guard-inserting devirtualization is held back here: it would introduce
/// fresh lowerable nodes after the round's walk and defeat the two-round
/// convergence contract. Those rewrites belong to the standalone
/// [`canonicalize`] pass run before lowering.
pub(crate) fn canonicalize_incremental(
    graph: &mut Graph,
    ctx: &mut PhaseContext,
    mark: Mark,
) -> Result<()> {
    run_worklist(graph, ctx, seed_since(graph, mark), false)
}

fn seed_since(graph: &Graph, mark: Mark) -> Vec<NodeId> {
    let mut seed = Vec::new();
    for node in graph.nodes_created_since(mark) {
        seed.push(node);
        seed.extend_from_slice(graph.node(node).usages());
    }
    seed
}

fn run_worklist(
    graph: &mut Graph,
    ctx: &mut PhaseContext,
    seed: Vec<NodeId>,
    allow_guard_insertion: bool,
) -> Result<()> {
    let mut worklist: VecDeque<NodeId> = seed.into();
    let limit = ctx
        .options
        .max_iterations
        .saturating_mul(graph.node_count().max(1));
    let mut changes = 0usize;

    while let Some(node) = worklist.pop_front() {
        if graph.is_deleted(node) {
            continue;
        }
        let flags = graph.node(node).flags();

        if flags.contains(NodeFlags::SIMPLIFIABLE) {
            if devirt::simplify_call_target(graph, ctx, node, allow_guard_insertion)? {
                changes += 1;
                worklist.push_back(node);
                worklist.extend(graph.node(node).usages().iter().copied());
            }
        } else if flags.contains(NodeFlags::CANONICALIZABLE) {
            if let Some((replacement, rule)) = canonical(graph, ctx, node) {
                if replacement != node {
                    changes += 1;
                    let users = graph.node(node).usages().to_vec();
                    graph.replace_and_delete(node, replacement)?;
                    ctx.events
                        .record(EventKind::Canonicalized)
                        .node(replacement)
                        .message(rule);
                    worklist.push_back(replacement);
                    worklist.extend(users);
                }
            }
        }

        if changes > limit {
            return Err(invariant_error!(
                "canonicalization did not reach a fixed point after {changes} rewrites"
            ));
        }
    }
    Ok(())
}

fn const_int(graph: &Graph, node: NodeId) -> Option<i64> {
    match graph.node(node).op() {
        NodeOp::Const(Constant::Int(value)) => Some(*value),
        _ => None,
    }
}

fn const_hub(graph: &Graph, node: NodeId) -> Option<crate::ir::TypeId> {
    match graph.node(node).op() {
        NodeOp::Const(Constant::Hub(ty)) => Some(*ty),
        _ => None,
    }
}

fn is_const_null(graph: &Graph, node: NodeId) -> bool {
    matches!(graph.node(node).op(), NodeOp::Const(Constant::Null))
}

fn int_const_node(graph: &mut Graph, value: i64) -> NodeId {
    graph.unique(
        NodeOp::Const(Constant::Int(value)),
        Stamp::int_constant(64, value),
        &[],
    )
}

fn bool_const_node(graph: &mut Graph, value: bool) -> NodeId {
    graph.unique(NodeOp::Const(Constant::Boolean(value)), Stamp::Boolean, &[])
}

fn hub_const_node(graph: &mut Graph, ty: crate::ir::TypeId) -> NodeId {
    graph.unique(NodeOp::Const(Constant::Hub(ty)), Stamp::Hub, &[])
}

/// Applies the canonicalization rule for one node, returning the
/// replacement and the rule name if anything matched.
fn canonical(
    graph: &mut Graph,
    ctx: &mut PhaseContext,
    node: NodeId,
) -> Option<(NodeId, &'static str)> {
    let op = graph.node(node).op().clone();
    let inputs = graph.node(node).inputs().to_vec();
    match op {
        NodeOp::Binary(binop) => {
            let [lhs, rhs] = inputs[..] else { return None };
            if let (Some(a), Some(b)) = (const_int(graph, lhs), const_int(graph, rhs)) {
                let folded = int_const_node(graph, binop.apply(a, b));
                return Some((folded, "constant fold"));
            }
            use crate::ir::BinaryOp::*;
            match binop {
                Add => {
                    if const_int(graph, rhs) == Some(0) {
                        return Some((lhs, "x + 0"));
                    }
                    if const_int(graph, lhs) == Some(0) {
                        return Some((rhs, "0 + x"));
                    }
                }
                Sub => {
                    if const_int(graph, rhs) == Some(0) {
                        return Some((lhs, "x - 0"));
                    }
                    if lhs == rhs {
                        return Some((int_const_node(graph, 0), "x - x"));
                    }
                }
                Mul => {
                    if const_int(graph, rhs) == Some(1) {
                        return Some((lhs, "x * 1"));
                    }
                    if const_int(graph, lhs) == Some(1) {
                        return Some((rhs, "1 * x"));
                    }
                    if const_int(graph, rhs) == Some(0) || const_int(graph, lhs) == Some(0) {
                        return Some((int_const_node(graph, 0), "x * 0"));
                    }
                }
                And | Or => {
                    if lhs == rhs {
                        return Some((lhs, "idempotent"));
                    }
                }
                Xor => {
                    if lhs == rhs {
                        return Some((int_const_node(graph, 0), "x ^ x"));
                    }
                }
            }
            None
        }
        NodeOp::IsNull => {
            let [object] = inputs[..] else { return None };
            if is_const_null(graph, object) {
                return Some((bool_const_node(graph, true), "null is null"));
            }
            if graph.node(object).stamp().is_non_null() {
                return Some((bool_const_node(graph, false), "non-null stamp"));
            }
            None
        }
        NodeOp::Pi => {
            let [object, _guard] = inputs[..] else { return None };
            let own = *graph.node(node).stamp();
            let input_stamp = *graph.node(object).stamp();
            if !own.improves_on(&input_stamp) {
                return Some((object, "redundant pi"));
            }
            None
        }
        NodeOp::LoadHub => {
            let [object] = inputs[..] else { return None };
            let stamp = *graph.node(object).stamp();
            if let Some(exact) = stamp.exact_type() {
                return Some((hub_const_node(graph, exact), "exact stamp"));
            }
            if let Some(&ty) = ctx.virtual_objects.get(&object) {
                return Some((hub_const_node(graph, ty), "virtual object"));
            }
            // Optimistic: a type with a single loaded concrete subtype has a
            // known hub, valid only under a recorded assumption.
            if let (Some(ty), Some(assumptions)) =
                (stamp.object_type(), ctx.assumptions.as_mut())
            {
                if let Some(leaf) = ctx.meta.unique_concrete_subtype(ty) {
                    assumptions.record_concrete_subtype(ty, leaf);
                    return Some((hub_const_node(graph, leaf), "unique concrete subtype"));
                }
            }
            None
        }
        NodeOp::HubEquals => {
            let [lhs, rhs] = inputs[..] else { return None };
            if let (Some(a), Some(b)) = (const_hub(graph, lhs), const_hub(graph, rhs)) {
                return Some((bool_const_node(graph, a == b), "constant hubs"));
            }
            if lhs == rhs {
                return Some((bool_const_node(graph, true), "same hub"));
            }
            None
        }
        NodeOp::InstanceOf { ty } => {
            let [object] = inputs[..] else { return None };
            if is_const_null(graph, object) {
                return Some((bool_const_node(graph, false), "null receiver"));
            }
            if let Some(exact) = graph.node(object).stamp().exact_type() {
                let result = ctx.meta.is_subtype(exact, ty);
                return Some((bool_const_node(graph, result), "exact stamp"));
            }
            None
        }
        _ => None,
    }
}
