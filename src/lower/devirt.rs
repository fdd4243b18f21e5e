//! Call-target devirtualization.
//!
//! A polymorphic call site is rewritten toward direct dispatch when one of
//! these holds, tried in order:
//!
//! 1. the declared method can be statically bound (never overridden); the
//!    only rewrite that is not speculative;
//! 2. the receiver stamp pins down an exact type, or metadata proves a
//!    unique concrete subtype or unique override (the optimistic variants
//!    record an assumption the runtime must re-validate);
//! 3. the declared interface has exactly one loaded implementor, in which
//!    case a type-check guard plus a narrowing pi is inserted in front of
//!    the receiver and the call is narrowed to virtual dispatch, then
//!    resolution is retried against the narrowed receiver;
//! 4. profiling reports a monomorphic receiver type, guarded the same way.
//!
//! Every rewrite only narrows the invoke kind and never touches arity or
//! return type. Rewrites requiring a guard are skipped once the graph no
//! longer allows floating guards, and rewrites requiring deoptimization
//! metadata are skipped when the call site has no frame state; both are
//! silent no-ops, not errors.

use crate::events::EventKind;
use crate::ir::{
    DeoptAction, DeoptReason, Graph, InvokeKind, MethodId, NodeId, NodeOp, Stamp, TypeId,
};
use crate::providers::PhaseContext;
use crate::Result;

/// Attempts to devirtualize one call target. Returns whether the node
/// changed.
///
/// With `allow_guard_insertion` false only the rewrites that introduce no
/// new nodes are tried.
pub(crate) fn simplify_call_target(
    graph: &mut Graph,
    ctx: &mut PhaseContext,
    target: NodeId,
    allow_guard_insertion: bool,
) -> Result<bool> {
    let NodeOp::CallTarget { method, kind } = *graph.node(target).op() else {
        return Ok(false);
    };
    if !matches!(kind, InvokeKind::Interface | InvokeKind::Virtual) {
        return Ok(false);
    }
    // A receiverless target has nothing to narrow on, and without the
    // enclosing invoke the call site's shape is unknown.
    let Some(invoke) = find_invoke(graph, target) else {
        return Ok(false);
    };
    let NodeOp::Invoke { bci, has_state } = *graph.node(invoke).op() else {
        return Ok(false);
    };
    if graph.node(target).inputs().is_empty() {
        return Ok(false);
    }

    // Binding a never-overridden method is not speculative and needs no
    // deoptimization support.
    if ctx.meta.can_be_statically_bound(method) {
        set_call_target(graph, ctx, target, method, InvokeKind::Special, "statically bound")?;
        return Ok(true);
    }

    // Every remaining rewrite speculates; the call site must be able to
    // deoptimize.
    if !has_state {
        return Ok(false);
    }

    if try_resolve(graph, ctx, target)? {
        return Ok(true);
    }
    if !allow_guard_insertion {
        return Ok(false);
    }

    if try_single_implementor(graph, ctx, target, invoke)? {
        // The narrowed receiver may now resolve exactly or optimistically.
        try_resolve(graph, ctx, target)?;
        return Ok(true);
    }

    if try_profiled_receiver(graph, ctx, target, invoke, bci)? {
        return Ok(true);
    }

    Ok(false)
}

fn find_invoke(graph: &Graph, target: NodeId) -> Option<NodeId> {
    graph
        .node(target)
        .usages()
        .iter()
        .copied()
        .find(|&user| matches!(graph.node(user).op(), NodeOp::Invoke { .. }))
}

/// Rewrites the target in place, checking the narrowing direction.
fn set_call_target(
    graph: &mut Graph,
    ctx: &mut PhaseContext,
    target: NodeId,
    new_method: MethodId,
    new_kind: InvokeKind,
    rule: &'static str,
) -> Result<()> {
    let NodeOp::CallTarget { method, kind } = *graph.node(target).op() else {
        return Err(invariant_error!("{target} is not a call target"));
    };
    if !kind.can_narrow_to(new_kind) {
        return Err(invariant_error!(
            "illegal invoke kind change {kind:?} -> {new_kind:?} at {target}"
        ));
    }
    let same_shape = ctx.meta.signature(method).arity == ctx.meta.signature(new_method).arity
        && ctx.meta.signature(method).return_stamp == ctx.meta.signature(new_method).return_stamp;
    if !same_shape {
        return Err(invariant_error!(
            "devirtualization changed the call shape at {target}"
        ));
    }
    *graph.op_mut(target) = NodeOp::CallTarget {
        method: new_method,
        kind: new_kind,
    };
    ctx.events
        .record(EventKind::Devirtualized)
        .node(target)
        .message(rule);
    Ok(())
}

/// Resolution against the receiver's static type: exact stamps bind
/// directly, known upper bounds bind optimistically under an assumption.
fn try_resolve(graph: &mut Graph, ctx: &mut PhaseContext, target: NodeId) -> Result<bool> {
    let NodeOp::CallTarget { method, kind } = *graph.node(target).op() else {
        return Ok(false);
    };
    if !matches!(kind, InvokeKind::Interface | InvokeKind::Virtual) {
        return Ok(false);
    }
    let receiver = graph.node(target).inputs()[0];
    let stamp = *graph.node(receiver).stamp();

    if let Some(exact) = stamp.exact_type() {
        if let Some(resolved) = ctx.meta.resolve_concrete_method(method, exact) {
            set_call_target(graph, ctx, target, resolved, InvokeKind::Special, "exact receiver")?;
            return Ok(true);
        }
        return Ok(false);
    }

    let receiver_type = stamp.object_type().or_else(|| {
        // A virtual call always has at least the declaring type as bound.
        matches!(kind, InvokeKind::Virtual).then(|| ctx.meta.declaring_type(method))
    });
    let Some(receiver_type) = receiver_type else {
        return Ok(false);
    };
    if ctx.assumptions.is_none() {
        return Ok(false);
    }

    if let Some(leaf) = ctx.meta.unique_concrete_subtype(receiver_type) {
        if let Some(resolved) = ctx.meta.resolve_concrete_method(method, leaf) {
            if let Some(assumptions) = ctx.assumptions.as_mut() {
                assumptions.record_concrete_subtype(receiver_type, leaf);
            }
            set_call_target(
                graph,
                ctx,
                target,
                resolved,
                InvokeKind::Special,
                "unique concrete subtype",
            )?;
            return Ok(true);
        }
    }
    if let Some(resolved) = ctx.meta.unique_concrete_method(method, receiver_type) {
        if let Some(assumptions) = ctx.assumptions.as_mut() {
            assumptions.record_concrete_method(method, receiver_type, resolved);
        }
        set_call_target(
            graph,
            ctx,
            target,
            resolved,
            InvokeKind::Special,
            "unique concrete method",
        )?;
        return Ok(true);
    }
    Ok(false)
}

/// Inserts a guarded type check narrowing the receiver to the interface's
/// single implementor, then downgrades the call to virtual dispatch.
fn try_single_implementor(
    graph: &mut Graph,
    ctx: &mut PhaseContext,
    target: NodeId,
    invoke: NodeId,
) -> Result<bool> {
    let NodeOp::CallTarget { method, kind } = *graph.node(target).op() else {
        return Ok(false);
    };
    if kind != InvokeKind::Interface {
        return Ok(false);
    }
    let declared = ctx.meta.declaring_type(method);
    if !ctx.meta.is_interface(declared) {
        return Ok(false);
    }
    let Some(single) = ctx.meta.single_implementor(declared) else {
        return Ok(false);
    };
    if single == declared {
        return Ok(false);
    }
    let Some(speculated) = ctx.meta.resolve_concrete_method(method, single) else {
        return Ok(false);
    };
    if !graph.guards_stage().allows_floating_guards() {
        return Ok(false);
    }

    let receiver = graph.node(target).inputs()[0];
    let pi = insert_receiver_guard(
        graph,
        invoke,
        receiver,
        single,
        Stamp::object_non_null(Some(single)),
        DeoptAction::InvalidateRecompile,
    )?;
    graph.set_input(target, 0, pi);
    set_call_target(
        graph,
        ctx,
        target,
        speculated,
        InvokeKind::Virtual,
        "single implementor",
    )?;
    Ok(true)
}

/// Binds the call to the profiled monomorphic receiver type behind a
/// type-check guard.
fn try_profiled_receiver(
    graph: &mut Graph,
    ctx: &mut PhaseContext,
    target: NodeId,
    invoke: NodeId,
    bci: u32,
) -> Result<bool> {
    let NodeOp::CallTarget { method, .. } = *graph.node(target).op() else {
        return Ok(false);
    };
    let Some(profiles) = ctx.profiles else {
        return Ok(false);
    };
    if !graph.guards_stage().allows_floating_guards() {
        return Ok(false);
    }
    let Some(mono) = profiles
        .type_profile(method, bci)
        .and_then(|profile| profile.monomorphic_type())
    else {
        return Ok(false);
    };
    let Some(resolved) = ctx.meta.resolve_concrete_method(method, mono) else {
        return Ok(false);
    };

    let receiver = graph.node(target).inputs()[0];
    let pi = insert_receiver_guard(
        graph,
        invoke,
        receiver,
        mono,
        Stamp::object_exact_non_null(mono),
        DeoptAction::InvalidateReprofile,
    )?;
    graph.set_input(target, 0, pi);
    set_call_target(
        graph,
        ctx,
        target,
        resolved,
        InvokeKind::Special,
        "profiled monomorphic receiver",
    )?;
    Ok(true)
}

/// Builds `pi(receiver, guard(receiver instanceof ty))` anchored at the
/// block begin preceding the invoke.
fn insert_receiver_guard(
    graph: &mut Graph,
    invoke: NodeId,
    receiver: NodeId,
    ty: TypeId,
    narrowed: Stamp,
    action: DeoptAction,
) -> Result<NodeId> {
    let condition = graph.unique(NodeOp::InstanceOf { ty }, Stamp::boolean(), &[receiver]);
    let anchor = graph.prev_begin(invoke)?;
    let guard = graph.unique(
        NodeOp::Guard {
            reason: DeoptReason::OptimizedTypeCheckViolated,
            action,
            negated: false,
        },
        Stamp::Void,
        &[condition, anchor],
    );
    Ok(graph.unique(NodeOp::Pi, narrowed, &[receiver, guard]))
}
