//! The per-path lowering tool: guard creation, deduplication, and null
//! checks.
//!
//! One tool is bound per node being lowered, carrying the state of the
//! current traversal path: the dominating guard anchor, the last fixed node
//! (the insertion point for new fixed nodes), and the set of guards active
//! along the path. Guards with the same condition and polarity that are
//! still active are reused instead of duplicated; the active set is scoped
//! by the dominance walk in [`crate::lower::LoweringPhase`], so any active
//! guard dominates the current point.

use crate::events::EventKind;
use crate::ir::{DeoptAction, DeoptReason, Graph, NodeId, NodeOp, Stamp};
use crate::providers::PhaseContext;
use crate::utils::BitSet;
use crate::Result;

/// The toolset handed to a node's lowering rule.
pub struct LoweringTool<'a, 'p> {
    pub(crate) graph: &'a mut Graph,
    pub(crate) ctx: &'a mut PhaseContext<'p>,
    pub(crate) active_guards: &'a mut BitSet,
    pub(crate) anchor: NodeId,
    pub(crate) last_fixed: NodeId,
}

impl<'a, 'p> LoweringTool<'a, 'p> {
    pub(crate) fn new(
        graph: &'a mut Graph,
        ctx: &'a mut PhaseContext<'p>,
        active_guards: &'a mut BitSet,
        anchor: NodeId,
        last_fixed: NodeId,
    ) -> Self {
        Self {
            graph,
            ctx,
            active_guards,
            anchor,
            last_fixed,
        }
    }

    /// Creates a guard for `condition`, or reuses an active one.
    ///
    /// With guard elimination enabled, an active guard on the same
    /// condition with the same polarity is returned instead of creating a
    /// duplicate. New guards are value-numbered into the graph and anchored
    /// at the current anchor.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if guards have already been lowered
    /// to fixed form; floating guards must not be created past that stage.
    pub fn create_guard(
        &mut self,
        condition: NodeId,
        reason: DeoptReason,
        action: DeoptAction,
        negated: bool,
    ) -> Result<NodeId> {
        if !self.graph.guards_stage().allows_floating_guards() {
            return Err(invariant_error!(
                "cannot create a floating guard for {condition}: guards are already fixed"
            ));
        }
        if self.ctx.options.eliminate_guards {
            let mut reuse = None;
            for &user in self.graph.node(condition).usages() {
                if !self.active_guards.contains(user.index()) || self.graph.is_deleted(user) {
                    continue;
                }
                if let NodeOp::Guard {
                    negated: user_negated,
                    ..
                } = self.graph.node(user).op()
                {
                    if *user_negated == negated {
                        reuse = Some(user);
                        break;
                    }
                }
            }
            if let Some(guard) = reuse {
                self.ctx.events.record(EventKind::GuardReused).node(guard);
                return Ok(guard);
            }
        }
        let guard = self.graph.unique(
            NodeOp::Guard {
                reason,
                action,
                negated,
            },
            Stamp::Void,
            &[condition, self.anchor],
        );
        if self.ctx.options.eliminate_guards {
            self.active_guards.insert(guard.index());
        }
        self.ctx.events.record(EventKind::GuardCreated).node(guard);
        Ok(guard)
    }

    /// Guards `value` against null on behalf of `consumer`.
    ///
    /// Returns `None` without touching the graph when the stamp already
    /// proves non-nullity. Otherwise the representation depends on the
    /// pipeline stage: while floating guards are allowed, a negated
    /// [`NodeOp::IsNull`] guard is created (and deduplicated like any
    /// guard); once guards are fixed, a dedicated [`NodeOp::NullCheck`] is
    /// spliced directly before the consumer. The two forms are semantically
    /// equivalent: the consumer only executes with a non-null `value`.
    pub fn create_null_check_guard(
        &mut self,
        consumer: NodeId,
        value: NodeId,
    ) -> Result<Option<NodeId>> {
        if self.graph.node(value).stamp().is_non_null() {
            self.ctx
                .events
                .record(EventKind::NullCheckElided)
                .node(value);
            return Ok(None);
        }
        if self.graph.guards_stage().allows_floating_guards() {
            let condition = self
                .graph
                .unique(NodeOp::IsNull, Stamp::boolean(), &[value]);
            let guard = self.create_guard(
                condition,
                DeoptReason::NullCheckException,
                DeoptAction::InvalidateReprofile,
                true,
            )?;
            Ok(Some(guard))
        } else {
            let check = self.graph.add(NodeOp::NullCheck, Stamp::Void, &[value]);
            self.graph.insert_before_fixed(consumer, check)?;
            self.ctx.events.record(EventKind::GuardCreated).node(check);
            Ok(Some(check))
        }
    }
}
