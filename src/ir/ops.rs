//! Node operations: the tagged-union payload carried by every graph node.
//!
//! Rather than an open class hierarchy, every node carries a [`NodeOp`]
//! variant plus capability flags resolved from it once at creation. The
//! capability flags ([`crate::ir::node::NodeFlags`]) drive dispatch in the
//! canonicalizer and lowering pipeline; the structural predicates here
//! (`is_fixed_with_next`, `is_block_terminator`, ...) drive block discovery
//! and graph verification.

use crate::ir::node::{NodeFlags, NodeId, NodeKind};
use crate::ir::stamp::{Constant, MethodId, TypeId};
use crate::location::LocationIdentity;

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Wrapping addition.
    Add,
    /// Wrapping subtraction.
    Sub,
    /// Wrapping multiplication.
    Mul,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
}

impl BinaryOp {
    /// Whether operand order is irrelevant for this operator.
    #[must_use]
    pub fn is_commutative(self) -> bool {
        !matches!(self, BinaryOp::Sub)
    }

    /// Evaluates the operator on constant operands.
    #[must_use]
    pub fn apply(self, lhs: i64, rhs: i64) -> i64 {
        match self {
            BinaryOp::Add => lhs.wrapping_add(rhs),
            BinaryOp::Sub => lhs.wrapping_sub(rhs),
            BinaryOp::Mul => lhs.wrapping_mul(rhs),
            BinaryOp::And => lhs & rhs,
            BinaryOp::Or => lhs | rhs,
            BinaryOp::Xor => lhs ^ rhs,
        }
    }
}

/// The dispatch discipline of a call site.
///
/// Simplification only ever narrows the kind along
/// `Interface -> Virtual -> Special`; `Static` call sites are never touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    /// Dispatch through an interface method table.
    Interface,
    /// Dispatch through the receiver's virtual method table.
    Virtual,
    /// Direct call to a known method with a receiver.
    Special,
    /// Direct call to a known method without a receiver.
    Static,
}

impl InvokeKind {
    /// Whether the call passes a receiver as its first argument.
    #[must_use]
    pub fn has_receiver(self) -> bool {
        !matches!(self, InvokeKind::Static)
    }

    /// Whether dispatch may legally be rewritten from `self` to `target`.
    ///
    /// Narrowing is a one-way street toward direct dispatch; rewriting in
    /// the other direction, or touching a static call, is never legal.
    #[must_use]
    pub fn can_narrow_to(self, target: InvokeKind) -> bool {
        let rank = |kind: InvokeKind| match kind {
            InvokeKind::Interface => Some(0u8),
            InvokeKind::Virtual => Some(1),
            InvokeKind::Special => Some(2),
            InvokeKind::Static => None,
        };
        match (rank(self), rank(target)) {
            (Some(from), Some(to)) => to >= from,
            _ => false,
        }
    }
}

/// Why a deoptimization fallback was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeoptReason {
    /// A null receiver reached a null check.
    NullCheckException,
    /// A speculative type check inserted by the optimizer failed.
    OptimizedTypeCheckViolated,
    /// A cast failed.
    ClassCastException,
    /// Control reached code compiled as unreachable.
    UnreachedCode,
}

/// What the runtime should do with the compiled code after deoptimizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeoptAction {
    /// Fall back without touching the compiled code.
    None,
    /// Discard the compiled code and re-profile before recompiling.
    InvalidateReprofile,
    /// Discard the compiled code and recompile without the failed speculation.
    InvalidateRecompile,
}

/// The operation a node performs, including its per-variant payload.
///
/// Input-edge conventions are documented per variant; the graph stores the
/// edges themselves, ordered, on the node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeOp {
    // ---- Fixed control flow ----
    /// The unique entry of the graph. No inputs.
    Start,
    /// Start of a basic block (branch target, or guard anchor). No inputs.
    Begin,
    /// End of a forward branch arm; its successor is the merge it feeds.
    /// No inputs.
    End,
    /// Two-way branch. Inputs: `[condition]`. Successors: `[true, false]`.
    If,
    /// Control-flow merge. Inputs: the `End` nodes of the incoming arms, in
    /// predecessor order (phi value `i` corresponds to input `i`).
    Merge,
    /// Method exit. Inputs: `[value]`, or none for a void return.
    Return,
    /// Transfer to the deoptimization fallback. No inputs.
    Deopt {
        /// Why the fallback is taken.
        reason: DeoptReason,
        /// What to do with the compiled code.
        action: DeoptAction,
    },
    /// Explicit fixed null check, deoptimizing on null. Inputs: `[object]`.
    /// Only appears once guards have been lowered to fixed form.
    NullCheck,
    /// A call site. Inputs: `[call_target]`.
    Invoke {
        /// Bytecode index of the call, for diagnostics.
        bci: u32,
        /// Whether the frame state needed to deoptimize at this call is
        /// available. Speculative rewrites of the call are gated on it.
        has_state: bool,
    },
    /// Memory read from an abstract location. Inputs: `[object]` or
    /// `[object, guard]` when a guard protects the access.
    Read {
        /// The location the read addresses.
        location: LocationIdentity,
    },
    /// Memory write to an abstract location. Inputs: `[object, value]`.
    Write {
        /// The location the write addresses.
        location: LocationIdentity,
    },
    /// High-level field load, lowered to a null-check guard plus a [`NodeOp::Read`].
    /// Inputs: `[object]`.
    LoadField {
        /// The location of the field.
        location: LocationIdentity,
    },

    // ---- Floating values ----
    /// A compile-time constant. No inputs.
    Const(Constant),
    /// The n-th method parameter. No inputs.
    Param(u16),
    /// SSA phi. Inputs: `[merge, value_0, value_1, ...]` with one value per
    /// merge predecessor, in predecessor order.
    Phi,
    /// Binary arithmetic. Inputs: `[lhs, rhs]`.
    Binary(BinaryOp),
    /// Null test. Inputs: `[object]`.
    IsNull,
    /// Dynamic type test, lowered to a hub comparison. Inputs: `[object]`.
    InstanceOf {
        /// The type tested against.
        ty: TypeId,
    },
    /// Equality of two type hubs. Inputs: `[lhs, rhs]`.
    HubEquals,
    /// Load of an object's type hub, lowered to a [`NodeOp::Read`] from the
    /// hub location. Inputs: `[object]`.
    LoadHub,
    /// Stamp-narrowing view of a value below a guard. Inputs:
    /// `[object, guard]`. Produces the object unchanged, with the node's
    /// own, more precise stamp.
    Pi,
    /// Speculative check. Inputs: `[condition, anchor]`. Fails to the
    /// deoptimization fallback when the condition (xor `negated`) is false.
    Guard {
        /// Deoptimization reason on failure.
        reason: DeoptReason,
        /// Deoptimization action on failure.
        action: DeoptAction,
        /// Whether the condition is checked inverted.
        negated: bool,
    },
    /// The callee of an [`NodeOp::Invoke`]. Inputs: the arguments, receiver
    /// first unless the kind is [`InvokeKind::Static`].
    CallTarget {
        /// The resolved target method.
        method: MethodId,
        /// The dispatch discipline.
        kind: InvokeKind,
    },
}

impl NodeOp {
    /// Whether nodes with this operation are fixed or floating.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeOp::Start
            | NodeOp::Begin
            | NodeOp::End
            | NodeOp::If
            | NodeOp::Merge
            | NodeOp::Return
            | NodeOp::Deopt { .. }
            | NodeOp::NullCheck
            | NodeOp::Invoke { .. }
            | NodeOp::Read { .. }
            | NodeOp::Write { .. }
            | NodeOp::LoadField { .. } => NodeKind::Fixed,
            _ => NodeKind::Floating,
        }
    }

    /// The capability flags driving canonicalization and lowering dispatch.
    #[must_use]
    pub fn flags(&self) -> NodeFlags {
        match self {
            NodeOp::LoadField { .. } => NodeFlags::LOWERABLE,
            NodeOp::LoadHub => {
                NodeFlags::LOWERABLE | NodeFlags::CANONICALIZABLE | NodeFlags::VIRTUALIZABLE
            }
            NodeOp::InstanceOf { .. } => NodeFlags::LOWERABLE | NodeFlags::CANONICALIZABLE,
            NodeOp::Binary(_) | NodeOp::IsNull | NodeOp::Pi | NodeOp::HubEquals => {
                NodeFlags::CANONICALIZABLE
            }
            NodeOp::CallTarget { .. } => NodeFlags::SIMPLIFIABLE,
            NodeOp::Guard { .. } => NodeFlags::GUARD,
            _ => NodeFlags::empty(),
        }
    }

    /// Whether this fixed node has exactly one control successor it hands
    /// off to (the "fixed with next" linkage).
    #[must_use]
    pub fn is_fixed_with_next(&self) -> bool {
        matches!(
            self,
            NodeOp::Start
                | NodeOp::Begin
                | NodeOp::Merge
                | NodeOp::NullCheck
                | NodeOp::Invoke { .. }
                | NodeOp::Read { .. }
                | NodeOp::Write { .. }
                | NodeOp::LoadField { .. }
        )
    }

    /// Whether this node terminates a basic block.
    #[must_use]
    pub fn is_block_terminator(&self) -> bool {
        matches!(
            self,
            NodeOp::If | NodeOp::Return | NodeOp::Deopt { .. } | NodeOp::End
        )
    }

    /// Whether this node begins a basic block.
    #[must_use]
    pub fn is_block_begin(&self) -> bool {
        matches!(self, NodeOp::Start | NodeOp::Begin | NodeOp::Merge)
    }

    /// Whether structurally equal nodes with this operation may be shared
    /// through value numbering.
    #[must_use]
    pub fn value_numberable(&self) -> bool {
        matches!(
            self,
            NodeOp::Const(_)
                | NodeOp::Param(_)
                | NodeOp::Binary(_)
                | NodeOp::IsNull
                | NodeOp::InstanceOf { .. }
                | NodeOp::HubEquals
                | NodeOp::LoadHub
                | NodeOp::Pi
                | NodeOp::Guard { .. }
        )
    }

    /// The abstract memory location this operation addresses, if it is a
    /// memory access.
    #[must_use]
    pub fn memory_location(&self) -> Option<&LocationIdentity> {
        match self {
            NodeOp::Read { location }
            | NodeOp::Write { location }
            | NodeOp::LoadField { location } => Some(location),
            _ => None,
        }
    }
}

/// Structural identity key for value numbering.
///
/// Two floating nodes with equal keys compute the same value; commutative
/// binary operations normalize their operand order so `a + b` and `b + a`
/// share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueKey {
    op: NodeOp,
    inputs: Vec<NodeId>,
}

impl ValueKey {
    /// Builds the key for an operation over the given ordered inputs.
    #[must_use]
    pub fn new(op: NodeOp, inputs: &[NodeId]) -> Self {
        let mut inputs = inputs.to_vec();
        if let NodeOp::Binary(binop) = &op {
            if binop.is_commutative() {
                inputs.sort();
            }
        }
        Self { op, inputs }
    }
}
