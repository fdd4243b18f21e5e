//! The graph intermediate representation.
//!
//! A program is a sea of nodes: a fixed control-flow skeleton (start,
//! blocks, branches, merges, exits) threaded through [`graph::Graph`], plus
//! floating value nodes that hang off it by data edges alone and are only
//! pinned to blocks by the scheduler. Submodules:
//!
//! - [`node`] - node storage shape, handles, capability flags
//! - [`ops`] - the operation payload and its structural predicates
//! - [`stamp`] - abstract value descriptors
//! - [`graph`] - the arena, edge maintenance, value numbering, verification

pub mod graph;
pub mod node;
pub mod ops;
pub mod stamp;

pub use graph::{Graph, GuardsStage, Mark};
pub use node::{Node, NodeFlags, NodeId, NodeKind};
pub use ops::{BinaryOp, DeoptAction, DeoptReason, InvokeKind, NodeOp, ValueKey};
pub use stamp::{Constant, ElementKind, MethodId, Stamp, TypeId};
