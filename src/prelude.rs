//! Convenience re-exports for common usage.
//!
//! ```rust,ignore
//! use seaflow::prelude::*;
//! ```

pub use crate::events::{Event, EventKind, EventLog};
pub use crate::ir::{
    BinaryOp, Constant, DeoptAction, DeoptReason, ElementKind, Graph, GuardsStage, InvokeKind,
    Mark, MethodId, Node, NodeFlags, NodeId, NodeKind, NodeOp, Stamp, TypeId,
};
pub use crate::location::{LocationIdentity, LocationRegistry};
pub use crate::lower::{canonicalize, canonicalize_since, LoweringPhase, LoweringTool};
pub use crate::probes::{LineProbeMap, ProbeId, SourceId};
pub use crate::providers::{
    Assumption, Assumptions, MetaProvider, MethodSignature, OptOptions, PhaseContext,
    ProfileProvider, ProfiledType, StampProvider, TypeProfile,
};
pub use crate::schedule::{Block, BlockId, ControlFlowGraph, Schedule, SchedulingMode};
pub use crate::{Error, Result};
