//! Scheduling: from a sea of nodes to ordered basic blocks.
//!
//! The fixed skeleton determines the blocks and their control edges;
//! dominator and postdominator trees are computed over them, and every live
//! floating node is assigned a block and a position consistent with its
//! data dependencies. The lowering pipeline consumes the result: it walks
//! blocks in dominance order and nodes in their scheduled order.

mod block;
mod cfg;
#[allow(clippy::module_inception)]
mod schedule;

pub use block::{Block, BlockId};
pub use cfg::ControlFlowGraph;
pub use schedule::{Schedule, SchedulingMode};
