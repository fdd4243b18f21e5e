//! Basic blocks over the fixed control-flow skeleton.

use crate::ir::NodeId;

/// Handle for a block in a [`crate::schedule::ControlFlowGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    /// The index of this handle.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// A maximal straight-line run of fixed nodes, from a block begin to a
/// terminator, plus its position in the dominator and postdominator trees.
///
/// Blocks are recomputed from the graph per scheduling pass; they are not
/// persisted across graph mutations.
#[derive(Debug)]
pub struct Block {
    pub(crate) id: BlockId,
    pub(crate) begin: NodeId,
    pub(crate) end: NodeId,
    pub(crate) fixed: Vec<NodeId>,
    pub(crate) successors: Vec<BlockId>,
    pub(crate) predecessors: Vec<BlockId>,
    pub(crate) dominator: Option<BlockId>,
    pub(crate) postdominator: Option<BlockId>,
    pub(crate) dominated: Vec<BlockId>,
    pub(crate) dom_depth: u32,
}

impl Block {
    pub(crate) fn new(id: BlockId, begin: NodeId, end: NodeId, fixed: Vec<NodeId>) -> Self {
        Self {
            id,
            begin,
            end,
            fixed,
            successors: Vec::new(),
            predecessors: Vec::new(),
            dominator: None,
            postdominator: None,
            dominated: Vec::new(),
            dom_depth: 0,
        }
    }

    /// This block's handle.
    #[must_use]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// The block-begin node opening the block.
    #[must_use]
    pub fn begin(&self) -> NodeId {
        self.begin
    }

    /// The terminator closing the block.
    #[must_use]
    pub fn end(&self) -> NodeId {
        self.end
    }

    /// The fixed nodes of the block, in control order (begin first,
    /// terminator last).
    #[must_use]
    pub fn fixed(&self) -> &[NodeId] {
        &self.fixed
    }

    /// Successor blocks in branch order.
    #[must_use]
    pub fn successors(&self) -> &[BlockId] {
        &self.successors
    }

    /// Predecessor blocks.
    #[must_use]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    /// The immediate dominator, absent only for the entry block.
    #[must_use]
    pub fn dominator(&self) -> Option<BlockId> {
        self.dominator
    }

    /// The immediate postdominator: the first block control is guaranteed
    /// to reach after this one, if any.
    #[must_use]
    pub fn postdominator(&self) -> Option<BlockId> {
        self.postdominator
    }

    /// The blocks this block immediately dominates.
    #[must_use]
    pub fn dominated(&self) -> &[BlockId] {
        &self.dominated
    }

    /// Depth in the dominator tree (entry is 0).
    #[must_use]
    pub fn dom_depth(&self) -> u32 {
        self.dom_depth
    }
}
