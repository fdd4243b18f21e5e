//! Control-flow graph construction and dominance analysis.
//!
//! Blocks are discovered by walking the fixed skeleton from the start node:
//! every block-begin node (start, begin, merge) opens a block, and the
//! single-successor chain from it runs to the first terminator. Dominators
//! and postdominators are computed with the iterative RPO data-flow
//! algorithm; postdominators run the same algorithm on the reversed graph
//! with a virtual sink joining all exits, so a block's "always reached"
//! successor is defined whenever one exists.

use std::collections::HashMap;

use crate::ir::{Graph, NodeId};
use crate::schedule::block::{Block, BlockId};
use crate::Result;

/// The basic blocks of a graph plus dominator and postdominator trees.
pub struct ControlFlowGraph {
    blocks: Vec<Block>,
    block_map: HashMap<NodeId, BlockId>,
    entry: BlockId,
    rpo: Vec<BlockId>,
}

impl ControlFlowGraph {
    /// Builds the control-flow graph of the given graph's fixed skeleton.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if the fixed chain is malformed, for
    /// example a fixed node flowing into a merge without an intervening
    /// branch end.
    pub fn build(graph: &Graph) -> Result<Self> {
        let mut blocks: Vec<Block> = Vec::new();
        let mut block_map: HashMap<NodeId, BlockId> = HashMap::new();
        let mut begin_to_block: HashMap<NodeId, BlockId> = HashMap::new();
        let mut worklist = vec![graph.start()];

        while let Some(begin) = worklist.pop() {
            if begin_to_block.contains_key(&begin) {
                continue;
            }
            let id = BlockId(blocks.len() as u32);
            begin_to_block.insert(begin, id);

            let mut fixed = vec![begin];
            let mut current = begin;
            while !graph.node(current).op().is_block_terminator() {
                let &[next] = graph.node(current).successors() else {
                    return Err(invariant_error!(
                        "fixed node {current} does not have exactly one successor"
                    ));
                };
                if graph.node(next).op().is_block_begin() {
                    return Err(invariant_error!(
                        "fixed node {current} flows into block begin {next} without a branch end"
                    ));
                }
                fixed.push(next);
                current = next;
            }
            for &succ in graph.node(current).successors() {
                worklist.push(succ);
            }
            for &node in &fixed {
                block_map.insert(node, id);
            }
            blocks.push(Block::new(id, begin, current, fixed));
        }

        // Block edges follow the terminators' successor edges; a terminator's
        // successors are always block begins.
        for index in 0..blocks.len() {
            let end = blocks[index].end;
            let succs: Vec<BlockId> = graph
                .node(end)
                .successors()
                .iter()
                .map(|begin| begin_to_block[begin])
                .collect();
            for &succ in &succs {
                blocks[succ.index()].predecessors.push(BlockId(index as u32));
            }
            blocks[index].successors = succs;
        }

        let entry = BlockId(0);
        let mut cfg = Self {
            blocks,
            block_map,
            entry,
            rpo: Vec::new(),
        };
        cfg.compute_dominators(graph)?;
        Ok(cfg)
    }

    fn compute_dominators(&mut self, graph: &Graph) -> Result<()> {
        let count = self.blocks.len();
        let succs: Vec<Vec<usize>> = self
            .blocks
            .iter()
            .map(|b| b.successors.iter().map(|s| s.index()).collect())
            .collect();
        let preds: Vec<Vec<usize>> = self
            .blocks
            .iter()
            .map(|b| b.predecessors.iter().map(|p| p.index()).collect())
            .collect();

        let rpo = reverse_post_order(count, self.entry.index(), &succs);
        self.rpo = rpo.iter().map(|&b| BlockId(b as u32)).collect();

        let idoms = compute_idoms(self.entry.index(), &succs, &preds, &rpo);
        for (index, idom) in idoms.iter().enumerate() {
            if index == self.entry.index() {
                continue;
            }
            let Some(idom) = *idom else {
                return Err(invariant_error!(
                    "block {} is reachable but has no dominator",
                    BlockId(index as u32)
                ));
            };
            self.blocks[index].dominator = Some(BlockId(idom as u32));
            self.blocks[idom].dominated.push(BlockId(index as u32));
        }
        // Immediate dominators precede their children in RPO, so depths can
        // be filled in a single RPO sweep.
        for &block in self.rpo.iter().skip(1) {
            let Some(dominator) = self.blocks[block.index()].dominator else {
                continue;
            };
            self.blocks[block.index()].dom_depth = self.blocks[dominator.index()].dom_depth + 1;
        }

        // Postdominators: dominators of the reversed graph, rooted at a
        // virtual sink that joins every exit block.
        let sink = count;
        let mut rev_succs: Vec<Vec<usize>> = preds;
        let mut rev_preds: Vec<Vec<usize>> = succs;
        rev_succs.push(Vec::new());
        rev_preds.push(Vec::new());
        for (index, block) in self.blocks.iter().enumerate() {
            if graph.node(block.end).successors().is_empty() {
                rev_succs[sink].push(index);
                rev_preds[index].push(sink);
            }
        }
        let rev_rpo = reverse_post_order(count + 1, sink, &rev_succs);
        let ipostdoms = compute_idoms(sink, &rev_succs, &rev_preds, &rev_rpo);
        for (index, ipostdom) in ipostdoms.iter().enumerate().take(count) {
            self.blocks[index].postdominator = match ipostdom {
                Some(p) if *p != sink => Some(BlockId(*p as u32)),
                _ => None,
            };
        }
        Ok(())
    }

    /// The entry block.
    #[must_use]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// The number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Access to a block.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// Iterates all blocks.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// The blocks in reverse post order (entry first).
    #[must_use]
    pub fn reverse_post_order(&self) -> &[BlockId] {
        &self.rpo
    }

    /// The block a fixed node belongs to, if the node is part of the
    /// reachable skeleton.
    #[must_use]
    pub fn block_of(&self, node: NodeId) -> Option<BlockId> {
        self.block_map.get(&node).copied()
    }

    /// Whether `a` dominates `b` (reflexively).
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = b;
        while self.blocks[current.index()].dom_depth > self.blocks[a.index()].dom_depth {
            match self.blocks[current.index()].dominator {
                Some(dominator) => current = dominator,
                None => return false,
            }
        }
        current == a
    }

    /// The deepest block dominating both `a` and `b`.
    #[must_use]
    pub fn common_dominator(&self, a: BlockId, b: BlockId) -> BlockId {
        let mut a = a;
        let mut b = b;
        while self.blocks[a.index()].dom_depth > self.blocks[b.index()].dom_depth {
            match self.blocks[a.index()].dominator {
                Some(dominator) => a = dominator,
                None => return self.entry,
            }
        }
        while self.blocks[b.index()].dom_depth > self.blocks[a.index()].dom_depth {
            match self.blocks[b.index()].dominator {
                Some(dominator) => b = dominator,
                None => return self.entry,
            }
        }
        while a != b {
            match (
                self.blocks[a.index()].dominator,
                self.blocks[b.index()].dominator,
            ) {
                (Some(da), Some(db)) => {
                    a = da;
                    b = db;
                }
                _ => return self.entry,
            }
        }
        a
    }
}

fn reverse_post_order(count: usize, entry: usize, succs: &[Vec<usize>]) -> Vec<usize> {
    let mut visited = vec![false; count];
    let mut post = Vec::with_capacity(count);
    let mut stack: Vec<(usize, usize)> = vec![(entry, 0)];
    visited[entry] = true;
    while let Some(frame) = stack.last_mut() {
        let (node, next_index) = (frame.0, frame.1);
        if next_index < succs[node].len() {
            frame.1 += 1;
            let next = succs[node][next_index];
            if !visited[next] {
                visited[next] = true;
                stack.push((next, 0));
            }
        } else {
            post.push(node);
            stack.pop();
        }
    }
    post.reverse();
    post
}

/// Iterative immediate-dominator computation over an RPO numbering.
///
/// Returns `idom[entry] == Some(entry)`; nodes unreachable from the entry
/// stay `None`.
fn compute_idoms(
    entry: usize,
    succs: &[Vec<usize>],
    preds: &[Vec<usize>],
    rpo: &[usize],
) -> Vec<Option<usize>> {
    let count = succs.len();
    let mut order = vec![usize::MAX; count];
    for (position, &block) in rpo.iter().enumerate() {
        order[block] = position;
    }
    let mut idom: Vec<Option<usize>> = vec![None; count];
    idom[entry] = Some(entry);

    let mut changed = true;
    while changed {
        changed = false;
        for &block in rpo.iter().skip(1) {
            let mut new_idom: Option<usize> = None;
            for &pred in &preds[block] {
                if idom[pred].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pred,
                    Some(current) => intersect(current, pred, &idom, &order),
                });
            }
            if let Some(new_idom) = new_idom {
                if idom[block] != Some(new_idom) {
                    idom[block] = Some(new_idom);
                    changed = true;
                }
            }
        }
    }
    idom
}

fn intersect(mut a: usize, mut b: usize, idom: &[Option<usize>], order: &[usize]) -> usize {
    while a != b {
        while order[a] > order[b] {
            match idom[a] {
                Some(dominator) => a = dominator,
                None => return b,
            }
        }
        while order[b] > order[a] {
            match idom[b] {
                Some(dominator) => b = dominator,
                None => return a,
            }
        }
    }
    a
}
