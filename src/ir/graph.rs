//! The graph arena: node storage, edge maintenance, and value numbering.
//!
//! Nodes are values in a dense vector, addressed by [`NodeId`] handles;
//! deleting a node leaves a tombstone so ids stay stable. All edge
//! maintenance goes through the graph so the reverse indices (usages for
//! input edges, predecessors for control edges) never drift out of sync with
//! the forward edges. [`Graph::verify`] checks exactly that symmetry, plus
//! the shape of the fixed control-flow skeleton, and is run after every
//! mutating pass.

use std::collections::HashMap;

use crate::ir::node::{Node, NodeId, NodeKind};
use crate::ir::ops::{NodeOp, ValueKey};
use crate::ir::stamp::Stamp;
use crate::Result;

/// Snapshot token over the graph's node-creation sequence.
///
/// Taking a mark before a pass and asking for [`Graph::nodes_created_since`]
/// afterwards enumerates exactly the nodes that pass introduced, without
/// scanning the whole graph state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Mark(pub(crate) u32);

/// Which representation guards currently take in the graph.
///
/// The stage only ever advances; once guards have been lowered to fixed
/// deoptimizing checks, floating guards may no longer be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardsStage {
    /// Guards are floating nodes anchored to control points.
    FloatingGuards,
    /// Guards have been lowered to fixed checks and explicit deopts.
    FixedDeopts,
}

impl GuardsStage {
    /// Whether floating guard nodes may still be created.
    #[must_use]
    pub fn allows_floating_guards(self) -> bool {
        matches!(self, GuardsStage::FloatingGuards)
    }
}

/// A mutable sea-of-nodes graph owned by one compilation unit.
pub struct Graph {
    nodes: Vec<Option<Node>>,
    cache: HashMap<ValueKey, NodeId>,
    guards_stage: GuardsStage,
    start: NodeId,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Creates an empty graph containing only its start node.
    #[must_use]
    pub fn new() -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            cache: HashMap::new(),
            guards_stage: GuardsStage::FloatingGuards,
            start: NodeId(0),
        };
        graph.start = graph.add(NodeOp::Start, Stamp::Void, &[]);
        graph
    }

    /// The unique entry node.
    #[must_use]
    pub fn start(&self) -> NodeId {
        self.start
    }

    /// The stage guards are currently represented in.
    #[must_use]
    pub fn guards_stage(&self) -> GuardsStage {
        self.guards_stage
    }

    /// Advances the guard representation stage.
    pub fn set_guards_stage(&mut self, stage: GuardsStage) {
        self.guards_stage = stage;
    }

    /// Inserts a new node and returns its handle.
    ///
    /// Input edges are recorded in order and the usage reverse index of each
    /// input is updated. Control successor edges are wired separately, by
    /// [`Graph::append_next`] and friends.
    ///
    /// # Panics
    ///
    /// Panics if any input handle refers to a deleted node.
    pub fn add(&mut self, op: NodeOp, stamp: Stamp, inputs: &[NodeId]) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(Node {
            op,
            stamp,
            inputs: inputs.to_vec(),
            successors: Vec::new(),
            usages: Vec::new(),
            preds: Vec::new(),
        }));
        for &input in inputs {
            self.node_mut(input).usages.push(id);
        }
        id
    }

    /// Returns an existing structurally equal node if one is present,
    /// otherwise inserts a new one (value numbering).
    ///
    /// Only meaningful for operations where structural equality implies
    /// value equality ([`NodeOp::value_numberable`]); other operations are
    /// simply added.
    pub fn unique(&mut self, op: NodeOp, stamp: Stamp, inputs: &[NodeId]) -> NodeId {
        if !op.value_numberable() {
            return self.add(op, stamp, inputs);
        }
        let key = ValueKey::new(op.clone(), inputs);
        if let Some(&cached) = self.cache.get(&key) {
            // Cache entries go stale when a numbered node is deleted or has
            // had an input rewired; re-validate before sharing.
            if self.is_alive(cached) {
                let node = self.node(cached);
                if node.stamp == stamp && ValueKey::new(node.op.clone(), &node.inputs) == key {
                    return cached;
                }
            }
        }
        let id = self.add(op, stamp, inputs);
        self.cache.insert(key, id);
        id
    }

    /// Immutable access to a node.
    ///
    /// # Panics
    ///
    /// Panics if the node has been deleted; handles to deleted nodes must
    /// not escape a pass.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        match &self.nodes[id.index()] {
            Some(node) => node,
            None => panic!("access to deleted node {id}"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match &mut self.nodes[id.index()] {
            Some(node) => node,
            None => panic!("access to deleted node {id}"),
        }
    }

    pub(crate) fn op_mut(&mut self, id: NodeId) -> &mut NodeOp {
        &mut self.node_mut(id).op
    }

    /// Whether the node is still alive.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len() && self.nodes[id.index()].is_some()
    }

    /// Whether the node has been deleted.
    #[must_use]
    pub fn is_deleted(&self, id: NodeId) -> bool {
        !self.is_alive(id)
    }

    /// The number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Iterates the handles of all live nodes, in creation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(i, _)| NodeId(i as u32))
    }

    /// Takes a snapshot of the node-creation sequence.
    #[must_use]
    pub fn mark(&self) -> Mark {
        Mark(self.nodes.len() as u32)
    }

    /// The live nodes created since the given mark, in creation order.
    #[must_use]
    pub fn nodes_created_since(&self, mark: Mark) -> Vec<NodeId> {
        (mark.0 as usize..self.nodes.len())
            .filter(|&i| self.nodes[i].is_some())
            .map(|i| NodeId(i as u32))
            .collect()
    }

    fn remove_usage(&mut self, of: NodeId, user: NodeId) {
        let usages = &mut self.node_mut(of).usages;
        if let Some(pos) = usages.iter().position(|&u| u == user) {
            usages.swap_remove(pos);
        }
    }

    /// Rewires input `index` of `node` to `new_input`, maintaining both
    /// usage indices.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds or either node is deleted.
    pub fn set_input(&mut self, node: NodeId, index: usize, new_input: NodeId) {
        let old = self.node(node).inputs[index];
        if old == new_input {
            return;
        }
        self.remove_usage(old, node);
        self.node_mut(node).inputs[index] = new_input;
        self.node_mut(new_input).usages.push(node);
    }

    /// Rewires every usage of `old` to consume `new` instead, then deletes
    /// `old`.
    ///
    /// Fails if `old` and `new` are the same node, or if `new` (directly)
    /// consumes `old`, which would leave a dangling edge behind.
    pub fn replace_and_delete(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        if old == new {
            return Err(invariant_error!("cannot replace node {old} with itself"));
        }
        if self.node(new).inputs.contains(&old) {
            return Err(invariant_error!(
                "replacement node {new} consumes the node {old} it replaces"
            ));
        }
        let users: Vec<NodeId> = self.node(old).usages.clone();
        for user in users {
            let slots: Vec<usize> = self
                .node(user)
                .inputs
                .iter()
                .enumerate()
                .filter(|(_, &input)| input == old)
                .map(|(i, _)| i)
                .collect();
            for slot in slots {
                self.node_mut(user).inputs[slot] = new;
                self.node_mut(new).usages.push(user);
            }
        }
        self.node_mut(old).usages.clear();
        self.kill(old)
    }

    /// Deletes a node that no longer participates in the graph.
    ///
    /// The node must have no remaining usages and no control edges; its
    /// input edges are unlinked here.
    pub fn kill(&mut self, id: NodeId) -> Result<()> {
        let node = self.node(id);
        if !node.usages.is_empty() {
            return Err(invariant_error!(
                "cannot delete {id}: still used by {:?}",
                node.usages
            ));
        }
        if !node.preds.is_empty() || !node.successors.is_empty() {
            return Err(invariant_error!(
                "cannot delete {id}: control edges still linked"
            ));
        }
        let inputs = node.inputs.clone();
        for input in inputs {
            self.remove_usage(input, id);
        }
        self.nodes[id.index()] = None;
        Ok(())
    }

    /// Appends `next` as the single control successor of `prev`.
    ///
    /// `prev` must be a fixed node with a pending single-successor slot (a
    /// fixed-with-next node, or an [`NodeOp::End`] awaiting its merge) that
    /// has not been linked yet.
    pub fn append_next(&mut self, prev: NodeId, next: NodeId) -> Result<()> {
        let prev_node = self.node(prev);
        let single_successor =
            prev_node.op.is_fixed_with_next() || matches!(prev_node.op, NodeOp::End);
        if !single_successor {
            return Err(crate::Error::GraphError(format!(
                "{prev} ({:?}) cannot take a linear successor",
                prev_node.op
            )));
        }
        if !prev_node.successors.is_empty() {
            return Err(crate::Error::GraphError(format!(
                "{prev} already has a successor"
            )));
        }
        if self.node(next).kind() != NodeKind::Fixed {
            return Err(crate::Error::GraphError(format!(
                "{next} is floating and cannot be a control successor"
            )));
        }
        self.node_mut(prev).successors.push(next);
        self.node_mut(next).preds.push(prev);
        Ok(())
    }

    /// Wires the two successors of an [`NodeOp::If`] node.
    pub fn set_branch_targets(
        &mut self,
        branch: NodeId,
        true_target: NodeId,
        false_target: NodeId,
    ) -> Result<()> {
        if !matches!(self.node(branch).op, NodeOp::If) {
            return Err(crate::Error::GraphError(format!(
                "{branch} is not a branch"
            )));
        }
        if !self.node(branch).successors.is_empty() {
            return Err(crate::Error::GraphError(format!(
                "{branch} already has successors"
            )));
        }
        for target in [true_target, false_target] {
            if !matches!(self.node(target).op, NodeOp::Begin) {
                return Err(crate::Error::GraphError(format!(
                    "branch target {target} is not a block begin"
                )));
            }
        }
        self.node_mut(branch).successors.push(true_target);
        self.node_mut(branch).successors.push(false_target);
        self.node_mut(true_target).preds.push(branch);
        self.node_mut(false_target).preds.push(branch);
        Ok(())
    }

    fn replace_successor_edge(&mut self, of: NodeId, old: NodeId, new: NodeId) -> Result<()> {
        let successors = &mut self.node_mut(of).successors;
        match successors.iter().position(|&s| s == old) {
            Some(pos) => {
                successors[pos] = new;
                Ok(())
            }
            None => Err(invariant_error!("{of} has no successor edge to {old}")),
        }
    }

    fn replace_pred_edge(&mut self, of: NodeId, old: NodeId, new: NodeId) -> Result<()> {
        let preds = &mut self.node_mut(of).preds;
        match preds.iter().position(|&p| p == old) {
            Some(pos) => {
                preds[pos] = new;
                Ok(())
            }
            None => Err(invariant_error!("{of} has no predecessor edge to {old}")),
        }
    }

    /// Splices the fixed-with-next node `new` into the control chain
    /// immediately before `at`.
    pub fn insert_before_fixed(&mut self, at: NodeId, new: NodeId) -> Result<()> {
        if !self.node(new).op.is_fixed_with_next() {
            return Err(crate::Error::GraphError(format!(
                "{new} cannot be spliced into the fixed chain"
            )));
        }
        if !self.node(new).preds.is_empty() || !self.node(new).successors.is_empty() {
            return Err(crate::Error::GraphError(format!("{new} is already linked")));
        }
        let preds = std::mem::take(&mut self.node_mut(at).preds);
        for &pred in &preds {
            self.replace_successor_edge(pred, at, new)?;
        }
        self.node_mut(new).preds = preds;
        self.node_mut(new).successors.push(at);
        self.node_mut(at).preds.push(new);
        Ok(())
    }

    /// Splices the fixed-with-next node `new` into the control chain
    /// immediately after `prev`.
    pub fn insert_after_fixed(&mut self, prev: NodeId, new: NodeId) -> Result<()> {
        if !self.node(new).op.is_fixed_with_next() {
            return Err(crate::Error::GraphError(format!(
                "{new} cannot be spliced into the fixed chain"
            )));
        }
        if !self.node(new).preds.is_empty() || !self.node(new).successors.is_empty() {
            return Err(crate::Error::GraphError(format!("{new} is already linked")));
        }
        let successors = self.node(prev).successors.clone();
        let &[next] = &successors[..] else {
            return Err(crate::Error::GraphError(format!(
                "{prev} does not have exactly one successor"
            )));
        };
        self.replace_pred_edge(next, prev, new)?;
        self.replace_successor_edge(prev, next, new)?;
        self.node_mut(new).preds.push(prev);
        self.node_mut(new).successors.push(next);
        Ok(())
    }

    /// Replaces the fixed node `old` in the control chain with the fixed
    /// node `new`, reroutes all value usages, and deletes `old`.
    pub fn replace_fixed_with_fixed(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        if !self.node(new).preds.is_empty() || !self.node(new).successors.is_empty() {
            return Err(crate::Error::GraphError(format!("{new} is already linked")));
        }
        let preds = std::mem::take(&mut self.node_mut(old).preds);
        for &pred in &preds {
            self.replace_successor_edge(pred, old, new)?;
        }
        self.node_mut(new).preds = preds;

        let successors = std::mem::take(&mut self.node_mut(old).successors);
        for &succ in &successors {
            self.replace_pred_edge(succ, old, new)?;
        }
        self.node_mut(new).successors = successors;

        self.replace_and_delete(old, new)
    }

    /// The nearest block begin at or above `from` in the fixed chain.
    pub fn prev_begin(&self, from: NodeId) -> Result<NodeId> {
        let mut current = from;
        loop {
            let node = self.node(current);
            if node.op.is_block_begin() {
                return Ok(current);
            }
            let &[pred] = &node.preds[..] else {
                return Err(invariant_error!(
                    "fixed chain broken walking back from {from} at {current}"
                ));
            };
            current = pred;
        }
    }

    /// Checks the graph's structural invariants.
    ///
    /// Verifies edge symmetry (inputs vs usages, successors vs
    /// predecessors), edge liveness, the successor arity of every fixed
    /// node, and the shape of merges and phis. Run after every mutating
    /// pass.
    pub fn verify(&self) -> Result<()> {
        for id in self.node_ids() {
            let node = self.node(id);

            for &input in &node.inputs {
                if self.is_deleted(input) {
                    return Err(invariant_error!("{id} has a deleted input {input}"));
                }
                if !self.node(input).usages.contains(&id) {
                    return Err(invariant_error!(
                        "{id} consumes {input} but is missing from its usages"
                    ));
                }
            }
            for &user in &node.usages {
                if self.is_deleted(user) {
                    return Err(invariant_error!("{id} is used by deleted node {user}"));
                }
                if !self.node(user).inputs.contains(&id) {
                    return Err(invariant_error!(
                        "{id} lists usage {user} which does not consume it"
                    ));
                }
            }
            for &succ in &node.successors {
                if self.is_deleted(succ) {
                    return Err(invariant_error!("{id} has a deleted successor {succ}"));
                }
                if !self.node(succ).preds.contains(&id) {
                    return Err(invariant_error!(
                        "{id} -> {succ} successor edge has no predecessor back-edge"
                    ));
                }
            }
            for &pred in &node.preds {
                if self.is_deleted(pred) {
                    return Err(invariant_error!("{id} has a deleted predecessor {pred}"));
                }
                if !self.node(pred).successors.contains(&id) {
                    return Err(invariant_error!(
                        "{pred} -> {id} predecessor edge has no successor edge"
                    ));
                }
            }

            match node.kind() {
                NodeKind::Floating => {
                    if !node.successors.is_empty() || !node.preds.is_empty() {
                        return Err(invariant_error!(
                            "floating node {id} carries control edges"
                        ));
                    }
                }
                NodeKind::Fixed => {
                    let expected = match &node.op {
                        NodeOp::If => 2,
                        NodeOp::Return | NodeOp::Deopt { .. } => 0,
                        _ => 1, // fixed-with-next and End
                    };
                    if node.successors.len() != expected {
                        return Err(invariant_error!(
                            "{id} ({:?}) has {} successors, expected {expected}",
                            node.op,
                            node.successors.len()
                        ));
                    }
                }
            }

            match &node.op {
                NodeOp::Merge => {
                    for &end in &node.inputs {
                        let end_node = self.node(end);
                        if !matches!(end_node.op, NodeOp::End) {
                            return Err(invariant_error!(
                                "merge {id} input {end} is not a branch end"
                            ));
                        }
                        if end_node.successors != [id] {
                            return Err(invariant_error!(
                                "merge {id} input {end} does not flow into it"
                            ));
                        }
                    }
                }
                NodeOp::Phi => {
                    let Some((&merge, values)) = node.inputs.split_first() else {
                        return Err(invariant_error!("phi {id} has no merge input"));
                    };
                    let merge_node = self.node(merge);
                    if !matches!(merge_node.op, NodeOp::Merge) {
                        return Err(invariant_error!(
                            "phi {id} first input {merge} is not a merge"
                        ));
                    }
                    if values.len() != merge_node.inputs.len() {
                        return Err(invariant_error!(
                            "phi {id} has {} values for {} merge predecessors",
                            values.len(),
                            merge_node.inputs.len()
                        ));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ops::BinaryOp;
    use crate::ir::stamp::Constant;

    #[test]
    fn test_add_maintains_usages() {
        let mut g = Graph::new();
        let a = g.add(NodeOp::Param(0), Stamp::int(64), &[]);
        let b = g.add(NodeOp::Param(1), Stamp::int(64), &[]);
        let sum = g.add(NodeOp::Binary(BinaryOp::Add), Stamp::int(64), &[a, b]);

        assert_eq!(g.node(sum).inputs(), &[a, b]);
        assert_eq!(g.node(a).usages(), &[sum]);
        assert_eq!(g.node(b).usages(), &[sum]);
    }

    #[test]
    fn test_unique_value_numbers_commutative() {
        let mut g = Graph::new();
        let a = g.add(NodeOp::Param(0), Stamp::int(64), &[]);
        let b = g.add(NodeOp::Param(1), Stamp::int(64), &[]);

        let ab = g.unique(NodeOp::Binary(BinaryOp::Add), Stamp::int(64), &[a, b]);
        let ba = g.unique(NodeOp::Binary(BinaryOp::Add), Stamp::int(64), &[b, a]);
        assert_eq!(ab, ba);

        let sub = g.unique(NodeOp::Binary(BinaryOp::Sub), Stamp::int(64), &[a, b]);
        assert_ne!(ab, sub);
    }

    #[test]
    fn test_unique_ignores_deleted_cache_entries() {
        let mut g = Graph::new();
        let seven = g.unique(NodeOp::Const(Constant::Int(7)), Stamp::int_constant(64, 7), &[]);
        g.kill(seven).unwrap();

        let again = g.unique(NodeOp::Const(Constant::Int(7)), Stamp::int_constant(64, 7), &[]);
        assert_ne!(seven, again);
        assert!(g.is_alive(again));
    }

    #[test]
    fn test_replace_and_delete_reroutes_usages() {
        let mut g = Graph::new();
        let a = g.add(NodeOp::Param(0), Stamp::int(64), &[]);
        let zero = g.add(NodeOp::Const(Constant::Int(0)), Stamp::int_constant(64, 0), &[]);
        let sum = g.add(NodeOp::Binary(BinaryOp::Add), Stamp::int(64), &[a, zero]);
        let user = g.add(NodeOp::Binary(BinaryOp::Mul), Stamp::int(64), &[sum, sum]);
        let ret = g.add(NodeOp::Return, Stamp::Void, &[user]);
        g.append_next(g.start(), ret).unwrap();

        g.replace_and_delete(sum, a).unwrap();

        assert!(g.is_deleted(sum));
        assert_eq!(g.node(user).inputs(), &[a, a]);
        assert!(g.node(a).usages().contains(&user));
        g.verify().unwrap();
    }

    #[test]
    fn test_kill_refuses_live_usages() {
        let mut g = Graph::new();
        let a = g.add(NodeOp::Param(0), Stamp::int(64), &[]);
        let _user = g.add(NodeOp::Binary(BinaryOp::Add), Stamp::int(64), &[a, a]);

        assert!(matches!(
            g.kill(a),
            Err(crate::Error::InvariantViolation { .. })
        ));
        assert!(g.is_alive(a));
    }

    #[test]
    fn test_fixed_chain_splicing() {
        let mut g = Graph::new();
        let obj = g.add(NodeOp::Param(0), Stamp::object(None), &[]);
        let ret = g.add(NodeOp::Return, Stamp::Void, &[]);
        g.append_next(g.start(), ret).unwrap();

        let check = g.add(NodeOp::NullCheck, Stamp::Void, &[obj]);
        g.insert_before_fixed(ret, check).unwrap();

        assert_eq!(g.node(g.start()).successors(), &[check]);
        assert_eq!(g.node(check).successors(), &[ret]);
        assert_eq!(g.node(ret).preds(), &[check]);
        g.verify().unwrap();
    }

    #[test]
    fn test_prev_begin_walks_chain() {
        let mut g = Graph::new();
        let obj = g.add(NodeOp::Param(0), Stamp::object(None), &[]);
        let check = g.add(NodeOp::NullCheck, Stamp::Void, &[obj]);
        let ret = g.add(NodeOp::Return, Stamp::Void, &[]);
        g.append_next(g.start(), check).unwrap();
        g.append_next(check, ret).unwrap();

        assert_eq!(g.prev_begin(ret).unwrap(), g.start());
        assert_eq!(g.prev_begin(g.start()).unwrap(), g.start());
    }

    #[test]
    fn test_mark_sees_only_new_nodes() {
        let mut g = Graph::new();
        let _a = g.add(NodeOp::Param(0), Stamp::int(64), &[]);
        let mark = g.mark();
        let b = g.add(NodeOp::Param(1), Stamp::int(64), &[]);
        let c = g.add(NodeOp::Param(2), Stamp::int(64), &[]);

        assert_eq!(g.nodes_created_since(mark), vec![b, c]);
        assert!(g.nodes_created_since(g.mark()).is_empty());
    }

    #[test]
    fn test_verify_checks_successor_arity() {
        let mut g = Graph::new();
        // Start has no successor yet.
        assert!(matches!(
            g.verify(),
            Err(crate::Error::InvariantViolation { .. })
        ));

        let ret = g.add(NodeOp::Return, Stamp::Void, &[]);
        g.append_next(g.start(), ret).unwrap();
        g.verify().unwrap();
    }
}
