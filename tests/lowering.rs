//! End-to-end tests of the lowering pipeline through the public API.

use seaflow::prelude::*;

struct TestMeta;

impl MetaProvider for TestMeta {
    fn can_be_statically_bound(&self, _: MethodId) -> bool {
        false
    }
    fn resolve_concrete_method(&self, _: MethodId, _: TypeId) -> Option<MethodId> {
        None
    }
    fn unique_concrete_subtype(&self, _: TypeId) -> Option<TypeId> {
        None
    }
    fn unique_concrete_method(&self, _: MethodId, _: TypeId) -> Option<MethodId> {
        None
    }
    fn single_implementor(&self, _: TypeId) -> Option<TypeId> {
        None
    }
    fn is_interface(&self, _: TypeId) -> bool {
        false
    }
    fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        sub == sup
    }
    fn declaring_type(&self, _: MethodId) -> TypeId {
        TypeId(0)
    }
    fn signature(&self, _: MethodId) -> MethodSignature {
        MethodSignature {
            arity: 1,
            return_stamp: Stamp::Void,
        }
    }
}

struct TestStamps {
    registry: LocationRegistry,
}

impl TestStamps {
    fn new() -> Self {
        let registry = LocationRegistry::new();
        registry.create("object:hub", true).unwrap();
        Self { registry }
    }

    fn field(&self, name: &str) -> LocationIdentity {
        match self.registry.lookup(name) {
            Some(identity) => identity,
            None => self.registry.create(name, false).unwrap(),
        }
    }
}

impl StampProvider for TestStamps {
    fn hub_location(&self) -> LocationIdentity {
        self.registry.lookup("object:hub").unwrap()
    }
}

fn context<'a>(meta: &'a TestMeta, stamps: &'a TestStamps) -> PhaseContext<'a> {
    PhaseContext::new(meta, stamps)
}

/// The single live `Read` node in the graph.
fn find_read(graph: &Graph, location: &LocationIdentity) -> Option<NodeId> {
    graph.node_ids().find(|&id| {
        matches!(graph.node(id).op(), NodeOp::Read { location: l } if l == location)
    })
}

fn guard_nodes(graph: &Graph) -> Vec<NodeId> {
    graph
        .node_ids()
        .filter(|&id| {
            matches!(
                graph.node(id).op(),
                NodeOp::Guard { .. } | NodeOp::NullCheck
            )
        })
        .collect()
}

#[test]
fn test_load_field_lowers_to_guarded_read() {
    let meta = TestMeta;
    let stamps = TestStamps::new();
    let location = stamps.field("field:value");

    let mut g = Graph::new();
    let obj = g.add(NodeOp::Param(0), Stamp::object(None), &[]);
    let load = g.add(
        NodeOp::LoadField {
            location: location.clone(),
        },
        Stamp::int(64),
        &[obj],
    );
    g.append_next(g.start(), load).unwrap();
    let ret = g.add(NodeOp::Return, Stamp::Void, &[load]);
    g.append_next(load, ret).unwrap();

    let mut ctx = context(&meta, &stamps);
    LoweringPhase::run(&mut g, &mut ctx).unwrap();
    g.verify().unwrap();

    assert!(g.is_deleted(load));
    let read = find_read(&g, &location).unwrap();
    assert_eq!(g.node(ret).inputs(), &[read]);

    // Nullable receiver: the read carries a floating guard on a negated
    // is-null condition.
    let &[receiver, guard] = g.node(read).inputs() else {
        panic!("read is missing its guard input");
    };
    assert_eq!(receiver, obj);
    let NodeOp::Guard { negated, .. } = g.node(guard).op() else {
        panic!("guard input is not a guard");
    };
    assert!(*negated);
    let condition = g.node(guard).inputs()[0];
    assert!(matches!(g.node(condition).op(), NodeOp::IsNull));

    assert_eq!(ctx.events.count(EventKind::Lowered), 1);
    assert_eq!(ctx.events.count(EventKind::GuardCreated), 1);
}

#[test]
fn test_null_check_elided_for_non_null_receiver() {
    let meta = TestMeta;
    let stamps = TestStamps::new();
    let location = stamps.field("field:value");

    for stage in [GuardsStage::FloatingGuards, GuardsStage::FixedDeopts] {
        let mut g = Graph::new();
        g.set_guards_stage(stage);
        let obj = g.add(NodeOp::Param(0), Stamp::object_non_null(None), &[]);
        let load = g.add(
            NodeOp::LoadField {
                location: location.clone(),
            },
            Stamp::int(64),
            &[obj],
        );
        g.append_next(g.start(), load).unwrap();
        let ret = g.add(NodeOp::Return, Stamp::Void, &[load]);
        g.append_next(load, ret).unwrap();

        let mut ctx = context(&meta, &stamps);
        LoweringPhase::run(&mut g, &mut ctx).unwrap();
        g.verify().unwrap();

        // Both stages: proven non-null means no guarding node of any form.
        let read = find_read(&g, &location).unwrap();
        assert_eq!(g.node(read).inputs(), &[obj]);
        assert!(guard_nodes(&g).is_empty());
        assert_eq!(ctx.events.count(EventKind::NullCheckElided), 1);
        assert_eq!(ctx.events.count(EventKind::GuardCreated), 0);
    }
}

#[test]
fn test_fixed_stage_inserts_null_check_before_consumer() {
    let meta = TestMeta;
    let stamps = TestStamps::new();
    let location = stamps.field("field:value");

    let mut g = Graph::new();
    g.set_guards_stage(GuardsStage::FixedDeopts);
    let obj = g.add(NodeOp::Param(0), Stamp::object(None), &[]);
    let load = g.add(
        NodeOp::LoadField {
            location: location.clone(),
        },
        Stamp::int(64),
        &[obj],
    );
    g.append_next(g.start(), load).unwrap();
    let ret = g.add(NodeOp::Return, Stamp::Void, &[load]);
    g.append_next(load, ret).unwrap();

    let mut ctx = context(&meta, &stamps);
    LoweringPhase::run(&mut g, &mut ctx).unwrap();
    g.verify().unwrap();

    // Fixed representation: a dedicated null check on the same value sits
    // directly before the read in the control chain.
    let read = find_read(&g, &location).unwrap();
    assert_eq!(g.node(read).inputs(), &[obj]);
    let &[check] = g.node(read).preds() else {
        panic!("read has no single predecessor");
    };
    assert!(matches!(g.node(check).op(), NodeOp::NullCheck));
    assert_eq!(g.node(check).inputs(), &[obj]);
    assert_eq!(g.node(check).preds(), &[g.start()]);
}

#[test]
fn test_guard_deduplication_within_a_path() {
    let meta = TestMeta;
    let stamps = TestStamps::new();
    let first = stamps.field("field:a");
    let second = stamps.field("field:b");

    let mut g = Graph::new();
    let obj = g.add(NodeOp::Param(0), Stamp::object(None), &[]);
    let load_a = g.add(
        NodeOp::LoadField {
            location: first.clone(),
        },
        Stamp::int(64),
        &[obj],
    );
    let load_b = g.add(
        NodeOp::LoadField {
            location: second.clone(),
        },
        Stamp::int(64),
        &[obj],
    );
    g.append_next(g.start(), load_a).unwrap();
    g.append_next(load_a, load_b).unwrap();
    let ret = g.add(NodeOp::Return, Stamp::Void, &[load_b]);
    g.append_next(load_b, ret).unwrap();

    let mut ctx = context(&meta, &stamps);
    LoweringPhase::run(&mut g, &mut ctx).unwrap();
    g.verify().unwrap();

    // Same receiver, same path: the second load reuses the first guard.
    assert_eq!(ctx.events.count(EventKind::GuardCreated), 1);
    assert_eq!(ctx.events.count(EventKind::GuardReused), 1);
    let read_a = find_read(&g, &first).unwrap();
    let read_b = find_read(&g, &second).unwrap();
    assert_eq!(g.node(read_a).inputs()[1], g.node(read_b).inputs()[1]);
}

#[test]
fn test_guards_not_reused_across_sibling_blocks() {
    let meta = TestMeta;
    let stamps = TestStamps::new();
    let first = stamps.field("field:a");
    let second = stamps.field("field:b");

    let mut g = Graph::new();
    let obj = g.add(NodeOp::Param(0), Stamp::object(None), &[]);
    let cond = g.add(NodeOp::Param(1), Stamp::boolean(), &[]);
    let branch = g.add(NodeOp::If, Stamp::Void, &[cond]);
    g.append_next(g.start(), branch).unwrap();

    let then_begin = g.add(NodeOp::Begin, Stamp::Void, &[]);
    let load_a = g.add(
        NodeOp::LoadField {
            location: first.clone(),
        },
        Stamp::int(64),
        &[obj],
    );
    let then_end = g.add(NodeOp::End, Stamp::Void, &[]);
    g.append_next(then_begin, load_a).unwrap();
    g.append_next(load_a, then_end).unwrap();

    let else_begin = g.add(NodeOp::Begin, Stamp::Void, &[]);
    let load_b = g.add(
        NodeOp::LoadField {
            location: second.clone(),
        },
        Stamp::int(64),
        &[obj],
    );
    let else_end = g.add(NodeOp::End, Stamp::Void, &[]);
    g.append_next(else_begin, load_b).unwrap();
    g.append_next(load_b, else_end).unwrap();

    g.set_branch_targets(branch, then_begin, else_begin).unwrap();
    let merge = g.add(NodeOp::Merge, Stamp::Void, &[then_end, else_end]);
    g.append_next(then_end, merge).unwrap();
    g.append_next(else_end, merge).unwrap();
    let ret = g.add(NodeOp::Return, Stamp::Void, &[]);
    g.append_next(merge, ret).unwrap();

    let mut ctx = context(&meta, &stamps);
    LoweringPhase::run(&mut g, &mut ctx).unwrap();
    g.verify().unwrap();

    // The arms do not dominate each other; a guard retired with the first
    // arm's sub-tree must not satisfy the second arm.
    assert_eq!(ctx.events.count(EventKind::GuardCreated), 2);
    assert_eq!(ctx.events.count(EventKind::GuardReused), 0);
    let read_a = find_read(&g, &first).unwrap();
    let read_b = find_read(&g, &second).unwrap();
    assert_ne!(g.node(read_a).inputs()[1], g.node(read_b).inputs()[1]);
}

#[test]
fn test_load_from_merged_value_converges() {
    let meta = TestMeta;
    let stamps = TestStamps::new();
    let location = stamps.field("field:value");

    // Two nullable values merge into a phi; the load's null-check guard is
    // created while the walk carries the entry anchor, yet its condition
    // only exists at the merge.
    let mut g = Graph::new();
    let first = g.add(NodeOp::Param(0), Stamp::object(None), &[]);
    let second = g.add(NodeOp::Param(1), Stamp::object(None), &[]);
    let cond = g.add(NodeOp::Param(2), Stamp::boolean(), &[]);
    let branch = g.add(NodeOp::If, Stamp::Void, &[cond]);
    g.append_next(g.start(), branch).unwrap();

    let then_begin = g.add(NodeOp::Begin, Stamp::Void, &[]);
    let then_end = g.add(NodeOp::End, Stamp::Void, &[]);
    g.append_next(then_begin, then_end).unwrap();
    let else_begin = g.add(NodeOp::Begin, Stamp::Void, &[]);
    let else_end = g.add(NodeOp::End, Stamp::Void, &[]);
    g.append_next(else_begin, else_end).unwrap();
    g.set_branch_targets(branch, then_begin, else_begin).unwrap();

    let merge = g.add(NodeOp::Merge, Stamp::Void, &[then_end, else_end]);
    g.append_next(then_end, merge).unwrap();
    g.append_next(else_end, merge).unwrap();
    let phi = g.add(NodeOp::Phi, Stamp::object(None), &[merge, first, second]);
    let load = g.add(
        NodeOp::LoadField {
            location: location.clone(),
        },
        Stamp::int(64),
        &[phi],
    );
    g.append_next(merge, load).unwrap();
    let ret = g.add(NodeOp::Return, Stamp::Void, &[load]);
    g.append_next(load, ret).unwrap();

    let mut ctx = context(&meta, &stamps);
    LoweringPhase::run(&mut g, &mut ctx).unwrap();
    g.verify().unwrap();

    let read = find_read(&g, &location).unwrap();
    let &[receiver, guard] = g.node(read).inputs() else {
        panic!("read is missing its guard input");
    };
    assert_eq!(receiver, phi);
    let condition = g.node(guard).inputs()[0];
    assert_eq!(g.node(condition).inputs(), &[phi]);
    assert_eq!(ctx.events.count(EventKind::GuardCreated), 1);
}

#[test]
fn test_instance_of_lowers_to_hub_compare() {
    let meta = TestMeta;
    let stamps = TestStamps::new();

    let mut g = Graph::new();
    let obj = g.add(
        NodeOp::Param(0),
        Stamp::object_non_null(Some(TypeId(4))),
        &[],
    );
    let test = g.add(NodeOp::InstanceOf { ty: TypeId(4) }, Stamp::boolean(), &[obj]);
    let ret = g.add(NodeOp::Return, Stamp::Void, &[test]);
    g.append_next(g.start(), ret).unwrap();

    let mut ctx = context(&meta, &stamps);
    LoweringPhase::run(&mut g, &mut ctx).unwrap();
    g.verify().unwrap();

    assert!(g.is_deleted(test));
    let compare = g.node(ret).inputs()[0];
    assert!(matches!(g.node(compare).op(), NodeOp::HubEquals));

    // The hub itself became a read from the hub location, spliced into the
    // control chain.
    let hub_read = find_read(&g, &stamps.hub_location()).unwrap();
    assert!(g.node(compare).inputs().contains(&hub_read));
    assert_eq!(g.node(hub_read).preds(), &[g.start()]);
}

#[test]
fn test_hub_load_lowering_delegates_to_the_provider() {
    // A platform keeping hubs in a side table rather than the object header.
    struct SideTableStamps {
        registry: LocationRegistry,
    }

    impl StampProvider for SideTableStamps {
        fn hub_location(&self) -> LocationIdentity {
            self.registry.lookup("object:hub").unwrap()
        }

        fn lower_load_hub(
            &self,
            graph: &mut Graph,
            node: NodeId,
            last_fixed: NodeId,
        ) -> Result<NodeId> {
            let object = graph.node(node).inputs()[0];
            let read = graph.add(
                NodeOp::Read {
                    location: self.registry.lookup("hub:table").unwrap(),
                },
                self.hub_stamp(),
                &[object],
            );
            graph.insert_after_fixed(last_fixed, read)?;
            graph.replace_and_delete(node, read)?;
            Ok(read)
        }
    }

    let meta = TestMeta;
    let registry = LocationRegistry::new();
    registry.create("object:hub", true).unwrap();
    registry.create("hub:table", true).unwrap();
    let stamps = SideTableStamps { registry };

    let mut g = Graph::new();
    let obj = g.add(
        NodeOp::Param(0),
        Stamp::object_non_null(Some(TypeId(4))),
        &[],
    );
    let test = g.add(NodeOp::InstanceOf { ty: TypeId(4) }, Stamp::boolean(), &[obj]);
    let ret = g.add(NodeOp::Return, Stamp::Void, &[test]);
    g.append_next(g.start(), ret).unwrap();

    let mut ctx = PhaseContext::new(&meta, &stamps);
    LoweringPhase::run(&mut g, &mut ctx).unwrap();
    g.verify().unwrap();

    // The hub read went through the provider's override, not the default.
    assert!(g.is_deleted(test));
    let table = stamps.registry.lookup("hub:table").unwrap();
    assert!(find_read(&g, &table).is_some());
    assert!(find_read(&g, &stamps.hub_location()).is_none());
}

#[test]
fn test_lowering_is_idempotent_at_convergence() {
    let meta = TestMeta;
    let stamps = TestStamps::new();
    let location = stamps.field("field:value");

    let mut g = Graph::new();
    let obj = g.add(NodeOp::Param(0), Stamp::object(None), &[]);
    let load = g.add(
        NodeOp::LoadField { location },
        Stamp::int(64),
        &[obj],
    );
    g.append_next(g.start(), load).unwrap();
    let ret = g.add(NodeOp::Return, Stamp::Void, &[load]);
    g.append_next(load, ret).unwrap();

    let mut ctx = context(&meta, &stamps);
    LoweringPhase::run(&mut g, &mut ctx).unwrap();

    let converged = g.mark();
    let count = g.node_count();
    LoweringPhase::run(&mut g, &mut ctx).unwrap();

    assert!(g.nodes_created_since(converged).is_empty());
    assert_eq!(g.node_count(), count);
}

#[test]
fn test_distinct_locations_stay_independent() {
    let meta = TestMeta;
    let stamps = TestStamps::new();
    let first = stamps.field("field:a");
    let second = stamps.field("field:b");
    assert!(!first.overlaps(&second));

    let mut g = Graph::new();
    let obj = g.add(NodeOp::Param(0), Stamp::object_non_null(None), &[]);
    let load_a = g.add(
        NodeOp::LoadField {
            location: first.clone(),
        },
        Stamp::int(64),
        &[obj],
    );
    let load_b = g.add(
        NodeOp::LoadField {
            location: second.clone(),
        },
        Stamp::int(64),
        &[obj],
    );
    g.append_next(g.start(), load_a).unwrap();
    g.append_next(load_a, load_b).unwrap();
    let sum = g.add(
        NodeOp::Binary(BinaryOp::Add),
        Stamp::int(64),
        &[load_a, load_b],
    );
    let ret = g.add(NodeOp::Return, Stamp::Void, &[sum]);
    g.append_next(load_b, ret).unwrap();

    let mut ctx = context(&meta, &stamps);
    LoweringPhase::run(&mut g, &mut ctx).unwrap();
    g.verify().unwrap();

    // Lowering never wires a data edge between accesses to non-overlapping
    // locations.
    let read_a = find_read(&g, &first).unwrap();
    let read_b = find_read(&g, &second).unwrap();
    assert!(!g.node(read_a).inputs().contains(&read_b));
    assert!(!g.node(read_b).inputs().contains(&read_a));
}
