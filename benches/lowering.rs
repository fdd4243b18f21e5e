//! Benchmarks for the lowering pipeline.
//!
//! Measures the full schedule-walk-lower-canonicalize cycle on straight-line
//! field-access chains and on branchy graphs where guard deduplication and
//! the dominance walk do real work.

extern crate seaflow;

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use seaflow::prelude::*;

struct BenchMeta;

impl MetaProvider for BenchMeta {
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

struct BenchStamps {
    registry: LocationRegistry,
}

impl BenchStamps {
    fn new() -> Self {
        let registry = LocationRegistry::new();
        registry.create("object:hub", true).unwrap();
        Self { registry }
    }
}

impl StampProvider for BenchStamps {
    fn hub_location(&self) -> LocationIdentity {
        self.registry.lookup("object:hub").unwrap()
    }
}

/// Straight-line chain of `length` field loads off one nullable receiver.
///
/// One guard is created and reused `length - 1` times.
fn field_chain(fields: &[LocationIdentity]) -> Graph {
    let mut g = Graph::new();
    let obj = g.add(NodeOp::Param(0), Stamp::object(None), &[]);
    let mut prev = g.start();
    let mut last = obj;
    for location in fields {
        let load = g.add(
            NodeOp::LoadField {
                location: location.clone(),
            },
            Stamp::int(64),
            &[obj],
        );
        g.append_next(prev, load).unwrap();
        prev = load;
        last = load;
    }
    let ret = g.add(NodeOp::Return, Stamp::Void, &[last]);
    g.append_next(prev, ret).unwrap();
    g
}

/// A chain of diamonds, each arm loading a field off the shared receiver.
fn diamond_chain(diamonds: usize, fields: &[LocationIdentity]) -> Graph {
    let mut g = Graph::new();
    let obj = g.add(NodeOp::Param(0), Stamp::object(None), &[]);
    let cond = g.add(NodeOp::Param(1), Stamp::boolean(), &[]);
    let mut prev = g.start();
    for i in 0..diamonds {
        let branch = g.add(NodeOp::If, Stamp::Void, &[cond]);
        g.append_next(prev, branch).unwrap();
        let mut ends = Vec::with_capacity(2);
        let mut begins = Vec::with_capacity(2);
        for arm in 0..2 {
            let begin = g.add(NodeOp::Begin, Stamp::Void, &[]);
            let load = g.add(
                NodeOp::LoadField {
                    location: fields[(2 * i + arm) % fields.len()].clone(),
                },
                Stamp::int(64),
                &[obj],
            );
            let end = g.add(NodeOp::End, Stamp::Void, &[]);
            g.append_next(begin, load).unwrap();
            g.append_next(load, end).unwrap();
            begins.push(begin);
            ends.push(end);
        }
        g.set_branch_targets(branch, begins[0], begins[1]).unwrap();
        let merge = g.add(NodeOp::Merge, Stamp::Void, &[ends[0], ends[1]]);
        g.append_next(ends[0], merge).unwrap();
        g.append_next(ends[1], merge).unwrap();
        prev = merge;
    }
    let ret = g.add(NodeOp::Return, Stamp::Void, &[]);
    g.append_next(prev, ret).unwrap();
    g
}

fn bench_lower_field_chain(c: &mut Criterion) {
    let meta = BenchMeta;
    let stamps = BenchStamps::new();
    let fields: Vec<LocationIdentity> = (0..64)
        .map(|i| stamps.registry.create(&format!("field:{i}"), false).unwrap())
        .collect();

    c.bench_function("lower_field_chain_64", |b| {
        b.iter_batched(
            || field_chain(&fields),
            |mut g| {
                let mut ctx = PhaseContext::new(&meta, &stamps);
                LoweringPhase::run(&mut g, &mut ctx).unwrap();
                black_box(g)
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_lower_diamond_chain(c: &mut Criterion) {
    let meta = BenchMeta;
    let stamps = BenchStamps::new();
    let fields: Vec<LocationIdentity> = (0..32)
        .map(|i| stamps.registry.create(&format!("field:{i}"), false).unwrap())
        .collect();

    c.bench_function("lower_diamond_chain_16", |b| {
        b.iter_batched(
            || diamond_chain(16, &fields),
            |mut g| {
                let mut ctx = PhaseContext::new(&meta, &stamps);
                LoweringPhase::run(&mut g, &mut ctx).unwrap();
                black_box(g)
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_schedule_only(c: &mut Criterion) {
    let stamps = BenchStamps::new();
    let fields: Vec<LocationIdentity> = (0..64)
        .map(|i| stamps.registry.create(&format!("field:{i}"), false).unwrap())
        .collect();
    let g = field_chain(&fields);

    c.bench_function("schedule_field_chain_64", |b| {
        b.iter(|| {
            let schedule = Schedule::build(black_box(&g), SchedulingMode::Latest).unwrap();
            black_box(schedule)
        });
    });
}

criterion_group!(
    benches,
    bench_lower_field_chain,
    bench_lower_diamond_chain,
    bench_schedule_only
);
criterion_main!(benches);
