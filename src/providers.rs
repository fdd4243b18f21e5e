//! Provider interfaces to the surrounding runtime, and the per-pass context.
//!
//! The core never inspects class files or profiles itself; it asks narrow
//! trait interfaces: [`MetaProvider`] for method/type metadata,
//! [`StampProvider`] for platform stamps and well-known locations, and
//! [`ProfileProvider`] for profiling feedback. Optimistic answers (unique
//! subtype, unique override) are only usable when the caller supplied an
//! [`Assumptions`] recorder: the rewrite is taken and the assumption is
//! recorded as a dependency the runtime must re-validate, never trusted
//! silently. Missing providers or recorders degrade rewrites to their
//! conservative variants; they are not errors.

use std::collections::HashMap;

use crate::events::EventLog;
use crate::ir::{Constant, Graph, MethodId, NodeId, NodeOp, Stamp, TypeId};
use crate::location::LocationIdentity;
use crate::schedule::SchedulingMode;
use crate::Result;

/// Arity and return stamp of a method.
///
/// Call-target rewrites must leave both untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSignature {
    /// Number of arguments, receiver included for instance methods.
    pub arity: usize,
    /// Stamp of the return value.
    pub return_stamp: Stamp,
}

/// Method and type metadata queries answered by the runtime.
pub trait MetaProvider {
    /// Whether calls to the method always bind to it (final, private, or
    /// otherwise non-overridable).
    fn can_be_statically_bound(&self, method: MethodId) -> bool;

    /// Resolves the implementation of `declared` for an exact receiver
    /// type, if the type provides one.
    fn resolve_concrete_method(&self, declared: MethodId, receiver: TypeId) -> Option<MethodId>;

    /// The single concrete subtype of `ty` currently loaded, if there is
    /// exactly one. Optimistic: valid only under a recorded assumption.
    fn unique_concrete_subtype(&self, ty: TypeId) -> Option<TypeId>;

    /// The single implementation of `declared` reachable from receivers of
    /// `receiver`, if there is exactly one. Optimistic: valid only under a
    /// recorded assumption.
    fn unique_concrete_method(&self, declared: MethodId, receiver: TypeId) -> Option<MethodId>;

    /// The single loaded type implementing the interface `ty`, if there is
    /// exactly one. Unlike the unique-subtype query this is checked with a
    /// runtime type test, not an assumption.
    fn single_implementor(&self, ty: TypeId) -> Option<TypeId>;

    /// Whether `ty` is an interface.
    fn is_interface(&self, ty: TypeId) -> bool;

    /// Whether `sub` is a subtype of `sup`.
    fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool;

    /// The type declaring the method.
    fn declaring_type(&self, method: MethodId) -> TypeId;

    /// The method's signature.
    fn signature(&self, method: MethodId) -> MethodSignature;
}

/// Platform-specific stamps, well-known memory locations, and the lowering
/// of the operations whose representation depends on the object layout.
pub trait StampProvider {
    /// The stamp of a loaded type hub.
    fn hub_stamp(&self) -> Stamp {
        Stamp::Hub
    }

    /// The location identity of the hub slot in an object header.
    fn hub_location(&self) -> LocationIdentity;

    /// Lowers a hub load to the platform representation, returning the
    /// replacement node.
    ///
    /// The default reads the hub slot through [`Self::hub_location`],
    /// spliced into the control chain after `last_fixed`.
    ///
    /// # Errors
    ///
    /// Propagates graph splicing failures.
    fn lower_load_hub(&self, graph: &mut Graph, node: NodeId, last_fixed: NodeId) -> Result<NodeId> {
        let object = graph.node(node).inputs()[0];
        let read = graph.add(
            NodeOp::Read {
                location: self.hub_location(),
            },
            self.hub_stamp(),
            &[object],
        );
        graph.insert_after_fixed(last_fixed, read)?;
        graph.replace_and_delete(node, read)?;
        Ok(read)
    }

    /// Lowers a type check to the platform representation, returning the
    /// replacement node.
    ///
    /// The default emits the leaf fast path: load the receiver's hub and
    /// compare it to the tested type's hub. A failing compare on a proper
    /// subtype only retriggers the guarded fallback, never a wrong result
    /// for the guarded uses this crate emits.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if `node` is not a type check.
    fn lower_instance_of(&self, graph: &mut Graph, node: NodeId) -> Result<NodeId> {
        let NodeOp::InstanceOf { ty } = *graph.node(node).op() else {
            return Err(invariant_error!("{node} is not a type check"));
        };
        let object = graph.node(node).inputs()[0];
        let hub = graph.unique(NodeOp::LoadHub, self.hub_stamp(), &[object]);
        let expected = graph.unique(NodeOp::Const(Constant::Hub(ty)), Stamp::Hub, &[]);
        let compare = graph.unique(NodeOp::HubEquals, Stamp::boolean(), &[hub, expected]);
        graph.replace_and_delete(node, compare)?;
        Ok(compare)
    }
}

/// A recorded receiver-type observation at one call site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfiledType {
    /// The observed receiver type.
    pub ty: TypeId,
    /// The fraction of executions observing it, in `[0, 1]`.
    pub probability: f64,
}

/// Receiver-type profile of a call site.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeProfile {
    /// The observed types, most frequent first.
    pub types: Vec<ProfiledType>,
}

impl TypeProfile {
    /// The receiver type if the profile is monomorphic: exactly one
    /// observed type covering every execution.
    #[must_use]
    pub fn monomorphic_type(&self) -> Option<TypeId> {
        match self.types.as_slice() {
            [only] if only.probability >= 1.0 => Some(only.ty),
            _ => None,
        }
    }
}

/// Profiling feedback queries answered by the runtime.
pub trait ProfileProvider {
    /// The receiver-type profile recorded at a call site, if any.
    fn type_profile(&self, method: MethodId, bci: u32) -> Option<TypeProfile>;
}

/// One optimistic dependency of the compiled code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assumption {
    /// `context` has `subtype` as its only concrete subtype.
    ConcreteSubtype {
        /// The type the query was asked about.
        context: TypeId,
        /// Its assumed single concrete subtype.
        subtype: TypeId,
    },
    /// `declared` resolves to `implementation` for all receivers of
    /// `context`.
    ConcreteMethod {
        /// The declared method at the call site.
        declared: MethodId,
        /// The receiver type context of the assumption.
        context: TypeId,
        /// The assumed single implementation.
        implementation: MethodId,
    },
}

/// Recorder for the optimistic assumptions a compilation depends on.
///
/// An assumption failing at run time is not a compile-time error; the
/// runtime invalidates the compiled code and falls back through the guarded
/// deoptimization path.
#[derive(Debug, Default)]
pub struct Assumptions {
    recorded: Vec<Assumption>,
}

impl Assumptions {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a unique-concrete-subtype dependency.
    pub fn record_concrete_subtype(&mut self, context: TypeId, subtype: TypeId) {
        self.recorded.push(Assumption::ConcreteSubtype { context, subtype });
    }

    /// Records a unique-concrete-method dependency.
    pub fn record_concrete_method(
        &mut self,
        declared: MethodId,
        context: TypeId,
        implementation: MethodId,
    ) {
        self.recorded.push(Assumption::ConcreteMethod {
            declared,
            context,
            implementation,
        });
    }

    /// Iterates the recorded assumptions.
    pub fn iter(&self) -> impl Iterator<Item = &Assumption> {
        self.recorded.iter()
    }

    /// The number of recorded assumptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }
}

/// Tunables of the optimization pipeline.
#[derive(Debug, Clone, Copy)]
pub struct OptOptions {
    /// Whether logically identical guards below the same anchor are
    /// deduplicated.
    pub eliminate_guards: bool,
    /// Placement policy for floating nodes.
    pub scheduling: SchedulingMode,
    /// Cap on canonicalization sweeps (and on the drain of recursively
    /// lowered nodes) before the pipeline reports non-convergence.
    pub max_iterations: usize,
}

impl Default for OptOptions {
    fn default() -> Self {
        Self {
            eliminate_guards: true,
            scheduling: SchedulingMode::Latest,
            max_iterations: 16,
        }
    }
}

/// Everything a pass needs besides the graph itself.
pub struct PhaseContext<'a> {
    /// Method and type metadata.
    pub meta: &'a dyn MetaProvider,
    /// Platform stamps and locations.
    pub stamps: &'a dyn StampProvider,
    /// Profiling feedback, if available.
    pub profiles: Option<&'a dyn ProfileProvider>,
    /// Assumption recorder; `None` disables all optimistic rewrites.
    pub assumptions: Option<Assumptions>,
    /// Escape-analyzed objects whose exact type is known without a load;
    /// hub loads from them fold to constants.
    pub virtual_objects: HashMap<NodeId, TypeId>,
    /// Pipeline tunables.
    pub options: OptOptions,
    /// Rewrite log.
    pub events: EventLog,
}

impl<'a> PhaseContext<'a> {
    /// Creates a context with default options, no profiles, and optimistic
    /// rewrites disabled.
    pub fn new(meta: &'a dyn MetaProvider, stamps: &'a dyn StampProvider) -> Self {
        Self {
            meta,
            stamps,
            profiles: None,
            assumptions: None,
            virtual_objects: HashMap::new(),
            options: OptOptions::default(),
            events: EventLog::new(),
        }
    }

    /// Enables optimistic rewrites by attaching an assumption recorder.
    #[must_use]
    pub fn with_assumptions(mut self) -> Self {
        self.assumptions = Some(Assumptions::new());
        self
    }

    /// Attaches profiling feedback.
    #[must_use]
    pub fn with_profiles(mut self, profiles: &'a dyn ProfileProvider) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// Overrides the pipeline tunables.
    #[must_use]
    pub fn with_options(mut self, options: OptOptions) -> Self {
        self.options = options;
        self
    }
}
