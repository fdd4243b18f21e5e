//! Rewrite-event logging.
//!
//! Every pass records what it changed into an [`EventLog`]: which rule
//! fired, on which node, with an optional free-form message. The log is the
//! observability surface of the pipeline; tests also use it to assert that
//! a specific rewrite did (or did not) fire.

use crate::ir::NodeId;

/// The kinds of rewrites and pipeline steps worth recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A canonicalization rule replaced a node.
    Canonicalized,
    /// A call target was devirtualized.
    Devirtualized,
    /// A new guard node was created.
    GuardCreated,
    /// An existing active guard was reused instead of creating a duplicate.
    GuardReused,
    /// A lowerable node was rewritten into lower-level nodes.
    Lowered,
    /// A full lowering round over the graph started.
    LoweringRound,
    /// A null check was skipped because the value is provably non-null.
    NullCheckElided,
}

/// A single recorded rewrite or pipeline step.
#[derive(Debug, Clone)]
pub struct Event {
    kind: EventKind,
    node: Option<NodeId>,
    message: Option<String>,
}

impl Event {
    /// The kind of event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The node the event concerns, if any.
    #[must_use]
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// The free-form detail message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// An append-only log of [`Event`]s.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts recording an event; finish it by dropping the builder.
    ///
    /// ```rust,ignore
    /// log.record(EventKind::Lowered).node(id).message("field load");
    /// ```
    pub fn record(&mut self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder {
            log: self,
            event: Some(Event {
                kind,
                node: None,
                message: None,
            }),
        }
    }

    /// Appends all events of `other`, leaving it empty.
    pub fn merge(&mut self, other: &mut EventLog) {
        self.events.append(&mut other.events);
    }

    /// The number of recorded events of the given kind.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    /// The total number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterates the recorded events in order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }
}

/// In-progress event; commits to the log when dropped.
pub struct EventBuilder<'a> {
    log: &'a mut EventLog,
    event: Option<Event>,
}

impl EventBuilder<'_> {
    /// Attaches the node the event concerns.
    pub fn node(mut self, node: NodeId) -> Self {
        if let Some(event) = &mut self.event {
            event.node = Some(node);
        }
        self
    }

    /// Attaches a detail message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        if let Some(event) = &mut self.event {
            event.message = Some(message.into());
        }
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            self.log.events.push(event);
        }
    }
}
