use thiserror::Error;

macro_rules! invariant_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvariantViolation {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvariantViolation {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type covering all failures this library can return.
///
/// Only one class of error is ever visible to callers in practice: the fatal
/// invariant-violation class, which aborts the current compilation. Optimistic
/// assumption failures are not errors (they are recorded as
/// [`crate::providers::Assumptions`] to be re-validated at run time), and
/// missing optional information (no profile, no assumptions) degrades rewrites
/// to conservative variants instead of failing.
///
/// # Error Categories
///
/// ## Fatal invariant violations
/// - [`Error::InvariantViolation`] - Structural graph corruption, non-convergent
///   lowering, recursive-lowering incompleteness
/// - [`Error::UnschedulableNode`] - A floating node whose usages admit no legal
///   placement
/// - [`Error::DuplicateLocation`] - A location identity registered twice under
///   the same name
///
/// ## Construction errors
/// - [`Error::GraphError`] - Malformed input while building or wiring the graph
///
/// ## Synchronization
/// - [`Error::LockError`] - The registry's registration lock was poisoned
#[derive(Error, Debug)]
pub enum Error {
    /// A structural invariant of the graph or the lowering pipeline was violated.
    ///
    /// This covers dangling input/usage edges, a corrupt fixed-node chain,
    /// lowering that fails to converge within two rounds, and lowering rules
    /// that leave newly introduced lowerable nodes behind. The error carries
    /// the source location where the violation was detected. It is always
    /// fatal to the current compilation; there is no recovery.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the violated invariant, with graph context
    /// * `file` - Source file in which the violation was detected
    /// * `line` - Source line in which the violation was detected
    #[error("Invariant violation - {file}:{line}: {message}")]
    InvariantViolation {
        /// The message to be printed for the violation
        message: String,
        /// The source file in which this error occurred
        file: &'static str,
        /// The source line in which this error occurred
        line: u32,
    },

    /// A floating node could not be assigned to any block.
    ///
    /// Raised by the scheduler when a floating node's usages are scattered in
    /// a way that admits no placement consistent with dominance (for example,
    /// every usage is unreachable, or an input's block does not dominate the
    /// chosen block). This indicates a malformed graph, which is a programming
    /// error in whatever produced it, not a recoverable condition.
    #[error("Unschedulable floating node: {0}")]
    UnschedulableNode(String),

    /// A location identity with this name is already registered.
    ///
    /// Location identities are canonical by name; registering the same name
    /// twice would break the aliasing model, so it is rejected outright.
    #[error("Location identity '{0}' is already registered")]
    DuplicateLocation(String),

    /// Malformed input while constructing or wiring the graph.
    ///
    /// Covers construction-time mistakes such as appending a successor to a
    /// node that cannot have one, or wiring an edge to a deleted node.
    #[error("{0}")]
    GraphError(String),

    /// Failed to lock the location registry's registration path.
    ///
    /// Occurs only when the registration mutex was poisoned by a panic on
    /// another compiling thread.
    #[error("Failed to lock the location registry")]
    LockError,
}
