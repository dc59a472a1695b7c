//! Command-graph error taxonomy.
//!
//! Structural invariant violations are the one class of error
//! this crate treats as a programmer error rather than something to
//! recover from — callers are expected to log and abort, not retry. They
//! are still returned as `Result`s rather than panicking directly
//! (`tasker-client/src/error.rs`'s style: every failure is a typed
//! variant, even ones the caller will choose to treat as fatal).

use thiserror::Error;

use rt_shared::CommandId;

/// Errors raised by the command graph store and serializer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A dependency edge was added (or discovered during serialization)
    /// between two commands on different nodes, outside the push/await-push
    /// pairing exception. Fatal.
    #[error("dependency edge crosses nodes: {pred} (node {pred_nid}) -> {succ} (node {succ_nid})")]
    CrossNodeDependency {
        pred: CommandId,
        pred_nid: String,
        succ: CommandId,
        succ_nid: String,
    },

    /// A command was flushed a second time. Fatal.
    #[error("command {0} was already flushed")]
    DoubleFlush(CommandId),

    /// A handle did not resolve to a live command, e.g. after erasure.
    #[error("unknown or erased command {0:?}")]
    UnknownCommand(CommandId),

    /// `pair_push_await` was called with commands of the wrong kind.
    #[error("expected an await_push/push pair, got {0}")]
    NotAPushPair(String),

    /// The sink returned an error from `emit`; the command was not marked
    /// flushed.
    #[error("emit failed for command {0}: {1}")]
    EmitFailed(CommandId, String),

    /// `flush` was asked to serialize task commands spanning more than one
    /// task, or a non-task-command kind. Fatal.
    #[error("{0}")]
    InvariantViolation(String),
}
