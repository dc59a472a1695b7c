//! Worker engine error taxonomy.
//!
//! A missing task definition is deliberately *not* a variant here — it is
//! a transient wait, encoded as [`crate::job::PollOutcome::Pending`], not
//! an error.

use thiserror::Error;

use rt_graph::GraphError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The device queue reported an unrecoverable failure for an in-flight
    /// compute job. Fatal for the node.
    #[error("device error: {0}")]
    Device(String),

    /// The buffer-transfer manager reported an unrecoverable failure.
    #[error("transfer error: {0}")]
    Transfer(String),

    /// A command-graph invariant was violated while the engine drove
    /// horizon pruning or looked up a command's dependency list.
    #[error(transparent)]
    Graph(#[from] GraphError),
}
