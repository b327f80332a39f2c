//! Tree errors (no I/O concerns)

use thiserror::Error;

use crate::id::NodeId;

/// Structural violations raised by mutating operations.
///
/// Every variant is a hard failure: the operation that returned it left the
/// tree exactly as it was before the call.
#[derive(Error, Debug)]
pub enum TreeError {
    #[error("node not found: {0}")]
    NotFound(String),

    #[error("cyclic reference: {node} cannot be placed under its own descendant {target}")]
    CyclicReference { node: NodeId, target: NodeId },

    #[error("cannot move node to itself: {0}")]
    SelfMove(NodeId),

    #[error("duplicate node: {0}")]
    DuplicateNode(NodeId),

    #[error("node is marked as readonly: {0}")]
    ReadonlyViolation(String),

    #[error("node belongs to a different tree: {0}")]
    CrossTreeReference(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {message}")]
    Config { message: String },
}

impl TreeError {
    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }
}

/// Result type for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
