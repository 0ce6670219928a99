//! Error types for step synchronization.
//!
//! Errors fall into two families. Divergence errors mean the live tree no
//! longer matches what a mutation record expects; the only remedy is a full
//! resynchronization. Everything else is a local/API error that leaves the
//! participant's state untouched.

use crate::history::StepId;
use crate::tree::Oid;
use thiserror::Error;

/// Errors that can occur while editing, applying or reconciling steps.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A mutation referenced a node that does not exist in the live tree.
    #[error("node not found: {0}")]
    NodeNotFound(Oid),

    /// A mutation tried to create a node whose oid is already live.
    #[error("node already exists: {0}")]
    DuplicateNode(Oid),

    /// An insertion anchor is not a child of the target parent.
    #[error("anchor {anchor} is not a child of {parent}")]
    AnchorNotFound { parent: Oid, anchor: Oid },

    /// A text mutation targeted a node that is not a text node.
    #[error("node {0} is not a text node")]
    NotText(Oid),

    /// A structural or attribute mutation targeted a node that is not an element.
    #[error("node {0} is not an element")]
    NotElement(Oid),

    /// The document root can never be removed or re-parented.
    #[error("cannot remove the document root")]
    RootRemoval,

    /// A step id was expected in history but is absent.
    #[error("step not in history: {0}")]
    UnknownStep(StepId),

    /// There is no own step left to undo.
    #[error("nothing to undo")]
    NothingToUndo,

    /// Fixture markup could not be parsed.
    #[error("markup error at byte {offset}: {message}")]
    Markup { offset: usize, message: String },

    /// Invalid engine configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether this error means local and remote state have diverged.
    ///
    /// Divergence is never repaired in place; callers escalate to
    /// resynchronization.
    pub fn is_divergence(&self) -> bool {
        matches!(
            self,
            SyncError::NodeNotFound(_)
                | SyncError::DuplicateNode(_)
                | SyncError::AnchorNotFound { .. }
                | SyncError::NotText(_)
                | SyncError::NotElement(_)
                | SyncError::RootRemoval
                | SyncError::UnknownStep(_)
        )
    }
}

/// Result type for step synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
