//! StepSync Core - causal step synchronization for collaborative rich text
//!
//! Every participant holds its own copy of a document tree and a history of
//! steps. Local edits become steps that are broadcast; remote steps are
//! placed into history by a deterministic rule, reverting and reapplying
//! local steps when needed, so that everyone who has seen the same steps
//! holds the same tree.
//!
//! It implements:
//! - An oid-indexed document arena with exactly invertible mutation records
//! - A step store that can apply, revert and snapshot history
//! - A reconciler that appends, rebases or escalates to resynchronization
//! - Selection projection by `(oid, offset)` across rewritten history
//! - Text commands and an HTML-like fixture format with selection markers
//!
//! # Examples
//!
//! ```rust
//! use stepsync_core::{commands, EngineConfig, Participant, RecordingTransport, Snapshot};
//!
//! let snapshot = Snapshot::from_markup("<p>ab[c1}{c1]</p><p>cd[c2}{c2]</p>", "div").unwrap();
//! let mut c1 = Participant::from_snapshot(EngineConfig::new("c1"), RecordingTransport::new(), &snapshot).unwrap();
//! let mut c2 = Participant::from_snapshot(EngineConfig::new("c2"), RecordingTransport::new(), &snapshot).unwrap();
//!
//! c1.edit(|ctx| commands::insert_text(ctx, "e")).unwrap();
//! c2.edit(|ctx| commands::insert_text(ctx, "f")).unwrap();
//!
//! for step in c1.transport_mut().take_sent() {
//!     c2.on_incoming_step(step);
//! }
//! for step in c2.transport_mut().take_sent() {
//!     c1.on_incoming_step(step);
//! }
//!
//! assert_eq!(c1.document().to_html(), "<p>abe</p><p>cdf</p>");
//! assert_eq!(c1.document().to_json().unwrap(), c2.document().to_json().unwrap());
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod history;
pub mod mutation;
pub mod selection;
pub mod sync;
pub mod tree;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-exports for convenience
pub use config::EngineConfig;
pub use error::{Result, SyncError};
pub use history::{Snapshot, Step, StepId, StepStore};
pub use mutation::{Anchor, MutationRecord, MutationRecorder};
pub use selection::{Position, ResolvedSelection, SelectionProjector, SelectionSnapshot};
pub use sync::{EditContext, Participant, Reconciler, Reconciliation, RecordingTransport, Transport};
pub use tree::{Document, IdentityRegistry, Oid, SerializedNode};

/// Participant identifier type
pub type ParticipantId = String;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_import() {
        let _participant: ParticipantId = "c1".to_string();
        let _root = Oid::root();
    }
}
