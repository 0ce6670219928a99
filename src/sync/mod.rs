//! Synchronization: reconciling steps and driving a participant

pub mod participant;
pub mod reconciler;
pub mod transport;

pub use participant::{EditContext, Participant};
pub use reconciler::{insertion_index, Plan, Reconciler, Reconciliation};
pub use transport::{RecordingTransport, Transport};
