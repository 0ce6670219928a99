//! History: steps, snapshots and the local step store

pub mod snapshot;
pub mod step;
pub mod store;

pub use snapshot::Snapshot;
pub use step::{Step, StepId, INIT_STEP_ID};
pub use store::StepStore;
