//! WASM bindings for StepSync
//!
//! JavaScript-friendly wrappers around a `Participant`. Every structured
//! value crosses the boundary as a JSON string.

pub mod bindings;
pub mod utils;

// Re-export main types
pub use bindings::{JsTransport, WasmParticipant};
