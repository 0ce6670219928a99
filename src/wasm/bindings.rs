//! JavaScript bindings for a StepSync participant

use super::utils::to_js;
use crate::commands;
use crate::config::EngineConfig;
use crate::history::{Snapshot, Step};
use crate::selection::SelectionSnapshot;
use crate::sync::{Participant, Transport};
use js_sys::Function;
use wasm_bindgen::prelude::*;

/// Transport backed by two JS callbacks
///
/// `on_step` receives each local step as a JSON string; `on_resync` is
/// called with no arguments when a full snapshot is needed.
pub struct JsTransport {
    on_step: Function,
    on_resync: Function,
}

impl JsTransport {
    pub fn new(on_step: Function, on_resync: Function) -> Self {
        Self { on_step, on_resync }
    }
}

impl Transport for JsTransport {
    fn send_step(&mut self, step: &Step) {
        let json = match step.to_json() {
            Ok(json) => json,
            Err(err) => {
                tracing::error!(%err, step = %step.id, "failed to encode step");
                return;
            }
        };
        if self.on_step.call1(&JsValue::NULL, &JsValue::from_str(&json)).is_err() {
            tracing::warn!(step = %step.id, "step callback threw");
        }
    }

    fn request_resynchronization(&mut self) {
        if self.on_resync.call0(&JsValue::NULL).is_err() {
            tracing::warn!("resync callback threw");
        }
    }
}

/// JavaScript-friendly wrapper for Participant
#[wasm_bindgen]
pub struct WasmParticipant {
    inner: Participant<JsTransport>,
}

#[wasm_bindgen]
impl WasmParticipant {
    /// Create a participant from a JSON `EngineConfig` and two callbacks
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: String, on_step: Function, on_resync: Function) -> Result<WasmParticipant, JsValue> {
        let config = EngineConfig::from_json(&config_json).map_err(to_js)?;
        let inner = Participant::new(config, JsTransport::new(on_step, on_resync)).map_err(to_js)?;
        Ok(Self { inner })
    }

    /// Get the local participant ID
    #[wasm_bindgen(js_name = getParticipantId)]
    pub fn get_participant_id(&self) -> String {
        self.inner.id().clone()
    }

    /// Reconcile a remote step (JSON); returns the outcome name
    #[wasm_bindgen(js_name = receiveStep)]
    pub fn receive_step(&mut self, step_json: &str) -> Result<String, JsValue> {
        let outcome = self.inner.on_incoming_json(step_json).map_err(to_js)?;
        Ok(outcome.kind().to_string())
    }

    /// Insert text at the local caret; returns the new step id, if any
    #[wasm_bindgen(js_name = insertText)]
    pub fn insert_text(&mut self, text: &str) -> Result<Option<String>, JsValue> {
        let id = self
            .inner
            .edit(|ctx| commands::insert_text(ctx, text))
            .map_err(to_js)?;
        Ok(id.map(|id| id.to_string()))
    }

    /// Delete backward from the local caret; returns the new step id, if any
    #[wasm_bindgen(js_name = deleteBackward)]
    pub fn delete_backward(&mut self) -> Result<Option<String>, JsValue> {
        let id = self.inner.edit(commands::delete_backward).map_err(to_js)?;
        Ok(id.map(|id| id.to_string()))
    }

    /// Undo the latest own step; returns the undo step id
    #[wasm_bindgen(js_name = undo)]
    pub fn undo(&mut self) -> Result<String, JsValue> {
        self.inner.undo().map(|id| id.to_string()).map_err(to_js)
    }

    /// Move the local selection (JSON `{anchorNode, anchorOffset, focusNode, focusOffset}`)
    #[wasm_bindgen(js_name = setSelection)]
    pub fn set_selection(&mut self, selection_json: &str) -> Result<(), JsValue> {
        let selection: SelectionSnapshot = serde_json::from_str(selection_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid JSON: {}", e)))?;
        self.inner.set_selection(selection);
        Ok(())
    }

    /// Export a snapshot as JSON string
    #[wasm_bindgen(js_name = getSnapshot)]
    pub fn get_snapshot(&self) -> Result<String, JsValue> {
        self.inner.get_snapshot().to_json().map_err(to_js)
    }

    /// Replace all state with a snapshot (JSON)
    #[wasm_bindgen(js_name = resetAndSync)]
    pub fn reset_and_sync(&mut self, snapshot_json: &str) -> Result<(), JsValue> {
        let snapshot = Snapshot::from_json(snapshot_json).map_err(to_js)?;
        self.inner.reset_and_sync(&snapshot).map_err(to_js)
    }

    /// Whether a resynchronization request is outstanding
    #[wasm_bindgen(js_name = isResyncPending)]
    pub fn is_resync_pending(&self) -> bool {
        self.inner.is_resync_pending()
    }

    /// Drop a departed participant's selection
    #[wasm_bindgen(js_name = forgetParticipant)]
    pub fn forget_participant(&mut self, participant_id: &str) -> bool {
        self.inner.forget_participant(participant_id)
    }

    /// Content as HTML
    #[wasm_bindgen(js_name = toHTML)]
    pub fn to_html(&self) -> String {
        self.inner.document().to_html()
    }

    /// Content with every participant's selection markers
    #[wasm_bindgen(js_name = render)]
    pub fn render(&self) -> String {
        self.inner.render()
    }

    /// Export the document tree as JSON string
    #[wasm_bindgen(js_name = toJSON)]
    pub fn to_json(&self) -> Result<String, JsValue> {
        self.inner.document().to_json().map_err(to_js)
    }
}
