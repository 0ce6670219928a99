//! WASM utility functions

use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages in browser
#[wasm_bindgen(js_name = initPanicHook)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

/// Convert an engine error into a JS exception value
pub(crate) fn to_js(err: crate::SyncError) -> JsValue {
    JsValue::from_str(&err.to_string())
}
