use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CloseEvent, MessageEvent, WebSocket};

use crate::api::ws_url;
use crate::models::PortalEvent;

/// Opens the session's event stream and hands every decoded event to `on_event`.
/// The connection and its closures live as long as the page.
pub fn subscribe(
    session_id: &str,
    on_event: impl Fn(PortalEvent) + 'static,
    on_error: impl Fn(String) + 'static,
) -> Option<WebSocket> {
    let ws = match WebSocket::new(&ws_url(session_id)) {
        Ok(ws) => ws,
        Err(e) => {
            on_error(format!("Failed to connect: {e:?}"));
            return None;
        }
    };
    ws.set_binary_type(web_sys::BinaryType::Arraybuffer);

    // --- onmessage: dispatch PortalEvent ---
    let onmessage = Closure::<dyn Fn(MessageEvent)>::new(move |ev: MessageEvent| {
        if let Some(text) = ev.data().as_string() {
            match serde_json::from_str::<PortalEvent>(&text) {
                Ok(event) => on_event(event),
                Err(e) => log::warn!("Unrecognised portal event: {e}"),
            }
        }
    });
    ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget();

    // --- onclose ---
    let onclose = Closure::<dyn Fn(CloseEvent)>::new(move |ev: CloseEvent| {
        if !ev.was_clean() {
            on_error("Lost connection to the research portal. Reload the page.".to_string());
        }
    });
    ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));
    onclose.forget();

    Some(ws)
}
