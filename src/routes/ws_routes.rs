use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::models::PortalEvent;
use crate::routes::api_routes::error_response;
use crate::service::portal_controller::PortalController;
use crate::service::portal_service::PortalService;

/// GET `/ws/sessions/{id}` — upgrades to a WebSocket carrying live session events.
pub async fn ws_session_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(svc): State<PortalService>,
) -> Response {
    match svc.get(&id) {
        Ok(session) => ws.on_upgrade(move |socket| stream_events(socket, session)),
        Err(e) => error_response(&e),
    }
}

/// Pushes session events to one subscriber.
///
/// Protocol:
/// - Server first sends `{ "type": "snapshot", "session": { ... } }`
/// - Then one JSON event per state change: `unlocked`, `locked`,
///   `turn_appended`, `loading`, `attachment_pending`
/// - A subscriber that falls behind receives a fresh `snapshot`.
///
/// Incoming client frames are ignored apart from `Close`.
async fn stream_events(socket: WebSocket, session: Arc<PortalController>) {
    info!(
        session = %session.id(),
        unlocked = session.is_unlocked(),
        loading = session.is_loading(),
        "WebSocket subscriber connected"
    );

    // Subscribe before the snapshot so nothing falls between the two.
    let mut events = session.subscribe();
    let (mut sink, mut incoming) = socket.split();

    let snapshot = PortalEvent::Snapshot { session: session.view() };
    if send_event(&mut sink, &snapshot).await.is_ok() {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        if send_event(&mut sink, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(session = %session.id(), skipped, "Subscriber lagged; resyncing");
                        let snapshot = PortalEvent::Snapshot { session: session.view() };
                        if send_event(&mut sink, &snapshot).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                frame = incoming.next() => match frame {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {e}");
                        break;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    info!(session = %session.id(), "WebSocket subscriber disconnected");
}

/// Helper: serialize a `PortalEvent` and send it over the socket.
async fn send_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &PortalEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => sink.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!("Failed to serialize portal event: {e}");
            Ok(())
        }
    }
}
