pub mod api_routes;
pub mod ws_routes;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::portal_service::PortalService;
use api_routes::{
    clear_attachment_handler, create_session_handler, end_session_handler, get_session_handler,
    list_turns_handler, lock_handler, submit_handler, unlock_handler, upload_attachment_handler,
};
use ws_routes::ws_session_handler;

/// Room for multipart framing around the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router(svc: PortalService, max_attachment_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/sessions", post(create_session_handler))
        .route(
            "/api/sessions/{id}",
            get(get_session_handler).delete(end_session_handler),
        )
        .route("/api/sessions/{id}/unlock", post(unlock_handler))
        .route("/api/sessions/{id}/lock", post(lock_handler))
        .route("/api/sessions/{id}/turns", get(list_turns_handler))
        .route("/api/sessions/{id}/submit", post(submit_handler))
        .route(
            "/api/sessions/{id}/attachment",
            put(upload_attachment_handler)
                .delete(clear_attachment_handler)
                .layer(DefaultBodyLimit::max(max_attachment_bytes + MULTIPART_OVERHEAD_BYTES)),
        )
        .route("/ws/sessions/{id}", get(ws_session_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(svc)
}
