use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use crate::errors::AppError;
use crate::models::{SubmitRequest, SubmitResponse, TurnView, UnlockRequest};
use crate::service::attachment_encoder::RawFile;
use crate::service::portal_service::PortalService;

/// Multipart field that carries the selected file.
const FILE_FIELD: &str = "file";

// ── Sessions ─────────────────────────────────────────────────────────────────

/// POST `/api/sessions` — opens a new, locked portal session
pub async fn create_session_handler(State(svc): State<PortalService>) -> Response {
    let session = svc.create_session();
    (StatusCode::CREATED, Json(session.view())).into_response()
}

/// GET `/api/sessions/{id}` — full session state
pub async fn get_session_handler(
    Path(id): Path<String>,
    State(svc): State<PortalService>,
) -> Response {
    respond(svc.get(&id).map(|session| session.view()))
}

/// DELETE `/api/sessions/{id}`
pub async fn end_session_handler(
    Path(id): Path<String>,
    State(svc): State<PortalService>,
) -> Response {
    match svc.end_session(&id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST `/api/sessions/{id}/unlock` — checks the access key
pub async fn unlock_handler(
    Path(id): Path<String>,
    State(svc): State<PortalService>,
    Json(body): Json<UnlockRequest>,
) -> Response {
    respond(svc.get(&id).and_then(|session| {
        session.unlock(&body.access_key)?;
        Ok(session.view())
    }))
}

/// POST `/api/sessions/{id}/lock` — discards the conversation
pub async fn lock_handler(Path(id): Path<String>, State(svc): State<PortalService>) -> Response {
    respond(svc.get(&id).map(|session| {
        session.lock();
        session.view()
    }))
}

// ── Conversation ─────────────────────────────────────────────────────────────

/// GET `/api/sessions/{id}/turns` — ordered conversation history
pub async fn list_turns_handler(
    Path(id): Path<String>,
    State(svc): State<PortalService>,
) -> Response {
    respond(svc.get(&id).map(|session| {
        session
            .snapshot()
            .iter()
            .map(|turn| TurnView::from(turn.as_ref()))
            .collect::<Vec<_>>()
    }))
}

/// POST `/api/sessions/{id}/submit` — sends one research turn and returns the reply
pub async fn submit_handler(
    Path(id): Path<String>,
    State(svc): State<PortalService>,
    Json(body): Json<SubmitRequest>,
) -> Response {
    let session = match svc.get(&id) {
        Ok(session) => session,
        Err(e) => return error_response(&e),
    };

    // Detached so a dropped HTTP request cannot strand the session mid-turn.
    let task = tokio::spawn(async move { session.submit(&body.query).await });
    let result = match task.await {
        Ok(result) => result,
        Err(e) => {
            error!("Research task for session {id} aborted: {e}");
            Err(AppError::Unexpected("research task aborted".to_string()))
        }
    };

    respond(result.map(|turn| SubmitResponse {
        turn: turn.map(|t| TurnView::from(t.as_ref())),
    }))
}

// ── Attachments ──────────────────────────────────────────────────────────────

/// PUT `/api/sessions/{id}/attachment` — multipart upload replacing the pending file
pub async fn upload_attachment_handler(
    Path(id): Path<String>,
    State(svc): State<PortalService>,
    multipart: Multipart,
) -> Response {
    let session = match svc.get(&id) {
        Ok(session) => session,
        Err(e) => return error_response(&e),
    };
    let selection = match read_file_field(multipart, svc.max_attachment_bytes()).await {
        Ok(selection) => selection,
        Err(e) => return error_response(&e),
    };
    respond(session.select_attachment(selection).await)
}

/// DELETE `/api/sessions/{id}/attachment`
pub async fn clear_attachment_handler(
    Path(id): Path<String>,
    State(svc): State<PortalService>,
) -> Response {
    match svc.get(&id) {
        Ok(session) => {
            session.clear_attachment();
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn read_file_field(
    mut multipart: Multipart,
    max_bytes: usize,
) -> Result<Option<RawFile>, AppError> {
    let invalid = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::UploadTooLarge { max_bytes }
        } else {
            AppError::InvalidUpload { message: e.body_text() }
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let media_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(invalid)?;
        // A file input submitted with nothing chosen arrives as an unnamed, empty part.
        if name.is_empty() && bytes.is_empty() {
            return Ok(None);
        }
        return Ok(Some(RawFile::new(name, media_type, bytes.to_vec())));
    }
    Ok(None)
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn respond<T: Serialize>(result: Result<T, AppError>) -> Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub(crate) fn error_response(err: &AppError) -> Response {
    let status = if err.is_validation() {
        StatusCode::BAD_REQUEST
    } else if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if err.is_conflict() {
        StatusCode::CONFLICT
    } else if err.is_too_large() {
        StatusCode::PAYLOAD_TOO_LARGE
    } else {
        match err {
            AppError::AccessDenied { .. } => StatusCode::UNAUTHORIZED,
            AppError::SessionLocked => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    };

    if status.is_server_error() {
        error!("Portal request failed: {err}");
    } else {
        warn!("Portal request rejected ({status}): {err}");
    }
    (status, Json(ErrorBody { error: err.to_string() })).into_response()
}
