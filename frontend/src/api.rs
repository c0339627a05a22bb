use gloo_net::http::{Request, Response};
use web_sys::{File, FormData};

use crate::models::{
    ApiError, AttachmentSummary, SessionView, SubmitRequest, SubmitResponse, UnlockRequest,
};

/// Base URL of the portal server.
const API_BASE: &str = "http://localhost:8080";

/// Pulls the `{ "error": ... }` message out of a failed response.
async fn error_message(resp: Response) -> String {
    let status = resp.status();
    resp.json::<ApiError>()
        .await
        .map(|e| e.error)
        .unwrap_or_else(|_| format!("Server error: {status}"))
}

/// Opens a new, locked portal session.
pub async fn create_session() -> Result<SessionView, String> {
    let resp = Request::post(&format!("{API_BASE}/api/sessions"))
        .send()
        .await
        .map_err(|e| format!("Network error: {e}"))?;

    if !resp.ok() {
        return Err(error_message(resp).await);
    }

    resp.json::<SessionView>()
        .await
        .map_err(|e| format!("Parse error: {e}"))
}

/// Current state of a session, including the full turn history.
pub async fn get_session(session_id: &str) -> Result<SessionView, String> {
    let resp = Request::get(&format!("{API_BASE}/api/sessions/{session_id}"))
        .send()
        .await
        .map_err(|e| format!("Network error: {e}"))?;

    if !resp.ok() {
        return Err(error_message(resp).await);
    }

    resp.json::<SessionView>()
        .await
        .map_err(|e| format!("Parse error: {e}"))
}

/// Submits an access key. A rejection comes back as `Err` with the server's reason.
pub async fn unlock(session_id: &str, access_key: &str) -> Result<SessionView, String> {
    let body = UnlockRequest { access_key: access_key.to_string() };
    let resp = Request::post(&format!("{API_BASE}/api/sessions/{session_id}/unlock"))
        .json(&body)
        .map_err(|e| format!("Serialize error: {e}"))?
        .send()
        .await
        .map_err(|e| format!("Network error: {e}"))?;

    if !resp.ok() {
        return Err(error_message(resp).await);
    }

    resp.json::<SessionView>()
        .await
        .map_err(|e| format!("Parse error: {e}"))
}

pub async fn lock(session_id: &str) -> Result<(), String> {
    let resp = Request::post(&format!("{API_BASE}/api/sessions/{session_id}/lock"))
        .send()
        .await
        .map_err(|e| format!("Network error: {e}"))?;

    if !resp.ok() {
        return Err(error_message(resp).await);
    }
    Ok(())
}

/// Sends one research turn; resolves once the assistant reply is in.
pub async fn submit(session_id: &str, query: &str) -> Result<SubmitResponse, String> {
    let body = SubmitRequest { query: query.to_string() };
    let resp = Request::post(&format!("{API_BASE}/api/sessions/{session_id}/submit"))
        .json(&body)
        .map_err(|e| format!("Serialize error: {e}"))?
        .send()
        .await
        .map_err(|e| format!("Network error: {e}"))?;

    if !resp.ok() {
        return Err(error_message(resp).await);
    }

    resp.json::<SubmitResponse>()
        .await
        .map_err(|e| format!("Parse error: {e}"))
}

/// Uploads the selected file as the session's pending attachment.
pub async fn upload_attachment(
    session_id: &str,
    file: &File,
) -> Result<Option<AttachmentSummary>, String> {
    let form = FormData::new().map_err(|e| format!("Form error: {e:?}"))?;
    form.append_with_blob_and_filename("file", file, &file.name())
        .map_err(|e| format!("Form error: {e:?}"))?;

    let resp = Request::put(&format!("{API_BASE}/api/sessions/{session_id}/attachment"))
        .body(form)
        .map_err(|e| format!("Request error: {e}"))?
        .send()
        .await
        .map_err(|e| format!("Network error: {e}"))?;

    if !resp.ok() {
        return Err(error_message(resp).await);
    }

    resp.json::<Option<AttachmentSummary>>()
        .await
        .map_err(|e| format!("Parse error: {e}"))
}

pub async fn clear_attachment(session_id: &str) -> Result<(), String> {
    let resp = Request::delete(&format!("{API_BASE}/api/sessions/{session_id}/attachment"))
        .send()
        .await
        .map_err(|e| format!("Network error: {e}"))?;

    if !resp.ok() {
        return Err(error_message(resp).await);
    }
    Ok(())
}

/// Returns the WebSocket URL for a session's event stream.
pub fn ws_url(session_id: &str) -> String {
    let host = API_BASE.trim_start_matches("http://");
    format!("ws://{host}/ws/sessions/{session_id}")
}
