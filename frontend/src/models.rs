use serde::{Deserialize, Serialize};

/// Matches the backend `AttachmentSummary`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AttachmentSummary {
    pub display_name: String,
    pub media_type: String,
    pub size_bytes: usize,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Citation {
    pub uri: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl Citation {
    pub fn label(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.uri.clone())
    }
}

/// Matches the backend `TurnView`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Turn {
    pub id: String,
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub attachment: Option<AttachmentSummary>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub failure: Option<String>,
    pub created_at: String,
}

impl Turn {
    pub fn is_user(&self) -> bool {
        self.role == "user"
    }
}

/// Matches the backend `SessionView`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SessionView {
    pub session_id: String,
    pub unlocked: bool,
    pub loading: bool,
    pub pending_attachment: Option<AttachmentSummary>,
    pub turns: Vec<Turn>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UnlockRequest {
    pub access_key: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SubmitRequest {
    pub query: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SubmitResponse {
    pub turn: Option<Turn>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ApiError {
    pub error: String,
}

/// WebSocket event received from the server (internally tagged).
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PortalEvent {
    Snapshot { session: SessionView },
    Unlocked,
    Locked,
    TurnAppended { turn: Turn },
    Loading { active: bool },
    AttachmentPending { attachment: Option<AttachmentSummary> },
}
