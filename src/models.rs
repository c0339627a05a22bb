use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EMPTY_RESPONSE_MESSAGE: &str = "The intelligence system returned an empty response. \
                                          This may be due to safety filters or grounding issues.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file ready to be sent inline: base64 payload plus how to describe it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub media_type: String,
    pub payload: Arc<str>,
    pub display_name: String,
    pub size_bytes: usize,
}

impl Attachment {
    pub fn summary(&self) -> AttachmentSummary {
        AttachmentSummary {
            display_name: self.display_name.clone(),
            media_type: self.media_type.clone(),
            size_bytes: self.size_bytes,
        }
    }
}

/// What the browser gets to see of an attachment. Payloads stay server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSummary {
    pub display_name: String,
    pub media_type: String,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Citation {
    pub fn new(uri: impl Into<String>, title: Option<String>) -> Self {
        Self {
            uri: uri.into(),
            title: title.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.uri)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchErrorKind {
    MissingCredential,
    InvalidCredential,
    QuotaExceeded,
    TimedOut,
    Unknown,
    EmptyResponse,
}

/// The outcome of one research call, already shaped as an assistant reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchAnswer {
    pub text: String,
    pub citations: Vec<Citation>,
    pub failure: Option<ResearchErrorKind>,
}

impl ResearchAnswer {
    /// Normalises blank text to the empty-response sentinel.
    pub fn grounded(text: String, citations: Vec<Citation>) -> Self {
        if text.trim().is_empty() {
            return Self::empty();
        }
        Self { text, citations, failure: None }
    }

    pub fn empty() -> Self {
        Self {
            text: EMPTY_RESPONSE_MESSAGE.to_string(),
            citations: Vec::new(),
            failure: Some(ResearchErrorKind::EmptyResponse),
        }
    }

    pub fn failed(kind: ResearchErrorKind, message: impl Into<String>) -> Self {
        Self { text: message.into(), citations: Vec::new(), failure: Some(kind) }
    }
}

impl From<crate::errors::ResearchError> for ResearchAnswer {
    fn from(err: crate::errors::ResearchError) -> Self {
        ResearchAnswer::failed(err.kind(), err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub attachment: Option<Attachment>,
    pub citations: Vec<Citation>,
    pub failure: Option<ResearchErrorKind>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: String, attachment: Option<Attachment>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content,
            attachment,
            citations: Vec::new(),
            failure: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(answer: ResearchAnswer) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: answer.text,
            attachment: None,
            citations: answer.citations,
            failure: answer.failure,
            created_at: Utc::now(),
        }
    }
}

// ── API payloads ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    pub access_key: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub query: String,
}

/// `turn` is `None` when the session was reset before the answer arrived.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub turn: Option<TurnView>,
}

/// Flattened turn for the browser.
#[derive(Debug, Clone, Serialize)]
pub struct TurnView {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentSummary>,
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ResearchErrorKind>,
    pub created_at: DateTime<Utc>,
}

impl From<&Turn> for TurnView {
    fn from(t: &Turn) -> Self {
        Self {
            id: t.id,
            role: t.role,
            content: t.content.clone(),
            attachment: t.attachment.as_ref().map(Attachment::summary),
            citations: t.citations.clone(),
            failure: t.failure,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub unlocked: bool,
    pub loading: bool,
    pub pending_attachment: Option<AttachmentSummary>,
    pub turns: Vec<TurnView>,
}

/// Live state changes pushed to subscribers of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PortalEvent {
    /// Full state, sent when a subscriber connects or falls behind.
    Snapshot { session: SessionView },
    Unlocked,
    Locked,
    TurnAppended { turn: TurnView },
    Loading { active: bool },
    AttachmentPending { attachment: Option<AttachmentSummary> },
}
