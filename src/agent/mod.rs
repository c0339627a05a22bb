//! Grounded research calls against the Gemini REST API.
//!
//! The service is stateless per call, so every request replays the full prior
//! conversation before the new turn. Failures never escape [`ResearchBackend::ask`];
//! they come back as assistant-shaped answers carrying a [`ResearchErrorKind`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::GeminiSettings;
use crate::errors::ResearchError;
use crate::models::{Attachment, Citation, ResearchAnswer, Role, Turn};

const SYSTEM_DIRECTIVE: &str = "You are a specialized Model UN Research Assistant for Diplomacy Lab. \
    Your goal is to provide high-quality, academically rigorous information for delegates. \
    Use the Google Search tool to find the most recent facts, figures, and international resolutions. \
    If a user provides a file (image or PDF), analyze its contents to provide contextual answers. \
    Focus on specific country positions, treaty details, and UN procedures. Always cite sources.";

/// Text part sent for a turn that only carries a file.
const ATTACHMENT_ONLY_PROMPT: &str = "Please analyze this context.";

/// Anything that can answer a research turn given the prior conversation.
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    async fn ask(
        &self,
        query: &str,
        history: &[Arc<Turn>],
        attachment: Option<&Attachment>,
    ) -> ResearchAnswer;
}

#[derive(Clone)]
pub struct GeminiResearchClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiResearchClient {
    pub fn new(settings: &GeminiSettings) -> Self {
        Self {
            client: Client::new(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            base_url: settings.base_url.clone(),
        }
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// Runs one call and reports failures as [`ResearchError`].
    pub async fn try_ask(
        &self,
        query: &str,
        history: &[Arc<Turn>],
        attachment: Option<&Attachment>,
    ) -> Result<ResearchAnswer, ResearchError> {
        let api_key = self.api_key.as_deref().ok_or(ResearchError::MissingCredential)?;

        let body = build_request(query, history, attachment);
        let url = format!("{}/{}:generateContent", self.base_url, self.model);
        debug!(
            model = %self.model,
            prior_turns = history.len(),
            with_attachment = attachment.is_some(),
            "Sending grounded research request"
        );

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ResearchError::Unknown {
                detail: format!("Gemini API request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            return Err(classify_failure(status, &body_text));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            ResearchError::Unknown { detail: format!("Failed to parse Gemini response: {e}") }
        })?;

        let answer = extract_answer(parsed);
        debug!(
            sources = ?answer.citations.iter().map(Citation::label).collect::<Vec<_>>(),
            "Grounded research answer received"
        );
        Ok(answer)
    }
}

#[async_trait]
impl ResearchBackend for GeminiResearchClient {
    async fn ask(
        &self,
        query: &str,
        history: &[Arc<Turn>],
        attachment: Option<&Attachment>,
    ) -> ResearchAnswer {
        match self.try_ask(query, history, attachment).await {
            Ok(answer) => answer,
            Err(err) => {
                match &err {
                    ResearchError::MissingCredential => {
                        error!("Research request refused: no Gemini API key configured")
                    }
                    other => warn!(
                        kind = ?other.kind(),
                        detail = other.detail().unwrap_or_default(),
                        "Research request failed"
                    ),
                }
                ResearchAnswer::from(err)
            }
        }
    }
}

// ── Request building ─────────────────────────────────────────────────────────

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

fn inline_part(attachment: &Attachment) -> Part {
    Part::InlineData {
        inline_data: InlineDataPayload {
            mime_type: attachment.media_type.clone(),
            data: attachment.payload.to_string(),
        },
    }
}

/// Prior turns in their original order, then the new user turn.
fn build_request(
    query: &str,
    history: &[Arc<Turn>],
    attachment: Option<&Attachment>,
) -> GenerateContentRequest {
    let mut contents: Vec<Content> = history
        .iter()
        .map(|turn| {
            let mut parts = vec![Part::Text { text: turn.content.clone() }];
            if let Some(file) = &turn.attachment {
                parts.push(inline_part(file));
            }
            Content { role: wire_role(turn.role).to_string(), parts }
        })
        .collect();

    let text = if query.trim().is_empty() { ATTACHMENT_ONLY_PROMPT } else { query };
    let mut parts = vec![Part::Text { text: text.to_string() }];
    if let Some(file) = attachment {
        parts.push(inline_part(file));
    }
    contents.push(Content { role: wire_role(Role::User).to_string(), parts });

    GenerateContentRequest {
        contents,
        system_instruction: SystemInstruction {
            parts: vec![Part::Text { text: SYSTEM_DIRECTIVE.to_string() }],
        },
        tools: vec![Tool { google_search: GoogleSearch {} }],
    }
}

// ── Response mapping ─────────────────────────────────────────────────────────

fn extract_answer(response: GenerateContentResponse) -> ResearchAnswer {
    let Some(candidate) = response.candidates.and_then(|c| c.into_iter().next()) else {
        return ResearchAnswer::empty();
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter(|part| !part.thought)
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    let citations = candidate
        .grounding_metadata
        .map(|meta| {
            meta.grounding_chunks
                .into_iter()
                .filter_map(|chunk| chunk.web)
                .filter_map(|web| {
                    let uri = web.uri.filter(|u| !u.trim().is_empty())?;
                    Some(Citation::new(uri, web.title))
                })
                .collect()
        })
        .unwrap_or_default();

    ResearchAnswer::grounded(text, citations)
}

fn classify_failure(status: StatusCode, body: &str) -> ResearchError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.to_string());
            if status_text.is_empty() { msg } else { format!("{status_text}: {msg}") }
        })
        .unwrap_or_else(|| body.to_string());
    let detail = format!("HTTP {}: {message}", status.as_u16());

    if body.contains("API_KEY_INVALID")
        || matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
    {
        ResearchError::InvalidCredential { detail }
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || body.contains("RESOURCE_EXHAUSTED")
        || body.to_lowercase().contains("quota")
    {
        ResearchError::QuotaExceeded { detail }
    } else {
        ResearchError::Unknown { detail }
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    system_instruction: SystemInstruction,
    tools: Vec<Tool>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineDataPayload,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataPayload {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ContentResponse>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}
