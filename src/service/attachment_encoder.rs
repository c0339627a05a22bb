use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use tracing::debug;

use crate::errors::AppError;
use crate::models::Attachment;

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// A file as the user picked it, before encoding.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, media_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), media_type, bytes }
    }
}

/// Turns a selected file into an inline, base64-encoded [`Attachment`].
#[derive(Debug, Clone)]
pub struct AttachmentEncoder {
    max_bytes: usize,
}

impl AttachmentEncoder {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// `None` means nothing was selected and yields no attachment.
    pub async fn encode(&self, selection: Option<RawFile>) -> Result<Option<Attachment>, AppError> {
        let Some(file) = selection else {
            return Ok(None);
        };

        let name = match file.name.trim() {
            "" => "attachment".to_string(),
            trimmed => trimmed.to_string(),
        };
        let size_bytes = file.bytes.len();
        if size_bytes == 0 {
            return Err(AppError::AttachmentUnreadable { name, reason: "the file is empty".into() });
        }
        if size_bytes > self.max_bytes {
            return Err(AppError::AttachmentTooLarge {
                name,
                max_bytes: self.max_bytes,
                actual_bytes: size_bytes,
            });
        }

        let media_type = file
            .media_type
            .map(|m| m.trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| FALLBACK_MEDIA_TYPE.to_string());

        let bytes = file.bytes;
        let payload = tokio::task::spawn_blocking(move || BASE64_STANDARD.encode(bytes))
            .await
            .map_err(|e| AppError::AttachmentUnreadable {
                name: name.clone(),
                reason: format!("encoding was interrupted: {e}"),
            })?;

        debug!(name = %name, media_type = %media_type, size_bytes, "Encoded attachment");
        Ok(Some(Attachment {
            media_type,
            payload: Arc::from(payload),
            display_name: name,
            size_bytes,
        }))
    }
}
