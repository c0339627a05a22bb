use thiserror::Error;

use crate::models::ResearchErrorKind;

/// Errors raised at the portal boundary. Remote research failures never show up
/// here; they are folded into assistant turns (see [`ResearchError`]).
#[derive(Debug, Error)]
pub enum AppError {
    // ── Session errors ───────────────────────────────────────────────────────
    #[error("Portal session '{id}' not found")]
    SessionNotFound { id: String },

    #[error("The research portal is locked. Enter your access key to continue.")]
    SessionLocked,

    #[error("{reason}")]
    AccessDenied { reason: String },

    #[error("A research request is already in progress for this session")]
    SubmissionInFlight,

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Enter a question or attach a file before sending")]
    EmptySubmission,

    #[error("Could not read '{name}': {reason}")]
    AttachmentUnreadable { name: String, reason: String },

    #[error("'{name}' is {actual_bytes} bytes; attachments are limited to {max_bytes} bytes")]
    AttachmentTooLarge { name: String, max_bytes: usize, actual_bytes: usize },

    /// The request body was cut off at the upload limit before the file was read.
    #[error("Upload exceeds the {max_bytes} byte attachment limit")]
    UploadTooLarge { max_bytes: usize },

    #[error("Invalid upload: {message}")]
    InvalidUpload { message: String },

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::SessionNotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::EmptySubmission
                | AppError::AttachmentUnreadable { .. }
                | AppError::InvalidUpload { .. }
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::SubmissionInFlight)
    }

    pub fn is_too_large(&self) -> bool {
        matches!(self, AppError::AttachmentTooLarge { .. } | AppError::UploadTooLarge { .. })
    }
}

/// Failure of a single call to the grounded-generation service.
#[derive(Debug, Error)]
pub enum ResearchError {
    #[error(
        "Configuration Error: The Research Portal cannot connect because the API key is missing. \
         Set GEMINI_API_KEY in the server environment."
    )]
    MissingCredential,

    #[error("Error: The provided API Key is invalid. Please check your Google AI Studio settings.")]
    InvalidCredential { detail: String },

    #[error("Error: Research capacity limit reached. Please try again in a few minutes.")]
    QuotaExceeded { detail: String },

    #[error("Error: The research service did not answer within {seconds} seconds. Please try again.")]
    TimedOut { seconds: u64 },

    #[error("An error occurred while connecting to the research intelligence.")]
    Unknown { detail: String },
}

impl ResearchError {
    pub fn kind(&self) -> ResearchErrorKind {
        match self {
            ResearchError::MissingCredential => ResearchErrorKind::MissingCredential,
            ResearchError::InvalidCredential { .. } => ResearchErrorKind::InvalidCredential,
            ResearchError::QuotaExceeded { .. } => ResearchErrorKind::QuotaExceeded,
            ResearchError::TimedOut { .. } => ResearchErrorKind::TimedOut,
            ResearchError::Unknown { .. } => ResearchErrorKind::Unknown,
        }
    }

    /// Diagnostic detail for logs; never shown to the user.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ResearchError::InvalidCredential { detail }
            | ResearchError::QuotaExceeded { detail }
            | ResearchError::Unknown { detail } => Some(detail),
            ResearchError::MissingCredential | ResearchError::TimedOut { .. } => None,
        }
    }
}
