use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_ACCESS_CODES: &[&str] = &["MUN2025", "MUN2026"];
pub const DEFAULT_RESEARCH_TIMEOUT_SECS: u64 = 60;
/// Inline-data ceiling of the generation API.
pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    /// `None` is a deployment error surfaced per request, not at startup.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub port: u16,
    pub gemini: GeminiSettings,
    pub access_codes: Vec<String>,
    pub research_timeout: Duration,
    pub max_attachment_bytes: usize,
}

impl PortalConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = non_blank("GEMINI_API_KEY").or_else(|| non_blank("API_KEY"));

        let access_codes = non_blank("PORTAL_ACCESS_CODES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|codes| !codes.is_empty())
            .unwrap_or_else(|| DEFAULT_ACCESS_CODES.iter().map(|c| c.to_string()).collect());

        Self {
            port: non_blank("PORT").and_then(|p| p.parse().ok()).unwrap_or(DEFAULT_PORT),
            gemini: GeminiSettings {
                api_key,
                model: non_blank("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                base_url: non_blank("GEMINI_API_BASE_URL")
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            },
            access_codes,
            research_timeout: Duration::from_secs(
                non_blank("RESEARCH_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .filter(|s: &u64| *s > 0)
                    .unwrap_or(DEFAULT_RESEARCH_TIMEOUT_SECS),
            ),
            max_attachment_bytes: non_blank("MAX_ATTACHMENT_BYTES")
                .and_then(|s| s.parse().ok())
                .filter(|b: &usize| *b > 0)
                .unwrap_or(DEFAULT_MAX_ATTACHMENT_BYTES),
        }
    }
}
