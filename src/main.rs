mod agent;
mod config;
mod errors;
mod models;
mod routes;
mod service;
mod store;

use std::sync::Arc;

use tracing::{info, warn};

use crate::agent::GeminiResearchClient;
use crate::config::PortalConfig;
use crate::service::attachment_encoder::AttachmentEncoder;
use crate::service::portal_controller::PortalDeps;
use crate::service::portal_service::PortalService;
use crate::service::session_gate::AccessCodeVerifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "research_portal=debug,tower_http=debug".into()),
        )
        .init();

    let config = PortalConfig::from_env();

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let research = GeminiResearchClient::new(&config.gemini);
    if research.has_credential() {
        info!(model = %config.gemini.model, "Gemini research client configured");
    } else {
        warn!("GEMINI_API_KEY is not set; research turns will report a configuration error");
    }

    let svc = PortalService::new(PortalDeps {
        research: Arc::new(research),
        verifier: Arc::new(AccessCodeVerifier::new(&config.access_codes)),
        encoder: AttachmentEncoder::new(config.max_attachment_bytes),
        research_timeout: config.research_timeout,
    });

    let app = routes::router(svc, config.max_attachment_bytes);

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Research portal listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
