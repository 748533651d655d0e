//! HTTP gateway for mathtutor.
//!
//! Exposes the tutoring endpoint in text and SSE modes, plus topic,
//! history, and health routes.
//!
//! Built on Axum.

pub mod api;

use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, header},
    response::Json,
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use mathtutor_config::AppConfig;
use mathtutor_tutor::RequestOrchestrator;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub tutor: Arc<RequestOrchestrator>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl GatewayState {
    pub fn new(tutor: Arc<RequestOrchestrator>) -> Self {
        Self {
            tutor,
            start_time: chrono::Utc::now(),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - CORS limited to `allowed_origin` (GET only)
/// - HTTP trace logging
pub fn build_router(state: SharedState, allowed_origin: &str) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(std::time::Duration::from_secs(3600));
    match allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(AllowOrigin::exact(origin)),
        Err(e) => warn!(origin = %allowed_origin, error = %e, "Ignoring invalid CORS origin"),
    }

    Router::new()
        .route("/health", get(health_handler))
        .merge(api::api_router())
        .with_state(state)
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Wire provider, retriever, and orchestrator from configuration.
pub async fn build_tutor(
    config: &AppConfig,
) -> Result<Arc<RequestOrchestrator>, Box<dyn std::error::Error>> {
    let router = mathtutor_providers::router::build_from_config(config);
    let provider = router
        .default()
        .ok_or("no default provider configured")?;
    let retriever =
        mathtutor_retrieval::build_from_config(&config.retrieval, provider.clone()).await?;
    let tutor = RequestOrchestrator::from_config(config, provider, retriever)?;
    Ok(Arc::new(tutor))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let tutor = build_tutor(&config).await?;
    let app = build_router(
        Arc::new(GatewayState::new(tutor)),
        &config.gateway.allowed_origin,
    );

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: i64,
    pub provider: String,
    pub provider_healthy: bool,
    pub sessions: usize,
    pub cache_entries: usize,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: (chrono::Utc::now() - state.start_time).num_seconds(),
        provider: state.tutor.provider_name().to_string(),
        provider_healthy: state.tutor.provider_healthy().await,
        sessions: state.tutor.history().session_count(),
        cache_entries: state.tutor.cache().len(),
    })
}
