//! HTTP front end for the analysis facade.

mod feed;
mod routes;

pub use routes::{resolve_module, status_for};

use crate::config::ServerConfig;
use crate::facade::SecurityAnalyzer;
use anyhow::{Context, Result};
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: SecurityAnalyzer,
    /// Deadline for a single analysis.
    pub timeout: Duration,
}

impl AppState {
    pub fn new(analyzer: SecurityAnalyzer, timeout: Duration) -> Self {
        Self { analyzer, timeout }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/api/v1/ml/health", get(routes::health))
        .route("/api/v1/ml/models", get(routes::models))
        .route("/api/v1/ml/feed", get(feed::feed))
        .route("/api/v1/ml/phishing/detect", post(routes::detect_phishing))
        .route("/api/v1/ml/llm/abuse-detect", post(routes::detect_llm_abuse))
        .route("/api/v1/ml/:module/analyze", post(routes::analyze))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }

    let origins = origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin: {}", o))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// Serve the API until Ctrl-C.
pub async fn serve(config: &ServerConfig, analyzer: SecurityAnalyzer) -> Result<()> {
    let state = AppState::new(analyzer, Duration::from_millis(config.analysis_timeout_ms));
    let app = router(state).layer(cors_layer(&config.cors_origins)?);

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!("threatlens listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
