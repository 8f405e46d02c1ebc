//! TruthGuard HTTP API
//!
//! Axum-based HTTP server that exposes the verification pipeline.
//!
//! Each endpoint has a thin axum handler that delegates to a pure inner
//! function returning `(StatusCode, serde_json::Value)`, so the inner
//! functions are testable without axum dispatch.
//!
//! Endpoints:
//! - GET  /api/verify-news: run the pipeline against the default feed
//! - POST /api/chat-agent: classify one free-text claim
//! - GET  /health: backend wiring
//! - GET  /version: server version info

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use truthguard_core::TruthGuardConfig;

use crate::subsystems::chat;
use crate::subsystems::pipeline::{Pipeline, PipelineError};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub pipeline: Arc<Pipeline>,
    pub config: TruthGuardConfig,
    /// Cancelled on shutdown; in-flight runs abort with it.
    pub shutdown: CancellationToken,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/api/verify-news", get(verify_news_handler))
        .route("/api/chat-agent", post(chat_agent_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when `state.shutdown` is cancelled.
pub async fn start_http_server(state: Arc<HttpState>) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let shutdown = state.shutdown.clone();

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("TruthGuard HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ChatAgentRequest {
    pub message: Option<String>,
}

fn error_body(msg: impl Into<String>) -> serde_json::Value {
    serde_json::json!({
        "error": msg.into(),
        "status": "error",
    })
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

/// One pipeline run. The body is the ordered record list.
pub async fn verify_news_inner(
    pipeline: &Pipeline,
    source: &str,
    cancel: &CancellationToken,
) -> (StatusCode, serde_json::Value) {
    let start = Instant::now();

    match pipeline.run_with_cancel(source, cancel).await {
        Ok(records) => {
            tracing::info!(
                records = records.len(),
                took_ms = start.elapsed().as_millis() as u64,
                "verify-news served"
            );
            match serde_json::to_value(&records) {
                Ok(body) => (StatusCode::OK, body),
                Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())),
            }
        }
        Err(e @ PipelineError::FeedUnavailable(_)) => (
            StatusCode::BAD_GATEWAY,
            error_body(format!(
                "Failed to process news ({}). Check if the feed source r/{} is public.",
                e, source
            )),
        ),
        Err(e @ PipelineError::TimedOut { .. }) => {
            (StatusCode::GATEWAY_TIMEOUT, error_body(e.to_string()))
        }
        Err(e @ PipelineError::Cancelled) => {
            (StatusCode::SERVICE_UNAVAILABLE, error_body(e.to_string()))
        }
    }
}

/// Validates the message and classifies it without evidence.
pub async fn chat_agent_inner(
    pipeline: &Pipeline,
    req: ChatAgentRequest,
) -> (StatusCode, serde_json::Value) {
    let message = match req.message {
        Some(m) if !m.trim().is_empty() => m,
        _ => {
            return (StatusCode::BAD_REQUEST, error_body("message field is required"));
        }
    };

    let record = chat::check_claim(pipeline.classifier(), &message).await;
    let reply = chat::render_reply(&record);

    (
        StatusCode::OK,
        serde_json::json!({
            "reply": reply,
            "verdict": record,
        }),
    )
}

/// Reports which backends are wired (pure, no IO).
pub fn health_inner(pipeline: &Pipeline, config: &TruthGuardConfig) -> serde_json::Value {
    serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "feed": pipeline.feed_name(),
        "feed_source": config.feed.community,
        "search": pipeline.retriever_name(),
        "classifier": pipeline.classifier().backend_name(),
        "concurrency": pipeline.settings().concurrency,
    })
}

/// Returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "truthguard",
    })
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn verify_news_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let cancel = state.shutdown.child_token();
    let (status, body) =
        verify_news_inner(&state.pipeline, &state.config.feed.community, &cancel).await;
    (status, Json(body))
}

pub async fn chat_agent_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ChatAgentRequest>,
) -> impl IntoResponse {
    let (status, body) = chat_agent_inner(&state.pipeline, req).await;
    (status, Json(body))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(health_inner(&state.pipeline, &state.config)))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}
