//! HTTP surface: inbound webhook, manual send, maintenance and health.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::channels::OutboundTarget;
use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::pipeline::types::{ThreadType, WebhookPayload};
use crate::store::ApprovalStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub approvals: Arc<ApprovalStore>,
    /// Bearer secret for `/cron`. Unset means every maintenance call is refused.
    pub cron_secret: Option<SecretString>,
}

/// Build the router with all webhook routes.
pub fn webhook_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/whatsapp/incoming", post(incoming))
        .route("/whatsapp/send", post(manual_send))
        .route("/cron", post(cron))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "chat-triage"
    }))
}

// ── Inbound ─────────────────────────────────────────────────────────────

async fn incoming(
    State(state): State<AppState>,
    payload: Result<Json<WebhookPayload>, JsonRejection>,
) -> impl IntoResponse {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected malformed webhook payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "error": rejection.body_text()})),
            );
        }
    };

    match state.pipeline.handle_incoming(payload).await {
        Ok(outcome) => {
            info!(thread_id = %outcome.thread_id, storage = ?outcome.storage, "Webhook handled");
            (StatusCode::OK, Json(json!({"success": true})))
        }
        Err(PipelineError::InvalidPayload(reason)) => {
            warn!(reason = %reason, "Rejected webhook payload");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "error": reason})),
            )
        }
        Err(e) => {
            error!(error = %e, "Webhook processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "error": "Internal server error"})),
            )
        }
    }
}

// ── Manual send ─────────────────────────────────────────────────────────

fn default_thread_type() -> ThreadType {
    ThreadType::Individual
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    content: String,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default = "default_thread_type")]
    thread_type: ThreadType,
}

async fn manual_send(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> impl IntoResponse {
    let result = async {
        let target =
            OutboundTarget::resolve(req.thread_type, req.thread_id.as_deref(), req.to.as_deref())?;
        state
            .pipeline
            .workflows()
            .outbound()
            .send_text(&target, &req.content)
            .await
    };

    match result.await {
        Ok(sends) => {
            info!(sends, "Manual send completed");
            (StatusCode::OK, Json(json!({"success": true})))
        }
        Err(e) => {
            error!(error = %e, "Manual send failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "error": e.to_string()})),
            )
        }
    }
}

// ── Maintenance ─────────────────────────────────────────────────────────

fn authorized(headers: &HeaderMap, secret: Option<&SecretString>) -> bool {
    let Some(secret) = secret else {
        return false;
    };
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == secret.expose_secret())
}

async fn cron(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&headers, state.cron_secret.as_ref()) {
        warn!("Unauthorized maintenance call");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "error": "Unauthorized"})),
        );
    }

    let expired = state.approvals.expire(Utc::now()).await;
    let replay = state.pipeline.threads().replay_fallback().await;
    info!(
        expired_approvals = expired,
        replayed = replay.replayed,
        failed = replay.failed,
        "Maintenance run finished"
    );

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "expired_approvals": expired,
            "replay": replay,
        })),
    )
}
