use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};

use greenlight::{
    ApprovalGate, ApprovalPolicy, ChatMessage, ChatRole, Error as GateError, GreenlightConfig,
    StageResult,
};

// --- Request / Response types ---

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default = "default_role")]
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default = "default_true")]
    pub auto_approve: bool,
}

fn default_role() -> String {
    "user".into()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    #[serde(rename = "final")]
    pub final_text: String,
    pub stages: Vec<StageResult>,
    pub auto_approve: bool,
    /// True when the hop limit ran out while an action request was still
    /// outstanding; the conversation stays suspended server-side.
    pub pending: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub actions: Vec<String>,
    pub auto_approve_default: bool,
}

// --- Axum state ---

#[derive(Clone)]
struct AppState {
    gate: Arc<ApprovalGate>,
    policy: Arc<ApprovalPolicy>,
    max_hops: usize,
    default_thread: String,
    auto_approve_default: bool,
}

// --- Handlers ---

async fn handle_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> impl IntoResponse {
    let thread_id = body
        .thread_id
        .clone()
        .unwrap_or_else(|| state.default_thread.clone());

    // auto_approve=false is the zero-hop case: submit, record the one
    // stage, and leave any proposal suspended.
    let max_hops = if body.auto_approve { state.max_hops } else { 0 };
    let message = ChatMessage::new(ChatRole::parse(&body.role), body.content.as_str());

    match state
        .gate
        .run_to_completion(&thread_id, message, &*state.policy, max_hops)
        .await
    {
        Ok(run) => Json(ChatResponse {
            final_text: run.final_text,
            stages: run.stages,
            auto_approve: body.auto_approve,
            pending: run.pending,
        })
        .into_response(),
        Err(e) => {
            tracing::warn!(thread = %thread_id, error = %e, "chat request failed");
            (
                status_for_error(&e),
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Readiness probe — no external calls, cannot fail.
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
        actions: state.gate.action_names(),
        auto_approve_default: state.auto_approve_default,
    })
}

fn status_for_error(error: &GateError) -> StatusCode {
    match error {
        GateError::NoPendingRequest(_)
        | GateError::PendingDecision(_)
        | GateError::InvalidDecision(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// --- Server startup ---

pub async fn run_server(
    gate: Arc<ApprovalGate>,
    config: GreenlightConfig,
    bind_override: Option<&str>,
) -> Result<()> {
    let bind = bind_override
        .map(String::from)
        .unwrap_or_else(|| config.server.bind.clone());

    let state = AppState {
        policy: config.policy.into_ruleset().into_policy(),
        max_hops: config.gate.max_hops,
        default_thread: config.gate.default_thread.clone(),
        auto_approve_default: config.gate.auto_approve,
        gate,
    };

    tracing::info!(
        bind = %bind,
        actions = state.gate.action_names().len(),
        max_hops = state.max_hops,
        "starting greenlight server"
    );

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind to {bind}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server shut down");
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .with_state(state)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
