// ABOUTME: hosts the http surface that receives chat requests and returns response envelopes.
// ABOUTME: maps normalization and agent failures to structured 500 bodies and audit records.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use cmdgate_common::{build_error, ActionError, ErrorCode, RequestShapeError};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::actions::exec::Executor;
use crate::actions::scratch::ScratchManager;
use crate::agent::{Agent, ScriptedAgent};
use crate::audit;
use crate::batch::BatchProcessor;
use crate::chat::Gateway;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    gateway: Gateway,
    service_name: Arc<str>,
    audit_path: Option<Arc<PathBuf>>,
}

impl AppState {
    pub fn new(config: &Config, agent: Arc<dyn Agent>) -> Self {
        let batch = BatchProcessor::new(
            Executor::new(config.exec.clone()),
            ScratchManager::new(config.scratch_root.clone()),
        );
        Self {
            gateway: Gateway::new(batch, agent),
            service_name: Arc::from(config.service_name.as_str()),
            audit_path: config.audit_path.clone().map(Arc::new),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .with_state(state)
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let state = AppState::new(&config, Arc::new(ScriptedAgent));
    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("bind {}", config.listen))?;

    info!(addr = %config.listen, service = %config.service_name, "cmdgated listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve http")?;
    info!("cmdgated stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    debug!("health check");
    Json(json!({ "status": "healthy", "service": &*state.service_name }))
}

async fn chat(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(err) => {
            let err = RequestShapeError::InvalidJson(err);
            return failure(&state, &Value::Null, err.code(), err.to_string()).await;
        }
    };
    debug!(payload = %payload, "chat request");

    let outcome = match state.gateway.handle(&payload).await {
        Ok(outcome) => outcome,
        Err(err) => return failure(&state, &payload, err.code(), err.to_string()).await,
    };

    info!(
        thread_id = outcome.request.thread_id.as_deref().unwrap_or(""),
        schema = outcome.request.schema.as_str(),
        proposed = outcome.reply.cmds.len(),
        executed = outcome.reply.executed_cmds.len(),
        "chat replied"
    );

    if let Some(path) = &state.audit_path {
        let entry = audit::Entry::Replied {
            request: &outcome.request,
            reply: &outcome.reply,
        };
        if let Err(err) = audit::append_record(path, now_ms(), entry).await {
            warn!(error = %format!("{err:#}"), "audit append failed");
        }
    }

    (StatusCode::OK, Json(outcome.response)).into_response()
}

async fn failure(state: &AppState, payload: &Value, code: ErrorCode, message: String) -> Response {
    error!(code = code.as_str(), error = %message, "chat request failed");
    debug!(payload = %payload, "failed chat payload");

    if let Some(path) = &state.audit_path {
        let error = ActionError {
            code,
            message: message.clone(),
        };
        let entry = audit::Entry::Failed {
            payload,
            error: &error,
        };
        if let Err(err) = audit::append_record(path, now_ms(), entry).await {
            warn!(error = %format!("{err:#}"), "audit append failed");
        }
    }

    let echoed = (!payload.is_null()).then_some(payload);
    let envelope = build_error(code, &message, echoed, Utc::now());
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": envelope })),
    )
        .into_response()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
