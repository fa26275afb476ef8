//! HTTP transport: `POST /mcp` and `GET /health`.
//!
//! Thin translation layer over the [`Correlator`](crate::correlator::Correlator)
//! and [`Supervisor`]. Every runtime failure is folded into a uniform
//! JSON-RPC internal-error envelope with status 500; nothing escapes to
//! crash the host.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::supervisor::{ProcessState, Supervisor};
use crate::{AppError, Result};

/// JSON-RPC "internal error" code used for every bridge-side failure.
pub const INTERNAL_ERROR_CODE: i64 = -32603;

/// Shared state handed to the route handlers.
#[derive(Debug, Clone)]
pub struct BridgeState {
    /// Process owner; also gives access to the correlator.
    pub supervisor: Arc<Supervisor>,
    /// Vault directory reported by `/health`.
    pub memory_dir: PathBuf,
}

/// `POST /mcp` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct McpCall {
    /// JSON-RPC method to invoke on the server.
    pub method: String,
    /// Method params; `{}` when omitted or `null`.
    #[serde(default)]
    pub params: Option<Value>,
}

/// `GET /health` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// `healthy` or `unhealthy`.
    pub status: &'static str,
    /// `connected` or `disconnected`.
    pub mcp: &'static str,
    /// Configured vault directory.
    pub memory_dir: String,
}

impl HealthReport {
    /// Derive the report from the current process state.
    #[must_use]
    pub fn from_state(state: ProcessState, memory_dir: &std::path::Path) -> Self {
        let ready = state.is_ready();
        Self {
            status: if ready { "healthy" } else { "unhealthy" },
            mcp: if ready { "connected" } else { "disconnected" },
            memory_dir: memory_dir.display().to_string(),
        }
    }
}

/// Body of every failed `POST /mcp`.
#[must_use]
pub fn error_envelope(err: &AppError) -> Value {
    json!({
        "error": {
            "code": INTERNAL_ERROR_CODE,
            "message": err.to_string(),
        }
    })
}

/// Build the bridge router.
#[must_use]
pub fn router(state: BridgeState) -> Router {
    Router::new()
        .route("/mcp", post(forward))
        .route("/health", get(health))
        .with_state(state)
}

async fn forward(
    State(state): State<BridgeState>,
    body: std::result::Result<Json<McpCall>, JsonRejection>,
) -> Response {
    let call = match body {
        Ok(Json(call)) => call,
        Err(rejection) => {
            let err =
                AppError::Protocol(format!("invalid request body: {}", rejection.body_text()));
            warn!(status = %rejection.status(), %err, "http: request rejected");
            return internal_error(&err);
        }
    };

    let params = call.params.unwrap_or_else(|| json!({}));
    debug!(method = %call.method, "http: forwarding request");

    let result = if state.supervisor.state().is_ready() {
        state
            .supervisor
            .correlator()
            .send(&call.method, params)
            .await
    } else {
        Err(AppError::Disconnected("MCP server is not ready".into()))
    };

    match result {
        Ok(envelope) => Json(envelope).into_response(),
        Err(err) => {
            warn!(method = %call.method, %err, "http: request failed");
            internal_error(&err)
        }
    }
}

fn internal_error(err: &AppError) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(error_envelope(err))).into_response()
}

async fn health(State(state): State<BridgeState>) -> Json<HealthReport> {
    Json(HealthReport::from_state(
        state.supervisor.state(),
        &state.memory_dir,
    ))
}

/// Bind `addr`, returning the listener so callers can learn the real port.
///
/// # Errors
///
/// Returns `AppError::Config` if the address cannot be bound.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP on {addr}: {err}")))
}

/// Serve the bridge on `listener` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails.
pub async fn serve(listener: TcpListener, state: BridgeState, ct: CancellationToken) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "HTTP bridge listening");
    info!("POST /mcp - MCP endpoint");
    info!("GET /health - health check");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("HTTP server error: {err}")))?;

    info!("HTTP bridge shut down");
    Ok(())
}
