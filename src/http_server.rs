//! HTTP server implementation using Axum.

use crate::error::{GatewayError, Result};
use crate::request::ExecutionRequest;
use crate::result::ExecutionResult;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Fixed listen port.
pub const PORT: u16 = 7682;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    claude_available: bool,
    uptime: f64,
}

/// Build the router with all endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/claude", post(run_prompt))
        .route("/api/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server on all interfaces until SIGINT or SIGTERM.
pub async fn run_server(port: u16, state: AppState) -> Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| GatewayError::Bind { addr, source })?;
    info!("Starting HTTP server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(GatewayError::Serve)?;

    info!("HTTP server stopped");
    Ok(())
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Claude Terminal API",
        "endpoints": {
            "POST /api/claude": "Execute",
            "GET /api/health": "Status",
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let executor = state.executor.clone();
    let claude_available = tokio::task::spawn_blocking(move || executor.is_available())
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Availability check failed");
            false
        });

    Json(HealthResponse {
        status: "ok",
        claude_available,
        uptime: state.uptime_secs(),
    })
}

async fn run_prompt(
    State(state): State<AppState>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> (StatusCode, Json<ExecutionResult>) {
    let parsed = match body {
        Ok(body) => ExecutionRequest::from_body(&body, state.config.api_timeout_secs),
        Err(e) => {
            warn!(error = %e, "POST /api/claude - unreadable body");
            Err(ExecutionResult::validation("Invalid request"))
        }
    };
    let result = match parsed {
        Ok(request) => {
            info!(
                prompt_chars = request.prompt.chars().count(),
                timeout_secs = request.timeout_secs,
                "POST /api/claude"
            );
            state.executor.execute(&request).await
        }
        Err(rejection) => {
            warn!(?rejection, "POST /api/claude - rejected");
            rejection
        }
    };
    (result.status_code(), Json(result))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
