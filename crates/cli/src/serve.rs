//! HTTP trigger: every `GET /run-script` runs one isolated analysis in a fresh
//! child process and relays what it printed.

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const LOG_TARGET: &str = "serve";

#[derive(Clone, Debug)]
pub struct ServeState {
    inner: Arc<ChildCommand>,
}

#[derive(Debug)]
struct ChildCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl ServeState {
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self {
            inner: Arc::new(ChildCommand { program, args }),
        }
    }
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct TriggerResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub error: String,
}

impl TriggerResponse {
    fn from_captured(stdout: &[u8], stderr: &[u8]) -> Self {
        Self {
            output: Some(String::from_utf8_lossy(stdout).into_owned()),
            error: String::from_utf8_lossy(stderr).into_owned(),
        }
    }

    fn spawn_failed(reason: String) -> Self {
        Self {
            output: None,
            error: reason,
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub fn router(state: ServeState) -> Router {
    Router::new()
        .route("/run-script", get(run_script))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: ServeState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(target: LOG_TARGET, %addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("trigger server failed")?;

    tracing::info!(target: LOG_TARGET, "server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(target: LOG_TARGET, "received shutdown signal"),
        Err(e) => {
            tracing::warn!(target: LOG_TARGET, error = %e, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}

/// Runs the analysis to completion. The child is killed if the request is
/// dropped first.
async fn run_script(State(state): State<ServeState>) -> (StatusCode, Json<TriggerResponse>) {
    let cmd = &state.inner;
    tracing::info!(
        target: LOG_TARGET,
        program = %cmd.program.display(),
        args = ?cmd.args,
        "starting analysis run"
    );

    let output = Command::new(&cmd.program)
        .args(&cmd.args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await;

    match output {
        Ok(out) => {
            tracing::info!(
                target: LOG_TARGET,
                status = ?out.status.code(),
                stdout_bytes = out.stdout.len(),
                "analysis run finished"
            );
            (
                StatusCode::OK,
                Json(TriggerResponse::from_captured(&out.stdout, &out.stderr)),
            )
        }
        Err(e) => {
            tracing::error!(target: LOG_TARGET, error = %e, "could not start analysis");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TriggerResponse::spawn_failed(format!(
                    "could not start analysis: {e}"
                ))),
            )
        }
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}
