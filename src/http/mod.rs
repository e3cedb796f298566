//! HTTP console transport.
//!
//! Serves the embedded console page and a small JSON API. Run progress is
//! streamed to the browser as Server-Sent Events, one `snapshot` event per
//! driver tick.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::GlobalConfig;
use crate::env_store::EnvStore;
use crate::orchestrator::run_manager::RunManager;
use crate::{AppError, Result};

pub mod routes;

/// Shared state for all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Credential dotfile store.
    pub env: Arc<EnvStore>,
    /// Single-slot run manager.
    pub runs: Arc<RunManager>,
}

impl AppState {
    /// Build state with a fresh run manager.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, env: Arc<EnvStore>) -> Self {
        let runs = Arc::new(RunManager::new(Arc::clone(&config), Arc::clone(&env)));
        Self { config, env, runs }
    }
}

/// Build the console router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/api/scripts", get(routes::list_scripts))
        .route("/api/runs", post(routes::start_run))
        .route("/api/runs/latest", get(routes::latest_run))
        .route("/api/runs/terminate", post(routes::terminate_run))
        .route("/api/env", get(routes::get_env).post(routes::save_env))
        .with_state(state)
}

/// Bind `config.http_host:http_port` and serve until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the server fails to bind.
pub async fn serve(state: AppState, ct: CancellationToken) -> Result<()> {
    let bind = state.config.bind_addr();
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind console on {bind}: {err}")))?;
    serve_with_listener(listener, state, ct).await
}

/// Serve on an already-bound listener until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the server stops with an I/O error.
pub async fn serve_with_listener(
    listener: TcpListener,
    state: AppState,
    ct: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "starting HTTP console");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("console server error: {err}")))?;

    info!("HTTP console shut down");
    Ok(())
}
