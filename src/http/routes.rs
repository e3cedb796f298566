//! Request handlers for the HTTP console.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Html;
use axum::Json;
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AppState;
use crate::config::{ExampleQuestion, ScriptConfig};
use crate::models::snapshot::Snapshot;
use crate::orchestrator::supervisor::TerminateOutcome;
use crate::{AppError, Result};

const CONSOLE_PAGE: &str = include_str!("console.html");

/// Body of `POST /api/runs`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartRunRequest {
    /// Script label as shown in the picker.
    pub script: String,
    /// Question passed to the script.
    pub question: String,
}

/// Body of `GET /api/scripts`.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptListing {
    /// Launchable scripts in picker order.
    pub scripts: Vec<ScriptConfig>,
    /// Example question gallery.
    pub examples: Vec<ExampleQuestion>,
}

/// Body of `POST /api/runs/terminate`.
#[derive(Debug, Clone, Serialize)]
pub struct TerminateResponse {
    /// Whether a live process was stopped.
    pub terminated: bool,
    /// Confirmation message.
    pub message: String,
}

/// One editable variable as presented to the console.
#[derive(Debug, Clone, Serialize)]
pub struct EnvVarView {
    /// Variable name.
    pub name: String,
    /// Form label.
    pub label: String,
    /// Secret values are masked.
    pub secret: bool,
    /// Required marker.
    pub required: bool,
    /// Current value; always empty for secrets.
    pub value: String,
    /// Whether a non-empty value is currently set.
    pub is_set: bool,
}

/// One presentation group of variables.
#[derive(Debug, Clone, Serialize)]
pub struct EnvGroupView {
    /// Group heading.
    pub name: String,
    /// Variables in the group.
    pub vars: Vec<EnvVarView>,
}

/// Body of `POST /api/env`.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveEnvRequest {
    /// Submitted values keyed by variable name.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

/// Body returned by `POST /api/env`.
#[derive(Debug, Clone, Serialize)]
pub struct SaveEnvResponse {
    /// Number of keys written.
    pub saved: usize,
    /// Confirmation message.
    pub message: String,
}

/// `GET /` serves the embedded console page.
pub async fn index() -> Html<&'static str> {
    Html(CONSOLE_PAGE)
}

/// `GET /health` liveness probe.
pub async fn health() -> &'static str {
    "ok"
}

/// `GET /api/scripts`.
pub async fn list_scripts(State(state): State<AppState>) -> Json<ScriptListing> {
    Json(ScriptListing {
        scripts: state.config.scripts.clone(),
        examples: state.config.examples.clone(),
    })
}

/// `POST /api/runs` starts a run and streams its snapshots as SSE.
///
/// # Errors
///
/// Fails before any event is sent when the run cannot be started; see
/// [`crate::orchestrator::run_manager::RunManager::start_run`].
pub async fn start_run(
    State(state): State<AppState>,
    Json(request): Json<StartRunRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    let started = state
        .runs
        .start_run(&request.script, &request.question)
        .await?;
    info!(run_id = %started.run.id, script = %started.run.script, "run stream opened");

    let events = stream::unfold(started.snapshots, |mut rx| async move {
        let snapshot = rx.recv().await?;
        let event = Event::default().event("snapshot").json_data(&snapshot);
        Some((event, rx))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// `GET /api/runs/latest`.
///
/// # Errors
///
/// Returns `AppError::NotFound` until the first snapshot is published.
pub async fn latest_run(State(state): State<AppState>) -> Result<Json<Snapshot>> {
    state
        .runs
        .latest()
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no run has been started".into()))
}

/// `POST /api/runs/terminate`.
pub async fn terminate_run(State(state): State<AppState>) -> Json<TerminateResponse> {
    let outcome = state.runs.terminate().await;
    Json(TerminateResponse {
        terminated: outcome != TerminateOutcome::NothingToTerminate,
        message: outcome.message().to_owned(),
    })
}

/// `GET /api/env` lists configured variables by group.
pub async fn get_env(State(state): State<AppState>) -> Json<Vec<EnvGroupView>> {
    let groups = state
        .config
        .env_groups
        .iter()
        .map(|group| EnvGroupView {
            name: group.name.clone(),
            vars: group
                .vars
                .iter()
                .map(|var| {
                    let current = state.env.get(&var.name).unwrap_or_default();
                    let is_set = !current.trim().is_empty();
                    EnvVarView {
                        name: var.name.clone(),
                        label: if var.label.is_empty() {
                            var.name.clone()
                        } else {
                            var.label.clone()
                        },
                        secret: var.secret,
                        required: var.required,
                        value: if var.secret { String::new() } else { current },
                        is_set,
                    }
                })
                .collect(),
        })
        .collect();
    Json(groups)
}

/// `POST /api/env` merges submitted values into the dotfile.
///
/// # Errors
///
/// Returns `AppError::Validation` for a malformed variable name or
/// `AppError::Io` if the dotfile cannot be written.
pub async fn save_env(
    State(state): State<AppState>,
    Json(request): Json<SaveEnvRequest>,
) -> Result<Json<SaveEnvResponse>> {
    let saved = state.env.save(request.values)?;
    let message = if saved == 0 {
        "ℹ️ No values to save".to_owned()
    } else {
        format!("✅ Saved {saved} value(s) to {}", state.env.path().display())
    };
    Ok(Json(SaveEnvResponse { saved, message }))
}
