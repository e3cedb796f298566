//! Incremental run status reports pushed to console observers.

use serde::{Deserialize, Serialize};

use super::run::{Run, RunStatus};
use super::transcript::ChatTurn;

/// Status report emitted while a run is in progress and once at the end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Snapshot {
    /// Run the snapshot belongs to.
    pub run_id: String,
    /// Script label.
    pub script: String,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Human-readable status line.
    pub status_text: String,
    /// Exit code once the process has exited, `None` while running or when
    /// killed by a signal.
    pub exit_code: Option<i32>,
    /// Estimated progress in `[0, 1]`; capped below 1 until the run ends.
    pub progress: f64,
    /// Answer extracted from the log so far.
    pub answer: Option<String>,
    /// Full log text so far.
    pub log: String,
    /// Path of the per-run log file.
    pub log_file: String,
    /// Transcript extracted from the log so far.
    pub transcript: Option<Vec<ChatTurn>>,
    /// Set on the last snapshot of a run.
    #[serde(rename = "final")]
    pub is_final: bool,
}

impl Snapshot {
    /// Snapshot skeleton for `run` with the given status; content fields
    /// are left empty.
    #[must_use]
    pub fn for_run(run: &Run, status: RunStatus, exit_code: Option<i32>) -> Self {
        Self {
            run_id: run.id.clone(),
            script: run.script.clone(),
            status,
            status_text: status.describe(exit_code),
            exit_code,
            progress: 0.0,
            answer: None,
            log: String::new(),
            log_file: run.log_path.display().to_string(),
            transcript: None,
            is_final: status.is_terminal(),
        }
    }
}
