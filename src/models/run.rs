//! Run model and lifecycle helpers.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ScriptConfig;

/// Lifecycle status for a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run accepted; process not yet confirmed live.
    Starting,
    /// Process is live and output is being relayed.
    Running,
    /// Process exited with code 0.
    Succeeded,
    /// Process exited non-zero or was killed by a signal.
    Failed,
    /// Watchdog budget exceeded; process was terminated.
    TimedOut,
    /// Process was terminated on request.
    Terminated,
}

impl RunStatus {
    /// Classify a natural process exit.
    #[must_use]
    pub fn from_exit_code(code: Option<i32>) -> Self {
        if code == Some(0) {
            Self::Succeeded
        } else {
            Self::Failed
        }
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Starting | Self::Running)
    }

    /// Human-readable status line shown in the console.
    #[must_use]
    pub fn describe(self, exit_code: Option<i32>) -> String {
        match self {
            Self::Starting => "🚀 Starting...".to_owned(),
            Self::Running => "⏳ Running...".to_owned(),
            Self::Succeeded => "✅ Run succeeded".to_owned(),
            Self::Failed => exit_code.map_or_else(
                || "❌ Run failed (terminated by signal)".to_owned(),
                |code| format!("❌ Run failed (exit code: {code})"),
            ),
            Self::TimedOut => "⏱️ Run timed out; process terminated".to_owned(),
            Self::Terminated => "⛔ Run terminated".to_owned(),
        }
    }
}

/// One invocation of a script with one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Run {
    /// Unique run identifier.
    pub id: String,
    /// Picker label of the script.
    pub script: String,
    /// Script file name.
    pub script_file: String,
    /// Question passed to the script.
    pub question: String,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
    /// Per-run log file.
    pub log_path: PathBuf,
}

impl Run {
    /// Construct a run for `script`, placing its log under `logs_dir`.
    ///
    /// The log file is named `<script-stem>_<YYYYMMDD_HHMMSS>.log` using
    /// local time.
    #[must_use]
    pub fn new(script: &ScriptConfig, question: &str, logs_dir: &Path) -> Self {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let file_name = format!("{}_{stamp}.log", script_stem(&script.file));
        Self {
            id: Uuid::new_v4().to_string(),
            script: script.label.clone(),
            script_file: script.file.clone(),
            question: question.to_owned(),
            started_at: Utc::now(),
            log_path: logs_dir.join(file_name),
        }
    }
}

/// File stem of a script name (`run_mini.py` → `run_mini`).
#[must_use]
pub fn script_stem(file: &str) -> String {
    Path::new(file)
        .file_stem()
        .map_or_else(|| file.to_owned(), |s| s.to_string_lossy().into_owned())
}
