//! Global configuration parsing and validation.

use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// One launchable agent script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ScriptConfig {
    /// Display label shown in the script picker; unique.
    pub label: String,
    /// File name of the target script, relative to `script_dir`.
    pub file: String,
    /// Short human-readable description.
    #[serde(default)]
    pub description: String,
}

/// Example question offered in the console gallery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ExampleQuestion {
    /// Label of the script the example targets.
    pub script: String,
    /// Question text.
    pub question: String,
}

/// A credential variable editable from the console.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EnvVarSpec {
    /// Environment variable name.
    pub name: String,
    /// Form label; falls back to the variable name when empty.
    #[serde(default)]
    pub label: String,
    /// Secret values are never echoed back to the console.
    #[serde(default)]
    pub secret: bool,
    /// Marks the variable as required in the form.
    #[serde(default)]
    pub required: bool,
}

/// Presentation group for credential variables.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EnvGroup {
    /// Group heading.
    pub name: String,
    /// Variables shown under this heading.
    #[serde(default)]
    pub vars: Vec<EnvVarSpec>,
}

/// Timing knobs for the run driver.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Wall-clock budget before the watchdog terminates a run.
    #[serde(default = "default_run_seconds")]
    pub run_seconds: u64,
    /// Grace period between the cooperative stop signal and a forced kill.
    #[serde(default = "default_grace_seconds")]
    pub grace_seconds: u64,
    /// Interval between driver polls and snapshots.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Nominal run length used for the progress estimate.
    #[serde(default = "default_expected_seconds")]
    pub expected_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            run_seconds: default_run_seconds(),
            grace_seconds: default_grace_seconds(),
            poll_interval_ms: default_poll_interval_ms(),
            expected_seconds: default_expected_seconds(),
        }
    }
}

fn default_run_seconds() -> u64 {
    1800
}

fn default_grace_seconds() -> u64 {
    5
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_expected_seconds() -> u64 {
    300
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_http_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_http_port() -> u16 {
    7860
}

fn default_runtime() -> String {
    "python3".into()
}

fn default_script_dir() -> PathBuf {
    PathBuf::from("owl")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_env_file() -> PathBuf {
    PathBuf::from(".env")
}

fn default_question_env_var() -> String {
    "OWL_QUESTION".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory the scripts run in; relative paths below resolve against it.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Interface the HTTP console binds to.
    #[serde(default = "default_http_host")]
    pub http_host: IpAddr,
    /// HTTP console port.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Interpreter used to launch scripts (e.g., `python3`).
    #[serde(default = "default_runtime")]
    pub runtime: String,
    /// Optional adapter placed between the runtime and the target script.
    #[serde(default)]
    pub adapter_script: Option<PathBuf>,
    /// Directory holding the target scripts.
    #[serde(default = "default_script_dir")]
    pub script_dir: PathBuf,
    /// Directory receiving one log file per run.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    /// Dotfile holding credential values.
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
    /// Variable carrying the question text into the child process.
    #[serde(default = "default_question_env_var")]
    pub question_env_var: String,
    /// Driver timing.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Launchable scripts, in picker order.
    pub scripts: Vec<ScriptConfig>,
    /// Example question gallery.
    #[serde(default)]
    pub examples: Vec<ExampleQuestion>,
    /// Credential form layout.
    #[serde(default)]
    pub env_groups: Vec<EnvGroup>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Look up a script by its picker label.
    #[must_use]
    pub fn script(&self, label: &str) -> Option<&ScriptConfig> {
        self.scripts.iter().find(|s| s.label == label)
    }

    /// Socket address the console listens on.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http_host, self.http_port)
    }

    /// Absolute directory for run log files.
    #[must_use]
    pub fn logs_path(&self) -> PathBuf {
        self.resolve(&self.logs_dir)
    }

    /// Absolute path of the credential dotfile.
    #[must_use]
    pub fn env_file_path(&self) -> PathBuf {
        self.resolve(&self.env_file)
    }

    /// Absolute path of a script's target file.
    #[must_use]
    pub fn script_path(&self, script: &ScriptConfig) -> PathBuf {
        self.resolve(&self.script_dir).join(&script.file)
    }

    /// Absolute path of the adapter script, if configured.
    #[must_use]
    pub fn adapter_path(&self) -> Option<PathBuf> {
        self.adapter_script.as_deref().map(|p| self.resolve(p))
    }

    /// Watchdog budget for a single run.
    #[must_use]
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.run_seconds)
    }

    /// Grace period before a forced kill.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.timeouts.grace_seconds)
    }

    /// Driver poll cadence.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.timeouts.poll_interval_ms)
    }

    /// Nominal run length for the progress estimate.
    #[must_use]
    pub fn expected_duration(&self) -> Duration {
        Duration::from_secs(self.timeouts.expected_seconds)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.scripts.is_empty() {
            return Err(AppError::Config("at least one script must be configured".into()));
        }

        let mut labels = HashSet::new();
        for script in &self.scripts {
            if script.label.trim().is_empty() || script.file.trim().is_empty() {
                return Err(AppError::Config(
                    "script label and file must not be empty".into(),
                ));
            }
            if !labels.insert(script.label.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate script label: {}",
                    script.label
                )));
            }
        }

        if let Some(example) = self
            .examples
            .iter()
            .find(|e| !labels.contains(e.script.as_str()))
        {
            return Err(AppError::Config(format!(
                "example references unknown script: {}",
                example.script
            )));
        }

        if self.timeouts.run_seconds == 0
            || self.timeouts.poll_interval_ms == 0
            || self.timeouts.expected_seconds == 0
        {
            return Err(AppError::Config(
                "run_seconds, poll_interval_ms and expected_seconds must be greater than zero"
                    .into(),
            ));
        }

        if self.question_env_var.trim().is_empty() {
            return Err(AppError::Config("question_env_var must not be empty".into()));
        }

        let canonical_root = self
            .workspace_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("workspace_root invalid: {err}")))?;
        self.workspace_root = canonical_root;

        Ok(())
    }
}
