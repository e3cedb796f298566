//! Process supervisor: start, poll, and terminate one child process.
//!
//! Children are launched with stdout and stderr piped and
//! `kill_on_drop(true)` so an abandoned handle never leaks a process.
//! Termination is cooperative first (`SIGTERM` on Unix) and escalates to a
//! forced kill once the grace period elapses.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{info, info_span, warn};

use crate::{AppError, Result};

/// Everything needed to launch a child process.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    /// Executable (resolved through `PATH` when not a path).
    pub program: OsString,
    /// Arguments, in order.
    pub args: Vec<OsString>,
    /// Variables added on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Working directory; inherits the server's when `None`.
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    /// Spec for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Printable form of the command line for logs.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|part| part.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Non-blocking process status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Still running.
    Running,
    /// Exited; `None` when killed by a signal or the status was unavailable.
    Exited(Option<i32>),
}

/// Result of a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// The process had already exited (or none was active).
    NothingToTerminate,
    /// The process was stopped.
    Stopped {
        /// `true` when the grace period elapsed and the process was killed.
        forced: bool,
    },
}

impl TerminateOutcome {
    /// Confirmation message shown in the console.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::NothingToTerminate => "❌ No process is running",
            Self::Stopped { forced: false } => "✅ Process terminated",
            Self::Stopped { forced: true } => "✅ Process killed after grace period",
        }
    }
}

/// Handle to a live (or exited) child process.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
}

/// A freshly started child with its output streams detached for relaying.
#[derive(Debug)]
pub struct SpawnedProcess {
    /// Lifecycle handle.
    pub handle: ProcessHandle,
    /// Child's standard output.
    pub stdout: ChildStdout,
    /// Child's standard error.
    pub stderr: ChildStderr,
}

/// Launch a child process with both output streams captured.
///
/// The child inherits the server's environment plus `spec.env`; stdin is
/// closed.
///
/// # Errors
///
/// Returns `AppError::Spawn` if the executable is invalid, the OS refuses
/// to create the process, or an output pipe could not be captured.
pub fn start(spec: &CommandSpec) -> Result<SpawnedProcess> {
    let span = info_span!("start_process", command = %spec.display());
    let _guard = span.enter();

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.current_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Spawn(format!("failed to spawn {}: {err}", spec.display())))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture child stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture child stderr".into()))?;

    let pid = child.id();
    info!(pid = pid.unwrap_or(0), "child process spawned");

    Ok(SpawnedProcess {
        handle: ProcessHandle { child, pid },
        stdout,
        stderr,
    })
}

impl ProcessHandle {
    /// OS process id captured at spawn time.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Non-blocking status check.
    ///
    /// A failure to query the OS is logged and treated as an exit so the
    /// caller does not wait on a process it can no longer observe.
    pub fn poll(&mut self) -> ProcessState {
        match self.child.try_wait() {
            Ok(Some(status)) => ProcessState::Exited(status.code()),
            Ok(None) => ProcessState::Running,
            Err(err) => {
                warn!(pid = self.pid.unwrap_or(0), %err, "failed to poll child process status");
                ProcessState::Exited(None)
            }
        }
    }

    /// Stop the process, escalating to a forced kill after `grace`.
    ///
    /// Calling this on an exited process is a no-op that returns
    /// [`TerminateOutcome::NothingToTerminate`].
    pub async fn terminate(&mut self, grace: Duration) -> TerminateOutcome {
        let pid = self.pid.unwrap_or(0);
        if let ProcessState::Exited(_) = self.poll() {
            return TerminateOutcome::NothingToTerminate;
        }

        self.request_stop();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(pid, ?status, "child process exited after stop request");
                TerminateOutcome::Stopped { forced: false }
            }
            Ok(Err(err)) => {
                warn!(pid, %err, "error waiting for child process, forcing kill");
                self.force_kill().await;
                TerminateOutcome::Stopped { forced: true }
            }
            Err(_) => {
                warn!(pid, ?grace, "child process did not exit within grace period, forcing kill");
                self.force_kill().await;
                TerminateOutcome::Stopped { forced: true }
            }
        }
    }

    async fn force_kill(&mut self) {
        if let Err(err) = self.child.kill().await {
            warn!(pid = self.pid.unwrap_or(0), %err, "failed to force-kill child process");
        }
    }

    #[cfg(unix)]
    fn request_stop(&mut self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(raw) = self.child.id().and_then(|pid| i32::try_from(pid).ok()) else {
            return;
        };
        if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
            warn!(pid = raw, %err, "failed to send SIGTERM to child process");
        }
    }

    #[cfg(not(unix))]
    fn request_stop(&mut self) {
        if let Err(err) = self.child.start_kill() {
            warn!(pid = self.pid.unwrap_or(0), %err, "failed to stop child process");
        }
    }
}
