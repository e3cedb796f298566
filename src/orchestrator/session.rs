//! Run session context: the one live process of a run and its queue.
//!
//! A [`RunSession`] is created when a run starts and dropped once its
//! driver finishes. It owns the process handle behind a mutex so the driver
//! (polling, watchdog) and the run manager (termination requests) never
//! race on it.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use super::relay::{self, RelayReport};
use super::supervisor::{self, CommandSpec, ProcessHandle, ProcessState, TerminateOutcome};
use crate::models::run::Run;
use crate::Result;

/// Why the driver should stop waiting on a live process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Terminated on explicit request.
    Requested,
    /// Watchdog budget exceeded.
    Timeout,
}

/// Live state of a single run.
#[derive(Debug)]
pub struct RunSession {
    run: Run,
    started: Instant,
    process: Mutex<ProcessHandle>,
    queue: mpsc::UnboundedSender<String>,
    terminated: CancellationToken,
}

/// Pieces handed to the driver when a session launches.
#[derive(Debug)]
pub struct Launched {
    /// Queue receiving relayed output lines and session notes.
    pub queue: mpsc::UnboundedReceiver<String>,
    /// Relay task; completes when the child's output closes.
    pub relay: JoinHandle<RelayReport>,
}

impl RunSession {
    /// Open the run's log file, start the process, and spawn its relay.
    ///
    /// The log file is opened first so a file-system failure never leaves
    /// an orphaned process behind.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the log file cannot be opened, or
    /// `AppError::Spawn` if the process cannot be started.
    pub async fn launch(run: Run, spec: &CommandSpec) -> Result<(Self, Launched)> {
        let span = info_span!("launch_run", run_id = %run.id, script = %run.script);

        async move {
            let log = relay::open_log(&run.log_path).await?;
            let spawned = supervisor::start(spec)?;
            let (tx, rx) = mpsc::unbounded_channel();

            let relay = relay::spawn_relay(
                run.id.clone(),
                spawned.stdout,
                spawned.stderr,
                log,
                tx.clone(),
            );

            info!(
                pid = spawned.handle.pid().unwrap_or(0),
                log = %run.log_path.display(),
                "run started"
            );

            let session = Self {
                run,
                started: Instant::now(),
                process: Mutex::new(spawned.handle),
                queue: tx,
                terminated: CancellationToken::new(),
            };
            Ok((session, Launched { queue: rx, relay }))
        }
        .instrument(span)
        .await
    }

    /// The run this session executes.
    #[must_use]
    pub fn run(&self) -> &Run {
        &self.run
    }

    /// Time since the process started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether a termination request has stopped the process.
    #[must_use]
    pub fn was_terminated(&self) -> bool {
        self.terminated.is_cancelled()
    }

    /// Non-blocking process status.
    pub async fn poll(&self) -> ProcessState {
        self.process.lock().await.poll()
    }

    /// Stop the process for `reason`, escalating to a kill after `grace`.
    ///
    /// When a process was actually stopped, a note is recorded in the log
    /// and, for [`StopReason::Requested`], the session is marked terminated
    /// before the lock is released so the driver classifies the exit
    /// correctly.
    pub async fn stop(&self, reason: StopReason, grace: Duration) -> TerminateOutcome {
        let mut process = self.process.lock().await;
        let outcome = process.terminate(grace).await;

        if let TerminateOutcome::Stopped { forced } = outcome {
            let note = match reason {
                StopReason::Requested => {
                    self.terminated.cancel();
                    "Process terminated by request".to_owned()
                }
                StopReason::Timeout => format!(
                    "Execution timed out after {}s, process terminated",
                    self.elapsed().as_secs()
                ),
            };
            warn!(run_id = %self.run.id, ?reason, forced, "run process stopped");
            drop(process);
            self.record_note(&note).await;
        }

        outcome
    }

    /// Append a console-generated line to the log file and the queue.
    pub async fn record_note(&self, note: &str) {
        match relay::open_log(&self.run.log_path).await {
            Ok(mut file) => {
                let line = format!("{note}\n");
                if let Err(err) = file.write_all(line.as_bytes()).await {
                    warn!(run_id = %self.run.id, %err, "failed to append note to log file");
                }
            }
            Err(err) => warn!(run_id = %self.run.id, %err, "failed to open log file for note"),
        }
        if self.queue.send(note.to_owned()).is_err() {
            warn!(run_id = %self.run.id, "note queue closed");
        }
    }
}
