//! Single-slot run manager.
//!
//! At most one run is live at a time. A run request while another run is
//! active is rejected with [`AppError::Busy`]; the caller terminates the
//! active run first if it wants to replace it. The slot is released by the
//! driver task as soon as the run reaches a terminal status, before the
//! final snapshot is handed to the observer that started it.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

use super::driver::{self, DriverSettings, SnapshotSink};
use super::session::{RunSession, StopReason};
use super::supervisor::{CommandSpec, TerminateOutcome};
use crate::config::{GlobalConfig, ScriptConfig};
use crate::env_store::EnvStore;
use crate::models::run::Run;
use crate::models::snapshot::Snapshot;
use crate::{AppError, Result};

/// Snapshots buffered between the driver and a slow observer.
pub const SNAPSHOT_BUFFER: usize = 32;

/// Handle returned to the caller that started a run.
#[derive(Debug)]
pub struct RunStream {
    /// The run that was started.
    pub run: Run,
    /// Incremental snapshots, ending with the final one.
    pub snapshots: mpsc::Receiver<Snapshot>,
    /// Driver task; resolves to the final snapshot.
    pub driver: JoinHandle<Snapshot>,
}

/// Owner of the single active run session.
#[derive(Debug)]
pub struct RunManager {
    config: Arc<GlobalConfig>,
    env: Arc<EnvStore>,
    slot: Mutex<Option<Arc<RunSession>>>,
    latest: Arc<watch::Sender<Option<Snapshot>>>,
}

impl RunManager {
    /// Create a manager with an empty slot.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, env: Arc<EnvStore>) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            config,
            env,
            slot: Mutex::new(None),
            latest: Arc::new(latest),
        }
    }

    /// Shared configuration.
    #[must_use]
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Start `script_label` with `question` and begin streaming snapshots.
    ///
    /// # Errors
    ///
    /// - `AppError::Validation`: the question is empty or whitespace-only;
    ///   no process is started.
    /// - `AppError::NotFound`: unknown script label.
    /// - `AppError::Busy`: another run is active.
    /// - `AppError::Io` / `AppError::Spawn`: the log file or the process
    ///   could not be created.
    pub async fn start_run(self: &Arc<Self>, script_label: &str, question: &str) -> Result<RunStream> {
        if question.trim().is_empty() {
            return Err(AppError::Validation("question must not be empty".into()));
        }
        let script = self
            .config
            .script(script_label)
            .ok_or_else(|| AppError::NotFound(format!("script {script_label:?} is not configured")))?;

        let mut slot = self.slot.lock().await;
        if let Some(active) = slot.as_ref() {
            return Err(AppError::Busy(format!(
                "run {} is still active; terminate it first",
                active.run().id
            )));
        }

        let run = Run::new(script, question, &self.config.logs_path());
        let spec = self.command_for(script, question);
        let (session, launched) = RunSession::launch(run, &spec).await?;
        let session = Arc::new(session);
        *slot = Some(Arc::clone(&session));
        drop(slot);

        let run = session.run().clone();
        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let mut sink = SnapshotSink::new(tx, Some(Arc::clone(&self.latest)));
        let settings = DriverSettings::from_config(&self.config);
        let manager = Arc::clone(self);
        let span = info_span!("run_task", run_id = %run.id);

        let driver_task = tokio::spawn(
            async move {
                let final_snapshot = driver::drive(
                    Arc::clone(&session),
                    launched.queue,
                    launched.relay,
                    settings,
                    &mut sink,
                )
                .await;
                manager.release(&session).await;
                sink.deliver_final(&final_snapshot, driver::FINAL_DELIVERY_TIMEOUT)
                    .await;
                final_snapshot
            }
            .instrument(span),
        );

        Ok(RunStream {
            run,
            snapshots: rx,
            driver: driver_task,
        })
    }

    /// Terminate the active run, if any.
    ///
    /// With no active process this is a no-op reporting
    /// [`TerminateOutcome::NothingToTerminate`].
    pub async fn terminate(&self) -> TerminateOutcome {
        let active = self.slot.lock().await.clone();
        let Some(session) = active else {
            info!("terminate requested with no active run");
            return TerminateOutcome::NothingToTerminate;
        };
        let outcome = session
            .stop(StopReason::Requested, self.config.grace_period())
            .await;
        info!(run_id = %session.run().id, ?outcome, "terminate request handled");
        outcome
    }

    /// Whether a run currently occupies the slot.
    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Most recent snapshot of any run.
    #[must_use]
    pub fn latest(&self) -> Option<Snapshot> {
        self.latest.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Snapshot>> {
        self.latest.subscribe()
    }

    /// Stop the active run during server shutdown.
    pub async fn shutdown(&self) {
        if let TerminateOutcome::Stopped { forced } = self.terminate().await {
            warn!(forced, "active run terminated during shutdown");
        }
    }

    fn command_for(&self, script: &ScriptConfig, question: &str) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.config.runtime);
        if let Some(adapter) = self.config.adapter_path() {
            spec = spec.arg(adapter);
        }
        spec = spec
            .arg(self.config.script_path(script))
            .current_dir(&self.config.workspace_root);
        for (key, value) in self.env.child_env() {
            spec = spec.env(key, value);
        }
        spec.env(&self.config.question_env_var, question)
    }

    async fn release(&self, session: &Arc<RunSession>) {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|active| Arc::ptr_eq(active, session)) {
            *slot = None;
        }
    }
}
