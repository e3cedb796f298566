//! Run driver: the polling loop between a live session and its observers.
//!
//! On every tick the driver
//! 1. checks the watchdog budget and stops the process on overrun,
//! 2. drains newly relayed lines into the accumulated log,
//! 3. checks whether the process has exited,
//! 4. publishes a [`Snapshot`] with progress, answer, log, and transcript.
//!
//! Once the process exits the driver waits (bounded) for the relay to
//! drain, records the final snapshot as the latest one, and returns it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, info_span, warn, Instrument};

use super::relay::RelayReport;
use super::session::{RunSession, StopReason};
use super::supervisor::{ProcessState, TerminateOutcome};
use crate::config::GlobalConfig;
use crate::interpreter::{extract_answer, extract_chat_history};
use crate::models::run::RunStatus;
use crate::models::snapshot::Snapshot;

/// Progress never reaches 1.0 while the process is running.
const PROGRESS_CAP: f64 = 0.99;

/// Minimum time allowed for the relay to drain after the process exits.
const RELAY_DRAIN_FLOOR: Duration = Duration::from_secs(1);

/// Timing parameters for one driver loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    /// Watchdog budget.
    pub run_timeout: Duration,
    /// Grace period before a forced kill.
    pub grace_period: Duration,
    /// Tick interval.
    pub poll_interval: Duration,
    /// Nominal run length for the progress estimate.
    pub expected_duration: Duration,
}

impl DriverSettings {
    /// Settings taken from the global configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            run_timeout: config.run_timeout(),
            grace_period: config.grace_period(),
            poll_interval: config.poll_interval(),
            expected_duration: config.expected_duration(),
        }
    }

    fn progress(&self, elapsed: Duration) -> f64 {
        let expected = self.expected_duration.as_secs_f64();
        if expected <= 0.0 {
            return PROGRESS_CAP;
        }
        (elapsed.as_secs_f64() / expected).min(PROGRESS_CAP)
    }
}

/// Upper bound on handing the final snapshot to a stalled observer.
pub const FINAL_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Destinations for published snapshots.
///
/// The stream channel feeds the observer that started the run; it is
/// dropped silently once that observer goes away. Interim snapshots are
/// skipped while the observer's buffer is full so a slow reader never
/// stalls the watchdog. The optional `latest` channel always holds the
/// most recent snapshot for late observers.
///
/// [`drive`] only records the final snapshot in `latest`; the owner hands
/// it to the stream with [`SnapshotSink::deliver_final`] once the run's
/// resources are released.
#[derive(Debug)]
pub struct SnapshotSink {
    stream: Option<mpsc::Sender<Snapshot>>,
    latest: Option<Arc<watch::Sender<Option<Snapshot>>>>,
}

impl SnapshotSink {
    /// Sink publishing to `stream` and, when given, to `latest`.
    #[must_use]
    pub fn new(
        stream: mpsc::Sender<Snapshot>,
        latest: Option<Arc<watch::Sender<Option<Snapshot>>>>,
    ) -> Self {
        Self {
            stream: Some(stream),
            latest,
        }
    }

    fn record_latest(&self, snapshot: &Snapshot) {
        if let Some(latest) = &self.latest {
            latest.send_replace(Some(snapshot.clone()));
        }
    }

    fn publish(&mut self, snapshot: &Snapshot) {
        self.record_latest(snapshot);
        let Some(tx) = &self.stream else {
            return;
        };
        match tx.try_send(snapshot.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(run_id = %snapshot.run_id, "snapshot observer lagging, skipping");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(run_id = %snapshot.run_id, "snapshot observer disconnected");
                self.stream = None;
            }
        }
    }

    /// Hand `snapshot` to the stream observer, waiting at most `limit` for
    /// buffer space. The stream is closed afterwards either way.
    pub async fn deliver_final(&mut self, snapshot: &Snapshot, limit: Duration) {
        let Some(tx) = self.stream.take() else {
            return;
        };
        match tokio::time::timeout(limit, tx.send(snapshot.clone())).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => debug!(run_id = %snapshot.run_id, "snapshot observer disconnected"),
            Err(_) => warn!(
                run_id = %snapshot.run_id,
                ?limit,
                "snapshot observer stalled, final snapshot not delivered"
            ),
        }
    }
}

/// Drive `session` to completion, publishing interim snapshots to `sink`.
///
/// Never fails: supervision and extraction problems degrade to log lines
/// and absent values. The final snapshot is recorded as the latest one and
/// returned; delivering it to the stream is left to the caller.
pub async fn drive(
    session: Arc<RunSession>,
    mut queue: mpsc::UnboundedReceiver<String>,
    relay: JoinHandle<RelayReport>,
    settings: DriverSettings,
    sink: &mut SnapshotSink,
) -> Snapshot {
    let span = info_span!("drive_run", run_id = %session.run().id);
    async move {
        let mut lines: Vec<String> = Vec::new();
        let mut ticker = tokio::time::interval(settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (status, exit_code) = loop {
            ticker.tick().await;

            if session.elapsed() > settings.run_timeout {
                warn!(budget = ?settings.run_timeout, "run exceeded watchdog budget");
                let outcome = session.stop(StopReason::Timeout, settings.grace_period).await;
                if outcome != TerminateOutcome::NothingToTerminate {
                    let exit_code = match session.poll().await {
                        ProcessState::Exited(code) => code,
                        ProcessState::Running => None,
                    };
                    break (RunStatus::TimedOut, exit_code);
                }
            }

            drain(&mut queue, &mut lines);

            if let ProcessState::Exited(code) = session.poll().await {
                let status = if session.was_terminated() {
                    RunStatus::Terminated
                } else {
                    RunStatus::from_exit_code(code)
                };
                break (status, code);
            }

            let mut snapshot = build_snapshot(&session, RunStatus::Running, None, &lines);
            snapshot.progress = settings.progress(session.elapsed());
            sink.publish(&snapshot);
        };

        let relay_wait = settings.grace_period.max(RELAY_DRAIN_FLOOR);
        match tokio::time::timeout(relay_wait, relay).await {
            Ok(Ok(report)) => debug!(lines = report.lines, "relay finished"),
            Ok(Err(err)) => warn!(%err, "relay task failed"),
            Err(_) => warn!("relay did not finish in time; output may be incomplete"),
        }
        drain(&mut queue, &mut lines);

        let mut snapshot = build_snapshot(&session, status, exit_code, &lines);
        snapshot.progress = 1.0;
        info!(?status, ?exit_code, lines = lines.len(), "run finished");
        sink.record_latest(&snapshot);
        snapshot
    }
    .instrument(span)
    .await
}

fn drain(queue: &mut mpsc::UnboundedReceiver<String>, lines: &mut Vec<String>) {
    while let Ok(line) = queue.try_recv() {
        lines.push(line);
    }
}

fn build_snapshot(
    session: &RunSession,
    status: RunStatus,
    exit_code: Option<i32>,
    lines: &[String],
) -> Snapshot {
    let mut snapshot = Snapshot::for_run(session.run(), status, exit_code);
    snapshot.answer = extract_answer(lines);
    snapshot.transcript = extract_chat_history(lines);
    snapshot.log = lines.join("\n");
    snapshot
}
