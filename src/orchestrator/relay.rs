//! Output relay task.
//!
//! Reads a child's stdout and stderr line by line, merged into a single
//! stream, and mirrors every line to the run's log file (flushed per line)
//! and to an unbounded queue drained by the run driver. The task ends on
//! its own once both streams reach EOF; no cancellation signal is needed.

use std::path::Path;

use futures_util::stream::select;
use futures_util::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use super::codec::LogLineCodec;
use crate::{AppError, Result};

/// Summary returned when the relay finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Lines pushed to the queue.
    pub lines: usize,
    /// Lines that could not be written to the log file.
    pub write_failures: usize,
}

/// Open (creating if needed) a run log file for appending.
///
/// # Errors
///
/// Returns `AppError::Io` if the parent directory cannot be created or the
/// file cannot be opened.
pub async fn open_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|err| {
            AppError::Io(format!(
                "failed to create log directory {}: {err}",
                parent.display()
            ))
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|err| AppError::Io(format!("failed to open log {}: {err}", path.display())))
}

/// Spawn [`run_relay`] as an independent task.
#[must_use]
pub fn spawn_relay<O, E, W>(
    run_id: String,
    stdout: O,
    stderr: E,
    log: W,
    queue: mpsc::UnboundedSender<String>,
) -> JoinHandle<RelayReport>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(run_relay(run_id, stdout, stderr, log, queue))
}

/// Copy every output line to `log` and `queue` until both streams close.
///
/// A failed log write is logged and counted; the line is still queued so
/// the console keeps seeing output. An I/O error on one output stream ends
/// that stream only. A closed queue (driver gone) is ignored; the log file
/// keeps receiving lines.
pub async fn run_relay<O, E, W>(
    run_id: String,
    stdout: O,
    stderr: E,
    mut log: W,
    queue: mpsc::UnboundedSender<String>,
) -> RelayReport
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let out = FramedRead::new(stdout, LogLineCodec::new());
    let err = FramedRead::new(stderr, LogLineCodec::new());
    let mut merged = select(out, err);
    let mut report = RelayReport::default();

    while let Some(item) = merged.next().await {
        let line = match item {
            Ok(line) => line,
            Err(e) => {
                warn!(run_id, error = %e, "relay: output stream error");
                continue;
            }
        };

        if let Err(e) = write_line(&mut log, &line).await {
            report.write_failures += 1;
            warn!(run_id, error = %e, "relay: failed to append to log file");
        }

        if queue.send(line).is_err() {
            debug!(run_id, "relay: queue receiver dropped");
        }
        report.lines += 1;
    }

    if let Err(e) = log.shutdown().await {
        debug!(run_id, error = %e, "relay: failed to close log file");
    }
    debug!(run_id, lines = report.lines, "relay: output streams closed");
    report
}

async fn write_line<W: AsyncWrite + Unpin>(log: &mut W, line: &str) -> std::io::Result<()> {
    log.write_all(line.as_bytes()).await?;
    log.write_all(b"\n").await?;
    log.flush().await
}
