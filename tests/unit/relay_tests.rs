//! Unit tests for the output relay.

use tokio::sync::mpsc;

use agent_console::orchestrator::relay::{open_log, run_relay};

#[tokio::test]
async fn relays_both_streams_to_log_and_queue() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("logs").join("run.log");
    let log = open_log(&path).await.expect("open log");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let stdout: &[u8] = b"out 1\nout 2\n";
    let stderr: &[u8] = b"err 1\n";
    let report = run_relay("r1".into(), stdout, stderr, log, tx).await;

    assert_eq!(report.lines, 3);
    assert_eq!(report.write_failures, 0);

    let mut queued = Vec::new();
    while let Ok(line) = rx.try_recv() {
        queued.push(line);
    }
    let out: Vec<_> = queued.iter().filter(|l| l.starts_with("out")).collect();
    assert_eq!(out, vec!["out 1", "out 2"], "per-stream order is preserved");
    assert!(queued.iter().any(|l| l == "err 1"));

    let written = std::fs::read_to_string(&path).expect("read log");
    assert_eq!(written.lines().count(), 3);
    assert!(written.ends_with('\n'));
}

#[tokio::test]
async fn dropped_queue_still_writes_log() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("run.log");
    let log = open_log(&path).await.expect("open log");
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);

    let stdout: &[u8] = b"kept\n";
    let stderr: &[u8] = b"";
    let report = run_relay("r2".into(), stdout, stderr, log, tx).await;

    assert_eq!(report.lines, 1);
    assert_eq!(std::fs::read_to_string(&path).expect("read"), "kept\n");
}

#[tokio::test]
async fn open_log_appends_to_existing_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("run.log");
    std::fs::write(&path, "earlier\n").expect("seed");

    let log = open_log(&path).await.expect("open log");
    let (tx, _rx) = mpsc::unbounded_channel();
    let stdout: &[u8] = b"later\n";
    let stderr: &[u8] = b"";
    run_relay("r3".into(), stdout, stderr, log, tx).await;

    assert_eq!(std::fs::read_to_string(&path).expect("read"), "earlier\nlater\n");
}
