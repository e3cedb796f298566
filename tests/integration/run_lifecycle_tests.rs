//! End-to-end run lifecycle tests against real `/bin/sh` children.
//!
//! Covers natural success and failure, watchdog timeout, requested
//! termination, and the per-run log file.

#![cfg(unix)]

use agent_console::models::run::RunStatus;
use agent_console::orchestrator::supervisor::TerminateOutcome;

use super::test_helpers::{finish, fixture, wait_for_log};

#[tokio::test]
async fn successful_run_reports_answer_and_question() {
    let fx = fixture(30);
    let manager = fx.manager();

    let stream = manager
        .start_run("Echo", "What is six times seven?")
        .await
        .expect("start");
    let (seen, last) = finish(stream).await;

    assert_eq!(last.status, RunStatus::Succeeded);
    assert_eq!(last.exit_code, Some(0));
    assert_eq!(last.status_text, "✅ Run succeeded");
    assert_eq!(last.answer.as_deref(), Some("42"));
    assert!(last.log.contains("question=What is six times seven?"));
    assert!(last.is_final);
    assert!((last.progress - 1.0).abs() < f64::EPSILON);

    assert_eq!(seen.last(), Some(&last));
    assert_eq!(seen.iter().filter(|s| s.is_final).count(), 1);
    assert!(seen.iter().all(|s| s.progress <= 1.0));
}

#[tokio::test]
async fn failing_run_reports_exit_code_and_keeps_stderr() {
    let fx = fixture(30);
    let manager = fx.manager();

    let stream = manager.start_run("Fail", "q").await.expect("start");
    let (_, last) = finish(stream).await;

    assert_eq!(last.status, RunStatus::Failed);
    assert_eq!(last.exit_code, Some(3));
    assert_eq!(last.status_text, "❌ Run failed (exit code: 3)");
    assert!(last.log.contains("partial output"));
    assert!(last.log.contains("boom"));
    assert_eq!(last.answer, None);
}

#[tokio::test]
async fn log_file_mirrors_output() {
    let fx = fixture(30);
    let manager = fx.manager();

    let stream = manager.start_run("Fail", "q").await.expect("start");
    let log_path = stream.run.log_path.clone();
    let (_, last) = finish(stream).await;

    assert!(log_path.starts_with(fx.temp.path().canonicalize().expect("canonical").join("logs")));
    assert_eq!(last.log_file, log_path.display().to_string());
    let written = std::fs::read_to_string(&log_path).expect("log file");
    assert!(written.contains("partial output\n"));
    assert!(written.contains("boom\n"));
}

#[tokio::test]
async fn multi_line_transcript_is_reconstructed() {
    let fx = fixture(30);
    let manager = fx.manager();

    let stream = manager.start_run("Chat", "Q").await.expect("start");
    let (_, last) = finish(stream).await;

    let turns = last.transcript.expect("transcript");
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].content, "Q");
    assert_eq!(turns[1].content, "A");
    assert_eq!(last.answer.as_deref(), Some("A"));
}

#[tokio::test]
async fn watchdog_times_out_and_preserves_output() {
    let fx = fixture(1);
    let manager = fx.manager();

    let stream = manager.start_run("Sleep", "q").await.expect("start");
    let log_path = stream.run.log_path.clone();
    let (_, last) = finish(stream).await;

    assert_eq!(last.status, RunStatus::TimedOut);
    assert!(last.is_final);
    assert!(last.log.contains("started"));
    assert!(last.log.contains("Execution timed out after"));
    assert!(!manager.is_active().await);

    let written = std::fs::read_to_string(&log_path).expect("log file");
    assert!(written.contains("started"));
    assert!(written.contains("Execution timed out after"));
}

#[tokio::test]
async fn terminate_stops_active_run() {
    let fx = fixture(30);
    let manager = fx.manager();

    let stream = manager.start_run("Sleep", "q").await.expect("start");
    wait_for_log(&manager, "started").await;

    let outcome = manager.terminate().await;
    assert_eq!(outcome, TerminateOutcome::Stopped { forced: false });
    assert_eq!(outcome.message(), "✅ Process terminated");

    let (_, last) = finish(stream).await;
    assert_eq!(last.status, RunStatus::Terminated);
    assert_eq!(last.status_text, "⛔ Run terminated");
    assert!(last.log.contains("Process terminated by request"));
    assert!(!manager.is_active().await);
}

#[tokio::test]
async fn terminate_without_run_is_a_no_op() {
    let fx = fixture(30);
    let manager = fx.manager();

    let outcome = manager.terminate().await;
    assert_eq!(outcome, TerminateOutcome::NothingToTerminate);
    assert_eq!(outcome.message(), "❌ No process is running");
}

#[tokio::test]
async fn terminate_after_completion_is_a_no_op() {
    let fx = fixture(30);
    let manager = fx.manager();

    let stream = manager.start_run("Echo", "q").await.expect("start");
    finish(stream).await;

    assert_eq!(manager.terminate().await, TerminateOutcome::NothingToTerminate);
}
