#![forbid(unsafe_code)]

//! `agent-console`: local web console for agent scripts.
//!
//! Loads configuration and the credential dotfile, then serves the HTTP
//! console until interrupted. Any run still active at shutdown is
//! terminated.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use agent_console::config::GlobalConfig;
use agent_console::env_store::EnvStore;
use agent_console::http::{self, AppState};
use agent_console::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-console", about = "Web console for agent scripts", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured HTTP port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the configured workspace root.
    #[arg(long)]
    workspace: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-console bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;

    if let Some(ws) = args.workspace {
        config.workspace_root = ws
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workspace override: {err}")))?;
    }
    if let Some(port) = args.port {
        config.http_port = port;
    }

    let config = Arc::new(config);
    info!(
        workspace = %config.workspace_root.display(),
        scripts = config.scripts.len(),
        "configuration loaded"
    );

    let env = Arc::new(EnvStore::load(config.env_file_path())?);
    info!(path = %env.path().display(), "environment file loaded");

    let state = AppState::new(Arc::clone(&config), env);
    let runs = Arc::clone(&state.runs);

    let ct = CancellationToken::new();
    let server_ct = ct.clone();
    let server = tokio::spawn(async move {
        if let Err(err) = http::serve(state, server_ct).await {
            error!(%err, "http console failed");
        }
    });

    info!(addr = %config.bind_addr(), "console ready");

    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    runs.shutdown().await;

    if let Err(err) = server.await {
        error!(%err, "http console task panicked");
    }
    info!("agent-console shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
