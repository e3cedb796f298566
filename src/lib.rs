#![forbid(unsafe_code)]

//! Local web console for launching agent scripts and streaming their
//! progress, logs, answers, and chat transcripts.

pub mod config;
pub mod env_store;
pub mod errors;
pub mod http;
pub mod interpreter;
pub mod models;
pub mod orchestrator;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
