//! Run orchestration modules.
//!
//! Covers process supervision, output relaying, the run driver loop, and
//! the single-slot run manager.

pub mod codec;
pub mod driver;
pub mod relay;
pub mod run_manager;
pub mod session;
pub mod supervisor;
