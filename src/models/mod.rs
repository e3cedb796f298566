//! Domain model module declarations.

pub mod run;
pub mod snapshot;
pub mod transcript;
