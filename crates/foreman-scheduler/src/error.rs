//! Scheduler error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the scheduling core.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A workspace was released that nobody held.
    #[error("workspace lease not held: {}", .0.display())]
    LeaseNotHeld(PathBuf),

    /// `execute` was called on a mapping that is incomplete or violates a constraint.
    #[error("mapping for task '{0}' is not completely valid")]
    InvalidMapping(String),

    #[error("unknown slot: {0}")]
    UnknownSlot(usize),

    #[error("forecast failed: {0}")]
    Forecast(String),

    #[error("configuration error: {0}")]
    Config(#[from] foreman_config::ConfigError),

    #[error(transparent)]
    Core(#[from] foreman_core::Error),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
