// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Misuse of the pausable task API (resuming without a matching pause,
//! running twice, cancelling a non-cancellable task) is reported as a regular
//! `Err(TaskError::..)` rather than trapping, so callers can recover.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task has already been started")]
    AlreadyStarted,

    #[error("Task has not been started yet")]
    NotStarted,

    #[error("Resume called without a matching outstanding pause request")]
    ResumeWithoutPause,

    #[error("Task was not constructed as cancellable")]
    NotCancellable,

    #[error("No activity is associated with the current unit of work")]
    NoCurrentActivity,

    #[error("Activity '{0}' already has an incomplete pausable task attached")]
    ActivityBusy(String),

    #[error("Operation was interrupted although neither pause nor cancellation was requested")]
    UnexpectedInterruption,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskError>;
