// src/logging.rs

//! Subscriber setup for the `pausable-task` binary.
//!
//! The filter comes from `--log-level` when given, otherwise from
//! `PAUSABLE_TASK_LOG`, which accepts any `EnvFilter` directive string such
//! as `info,pausable_task::engine=trace`. Without either, `info` is used.
//! Output goes to stderr; stdout carries only the scenario report.

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable consulted when no CLI level is given.
pub const LOG_ENV_VAR: &str = "PAUSABLE_TASK_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV_VAR).ok();
    let directives = resolve_directives(cli_level, env_value.as_deref());
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid log filter '{directives}'"))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("installing tracing subscriber: {err}"))
}

/// Filter directives for the given CLI flag and environment value.
///
/// The flag wins. An environment value that does not parse as a filter is
/// ignored rather than failing startup.
pub fn resolve_directives(cli_level: Option<LogLevel>, env_value: Option<&str>) -> String {
    if let Some(level) = cli_level {
        return level.as_directive().to_string();
    }
    env_value
        .map(str::trim)
        .filter(|value| !value.is_empty() && EnvFilter::try_new(value).is_ok())
        .unwrap_or(DEFAULT_DIRECTIVES)
        .to_string()
}
