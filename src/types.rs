use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// What a scripted scenario action does to the running task.
///
/// - `Pause`: `pause()` and wait until the task is paused.
/// - `RequestPause`: fire-and-forget `request_pause()`.
/// - `Resume`: release one earlier pause and wait until it is honoured.
/// - `Toggle`: `toggle_paused()`.
/// - `Cancel`: `cancel()` and wait for the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioActionKind {
    Pause,
    RequestPause,
    Resume,
    Toggle,
    Cancel,
}

impl FromStr for ScenarioActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pause" => Ok(ScenarioActionKind::Pause),
            "request_pause" | "request-pause" => Ok(ScenarioActionKind::RequestPause),
            "resume" => Ok(ScenarioActionKind::Resume),
            "toggle" => Ok(ScenarioActionKind::Toggle),
            "cancel" => Ok(ScenarioActionKind::Cancel),
            other => Err(format!(
                "invalid action kind: {other} (expected \"pause\", \"request_pause\", \"resume\", \"toggle\" or \"cancel\")"
            )),
        }
    }
}

impl fmt::Display for ScenarioActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScenarioActionKind::Pause => "pause",
            ScenarioActionKind::RequestPause => "request_pause",
            ScenarioActionKind::Resume => "resume",
            ScenarioActionKind::Toggle => "toggle",
            ScenarioActionKind::Cancel => "cancel",
        };
        f.write_str(s)
    }
}
