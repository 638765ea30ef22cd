// src/lib.rs

//! Pausable tasks: long-running operations that can be paused, resumed and
//! cancelled by concurrent, uncoordinated callers.
//!
//! - [`engine`] holds the state machine, the episode driver and the public
//!   [`PausableTask`] API.
//! - [`activity`] is the boundary with whatever hosts units of work.
//! - [`config`], [`scenario`], [`cli`] and [`logging`] make up the
//!   `pausable-task` demo binary.

pub mod activity;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod scenario;
pub mod types;

use anyhow::{Result, bail};
use tracing::debug;

pub use activity::{Activity, ActivityHost, TokioActivityHost};
pub use config::TaskOptions;
pub use engine::{
    EpisodeError, PausableOperation, PausableTask, PauseStatus, SuspensionToken, TaskOutcome,
    TaskState, operation_fn,
};

use crate::cli::CliArgs;
use crate::config::{ScenarioFile, load_and_validate};
use crate::scenario::{ScenarioReport, run_scenario};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - scenario loading and validation
/// - the demo operation and its pausable task
/// - the scripted pause/resume/cancel actions
pub async fn run(args: CliArgs) -> Result<()> {
    let scenario = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&scenario);
        return Ok(());
    }

    let report = run_scenario(&scenario).await?;
    print_report(&report);

    if let TaskOutcome::Faulted(err) = &report.outcome {
        bail!("task '{}' faulted: {err:#}", scenario.task.name);
    }
    Ok(())
}

/// Simple dry-run output: print the task and the scripted actions.
fn print_dry_run(scenario: &ScenarioFile) {
    let task = &scenario.task;
    println!("pausable-task dry-run");
    println!("  task.name = {}", task.name);
    println!("  task.cancellable = {}", task.cancellable);
    println!("  task.steps = {} x {}ms", task.steps, task.step_ms);
    if let Some(step) = task.fail_at_step {
        println!("  task.fail_at_step = {step}");
    }
    println!();

    println!("actions ({}):", scenario.action.len());
    for action in &scenario.action {
        println!("  - {:>6}ms {}", action.at_ms, action.kind);
    }

    debug!("dry-run complete (nothing executed)");
}

fn print_report(report: &ScenarioReport) {
    for line in &report.events {
        println!("{line}");
    }
    println!(
        "outcome: {} ({} steps over {} episode(s))",
        report.outcome, report.steps_done, report.episodes
    );
}
