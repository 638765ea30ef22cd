// src/activity/host.rs

//! Pluggable activity host abstraction.
//!
//! The pausable task engine talks to an `ActivityHost` instead of spawning
//! its driver directly. This makes it easy to swap in a host that, for
//! example, records started units or runs them on a dedicated runtime.
//!
//! - `TokioActivityHost` is the default implementation. It spawns every unit
//!   on the current Tokio runtime with the unit's [`Activity`] made ambient,
//!   and mirrors the unit's outcome onto the activity.

use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::activity::Activity;
use crate::engine::{BoxFuture, TaskOutcome};

/// Builds the work of a unit once its [`Activity`] exists.
///
/// The host calls this before scheduling anything, so the caller can
/// register itself with the activity first.
pub type UnitWork = Box<dyn FnOnce(Activity) -> BoxFuture<'static, TaskOutcome> + Send>;

/// Trait abstracting where units of work run.
pub trait ActivityHost: Send + Sync {
    /// Start `work` as a new schedulable unit and return its handle.
    ///
    /// The handle's completion mirrors the outcome produced by `work`.
    fn start_unit(
        &self,
        name: &str,
        cancellation: Option<CancellationToken>,
        work: UnitWork,
    ) -> Activity;

    /// The ambient unit of work, if the caller is running inside one.
    fn try_get_current_unit(&self) -> Option<Activity> {
        Activity::current()
    }
}

/// Production host: one Tokio task per unit of work.
///
/// Keeps every started activity so dashboards can enumerate them.
#[derive(Debug, Clone, Default)]
pub struct TokioActivityHost {
    started: Arc<Mutex<Vec<Activity>>>,
}

impl TokioActivityHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activities started by this host that have not completed yet.
    pub fn running(&self) -> Vec<Activity> {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|activity| !activity.is_completed())
            .cloned()
            .collect()
    }

    /// Activities that currently expose a pausable task.
    pub fn pausable(&self) -> Vec<Activity> {
        self.running()
            .into_iter()
            .filter(Activity::is_pausable)
            .collect()
    }
}

impl ActivityHost for TokioActivityHost {
    fn start_unit(
        &self,
        name: &str,
        cancellation: Option<CancellationToken>,
        work: UnitWork,
    ) -> Activity {
        let activity = Activity::new(name, cancellation);
        let fut = work(activity.clone());

        {
            let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
            started.retain(|existing| !existing.is_completed());
            started.push(activity.clone());
        }

        let scoped = activity.clone();
        tokio::spawn(async move {
            info!(activity = %scoped.name(), id = scoped.id(), "unit of work started");
            let outcome = scoped.clone().scope(fut).await;
            debug!(activity = %scoped.name(), %outcome, "unit of work finished");
            scoped.complete(outcome);
        });

        activity
    }
}
