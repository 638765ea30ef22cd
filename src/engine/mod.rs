// src/engine/mod.rs

//! Pausable task engine.
//!
//! This module ties together:
//! - the pause/resume request counters ([`counters`])
//! - the suspension token handed to every episode ([`token`])
//! - the pure core state machine ([`core`])
//! - the episode loop that drives a task ([`driver`])
//! - the public, thread-safe API ([`task`])
//!
//! The pure core lives in [`core`]; the async shell around it is split
//! between [`task`] (callers) and [`driver`] (the single driver).

pub mod core;
pub mod counters;
pub(crate) mod driver;
pub mod listeners;
pub mod operation;
pub mod state;
pub mod task;
pub mod token;

pub use self::core::{DrainStep, Interruption, PauseDecision, TaskCore, TaskSnapshot};
pub use counters::PauseRequestCounter;
pub use listeners::ListenerId;
pub use operation::{BoxFuture, EpisodeError, OperationFn, PausableOperation, operation_fn};
pub use state::{
    PauseRequest, PauseState, PauseStatus, PausedStateChanged, TaskOutcome, TaskState,
};
pub use task::PausableTask;
pub use token::SuspensionToken;
