// src/scenario/mod.rs

//! Scripted demo driver used by the `pausable-task` binary.
//!
//! - [`counting`] is a demo [`PausableOperation`](crate::engine::PausableOperation)
//!   that performs a fixed number of timed steps and keeps its progress
//!   across episodes.
//! - [`runner`] starts it on the Tokio activity host and applies the
//!   scenario's actions at their offsets.

pub mod counting;
pub mod runner;

pub use counting::CountingOperation;
pub use runner::{ScenarioReport, run_scenario};
