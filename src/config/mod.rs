// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`): task options and
//!   scripted scenarios for the CLI.
//! - Load a scenario file from disk or a string (`loader.rs`).
//! - Validate scenario invariants (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_scenario_path, load_and_validate, load_from_path, load_from_str};
pub use model::{
    RawScenarioFile, ScenarioAction, ScenarioFile, ScenarioTask, TaskOptions,
};
