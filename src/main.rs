// src/main.rs

use std::process::ExitCode;

use pausable_task::{cli, logging, run};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("pausable-task: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "scenario run failed");
            eprintln!("pausable-task: {err:#}");
            ExitCode::FAILURE
        }
    }
}
