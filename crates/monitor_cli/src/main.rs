//! `task-monitor`: command line front end for the job monitoring API.

mod app;
mod args;
mod commands;
mod render;

use std::process::ExitCode;

use clap::Parser;
use monitor_client::ApiError;
use monitor_logging::monitor_debug;

use crate::args::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    monitor_logging::initialize(cli.log_destination(), cli.log_level.into());

    match commands::run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

fn report(err: &anyhow::Error) -> ExitCode {
    eprintln!("Error: {err:#}");
    let Some(api) = err.downcast_ref::<ApiError>() else {
        return ExitCode::FAILURE;
    };
    if let Some(details) = api.details() {
        monitor_debug!("Server error body: {}", details);
    }
    match api {
        ApiError::NotAuthenticated => {
            eprintln!("Run `task-monitor login` first.");
            ExitCode::from(2)
        }
        ApiError::SessionExpired | ApiError::InvalidCredentials { .. } => ExitCode::from(2),
        ApiError::RequestExpired => {
            eprintln!("The session changed while the request was in flight; run the command again.");
            ExitCode::FAILURE
        }
        _ => ExitCode::FAILURE,
    }
}
