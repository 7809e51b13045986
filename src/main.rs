//! Main entry point for the chunkzip CLI app

use std::process::ExitCode;

use chunkzip::{cli, cli_runner};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // Initialize logging; stdout is reserved for the report.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let command = match cli::run() {
        Ok(command) => command,
        Err(e) => e.exit(),
    };

    match cli_runner::run_command(&command) {
        Ok(status) => status.exit_code(),
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", cli_runner::version_banner());
            ExitCode::FAILURE
        }
    }
}
