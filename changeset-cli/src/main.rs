//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use std::process::ExitCode;

use changeset_cli::{CliError, FAILURE_EXIT_CODE};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_logging();
    match changeset_cli::run() {
        Ok(status) => ExitCode::from(status.exit_code()),
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            eprintln!("changeset-mirror: {err}");
            ExitCode::from(FAILURE_EXIT_CODE)
        }
    }
}

/// Install the fmt subscriber; `RUST_LOG` overrides the `info` default.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("changeset-mirror: logging unavailable: {err}");
    }
}
