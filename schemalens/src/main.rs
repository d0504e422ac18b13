//! Relational schema inspection tool.
//!
//! Connects to a database read-only, normalizes its table catalog and prints
//! the table list, the foreign-key graph or an integrity report as JSON.

use clap::Parser;
use schemalens::{Cli, execute, is_verification_timeout};
use schemalens_core::{EngineConnectorFactory, init_logging};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_format) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match execute(&cli.command, Arc::new(EngineConnectorFactory)).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if is_verification_timeout(&e) {
                // a timed-out check may still occupy a blocking thread
                std::process::exit(1);
            }
            ExitCode::FAILURE
        }
    }
}
