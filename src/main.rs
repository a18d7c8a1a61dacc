mod cli;
mod commands;
mod config;
mod error;
mod interrupt;
mod model;
mod report;
mod util;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::error::{EXIT_OK, EXIT_UNCLASSIFIED, LoadError, exit_code_for};
use crate::interrupt::{CancelFlag, install_ctrl_c_handler};
use crate::report::{ConsoleReporter, Reporter};

fn main() -> ExitCode {
    init_tracing();
    let reporter = ConsoleReporter;

    match run(&reporter) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            let code = exit_code_for(&err);
            if code == EXIT_UNCLASSIFIED {
                reporter.error(&format!("Unexpected error: {err:#}"));
            } else {
                reporter.error(&err.to_string());
            }
            if let Some(load_error) = err.downcast_ref::<LoadError>() {
                for line in load_error.remediation() {
                    reporter.error(&line);
                }
            }
            for cause in err.chain().skip(1) {
                debug!(cause = %cause, "caused by");
            }
            ExitCode::from(code)
        }
    }
}

fn run(reporter: &dyn Reporter) -> Result<u8> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Load(args) => {
            let cancel = CancelFlag::new();
            install_ctrl_c_handler(cancel.clone())?;
            commands::load::run(args, reporter, &cancel)
        }
        Commands::InitSchema(args) => {
            commands::init_schema::run(args, reporter)?;
            Ok(EXIT_OK)
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
