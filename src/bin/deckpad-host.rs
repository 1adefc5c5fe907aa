//! Hook host entry point: `deckpad-host --hook-host <parent-pid>`.
//!
//! Spawned by the input detector. Exits 0 when asked to stop or when the
//! parent disappears, 1 on a runtime failure and 2 on bad arguments.

use deckpad::{ExitReason, HostArgs, run_host};
use log::{error, info};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = match HostArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            error!("{}", e);
            eprintln!("usage: deckpad-host --hook-host <parent-pid>");
            return ExitCode::from(2);
        }
    };

    match run_host(&args) {
        Ok(ExitReason::ShutdownRequested) => {
            info!("stopped by parent {}", args.parent_pid);
            ExitCode::SUCCESS
        }
        Ok(ExitReason::ParentExited) => {
            info!("parent {} exited", args.parent_pid);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
