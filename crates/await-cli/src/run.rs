//! Wait for every target, then hand off to the command.

use std::ffi::OsString;

use anyhow::Result;
use await_probe::{Launcher, Orchestrator};
use tracing::info;

use crate::cli::Cli;

/// Run one wait.
///
/// Configuration errors abort before any probe starts. A timeout aborts
/// without launching. With no command, success simply returns.
pub async fn run<L: Launcher>(cli: &Cli, launcher: &L, env: &[(OsString, OsString)]) -> Result<()> {
    let config = cli.wait_config()?;

    let orchestrator = Orchestrator::from_config(&config)?;
    orchestrator.wait().await.into_result(config.timeout)?;

    match cli.command.split_first() {
        Some((command, args)) => launcher.launch(command, args, env)?,
        None => info!("no command given, exiting"),
    }
    Ok(())
}
