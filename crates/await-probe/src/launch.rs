//! Handoff to the target command once every dependency is ready.
//!
//! The environment is passed explicitly so callers decide what the
//! command inherits.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use crate::error::{AwaitError, AwaitResult};

/// Launches the command that runs after a successful wait.
pub trait Launcher {
    /// Launch `command` with `args` and exactly the variables in `env`.
    ///
    /// Implementations that replace the current process only return on
    /// failure.
    fn launch(&self, command: &str, args: &[String], env: &[(OsString, OsString)]) -> AwaitResult<()>;
}

/// Replaces the current process image with the command (`execve`).
///
/// On platforms without `exec` the command runs as a child and the
/// process exits with its status.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecLauncher;

impl Launcher for ExecLauncher {
    fn launch(&self, command: &str, args: &[String], env: &[(OsString, OsString)]) -> AwaitResult<()> {
        let program = resolve_program(command, env)?;
        info!(command, path = %program.display(), "launching command");

        let mut cmd = Command::new(&program);
        cmd.args(args).env_clear().envs(env.iter().map(|(k, v)| (k, v)));
        exec(cmd, command)
    }
}

#[cfg(unix)]
fn exec(mut cmd: Command, command: &str) -> AwaitResult<()> {
    use std::os::unix::process::CommandExt;

    let source = cmd.arg0(command).exec();
    Err(AwaitError::Launch {
        command: command.to_string(),
        source,
    })
}

#[cfg(not(unix))]
fn exec(mut cmd: Command, command: &str) -> AwaitResult<()> {
    let status = cmd.status().map_err(|source| AwaitError::Launch {
        command: command.to_string(),
        source,
    })?;
    std::process::exit(status.code().unwrap_or(1));
}

/// Locate `command` the way a shell would.
///
/// Names containing a path separator are used as given; bare names are
/// searched in the `PATH` entry of `env`.
pub fn resolve_program(command: &str, env: &[(OsString, OsString)]) -> AwaitResult<PathBuf> {
    if command.is_empty() {
        return Err(AwaitError::CommandNotFound(command.to_string()));
    }

    if command.contains(std::path::MAIN_SEPARATOR) || command.contains('/') {
        let path = PathBuf::from(command);
        return if is_executable(&path) {
            Ok(path)
        } else {
            Err(AwaitError::CommandNotFound(command.to_string()))
        };
    }

    let search_path = env
        .iter()
        .find(|(key, _)| key.as_os_str() == OsStr::new("PATH"))
        .map(|(_, value)| value.clone())
        .unwrap_or_default();

    std::env::split_paths(&search_path)
        .map(|dir| dir.join(command))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(|| AwaitError::CommandNotFound(command.to_string()))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
