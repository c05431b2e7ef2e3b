//! OS tool invocation.
//!
//! Adapters drive their hosting surfaces through each product's admin tool
//! (`sc.exe`, `appcmd.exe`, `pg_ctl`, `netsh`, ...). This module wraps
//! spawning those tools and capturing their output.

use crate::{Error, Result};
use async_process::Command;
use std::ffi::OsStr;
use std::path::Path;
use tracing::debug;

/// Captured output of one tool invocation
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Whether the tool exited with status zero
    pub success: bool,
    /// Exit code, if the tool exited normally
    pub code: Option<i32>,
    /// Captured stdout, lossily decoded
    pub stdout: String,
    /// Captured stderr, lossily decoded
    pub stderr: String,
}

impl ToolOutput {
    /// stdout if non-empty, stderr otherwise
    pub fn text(&self) -> &str {
        if self.stdout.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// Run a tool to completion and capture its output.
///
/// A tool that cannot be spawned at all (missing binary, permission) is an
/// [`Error::Tool`]; a tool that runs and exits non-zero is a successful call
/// with `success == false`. Adapters map the former to `Unknown` and the
/// latter to a definite state.
pub async fn run_tool<S>(program: impl AsRef<Path>, args: impl IntoIterator<Item = S>) -> Result<ToolOutput>
where
    S: AsRef<OsStr>,
{
    let program = program.as_ref();
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| Error::Tool {
            tool: program.display().to_string(),
            message: e.to_string(),
        })?;

    let result = ToolOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    debug!(
        tool = %program.display(),
        success = result.success,
        code = ?result.code,
        "tool finished"
    );

    Ok(result)
}

/// Spawn a tool detached, without waiting for it to exit.
///
/// Used for components whose main file is itself the long-running process.
pub fn spawn_detached<S>(program: impl AsRef<Path>, args: impl IntoIterator<Item = S>) -> Result<()>
where
    S: AsRef<OsStr>,
{
    let program = program.as_ref();
    Command::new(program)
        .args(args)
        .spawn()
        .map_err(|e| Error::Tool {
            tool: program.display().to_string(),
            message: e.to_string(),
        })?;
    Ok(())
}
