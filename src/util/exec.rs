//! Helpers for shelling out to external commands.

use anyhow::{bail, Context, Result};
use slog_scope::trace;
use std::process::Command;

/// Try to execute, and report stderr on failure.
pub(crate) fn try_exec(cmd: Command) -> Result<()> {
    try_exec_output(cmd).map(|_| ())
}

/// Try to execute, returning stdout on success and stderr on failure.
pub(crate) fn try_exec_output(cmd: Command) -> Result<String> {
    let mut cmd = cmd;
    trace!("{:?}", &cmd);

    let output = cmd
        .output()
        .with_context(|| format!("failed to spawn {:?}", cmd.get_program()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "{:?} exited with {}: {}",
            cmd.get_program(),
            output.status,
            stderr.trim()
        );
    };

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
