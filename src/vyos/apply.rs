//! Submit a directive batch to the configuration engine.
//!
//! The batch is rendered into a single vbash script wrapped in a
//! configuration session: if any directive is rejected the script stops
//! before `commit`, and the session is torn down without applying
//! anything.

use anyhow::{anyhow, bail, Context, Result};
use slog_scope::{debug, info};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;
use users::os::unix::UserExt;

use super::directive::DirectiveBatch;
use crate::util;

const CFG_WRAPPER: &str = "/opt/vyatta/sbin/vyatta-cfg-cmd-wrapper";

/// Render the configuration script for `batch`.
pub fn render_script(batch: &DirectiveBatch) -> String {
    let mut script = String::new();
    script.push_str("#!/bin/vbash\n");
    script.push_str("set -e\n");
    for (var, verb) in [
        ("SET", "set"),
        ("DELETE", "delete"),
        ("COMMIT", "commit"),
        ("SAVE", "save"),
        ("BEGIN", "begin"),
        ("END", "end"),
    ] {
        script.push_str(&format!("{var}=\"{CFG_WRAPPER} {verb}\"\n"));
    }
    script.push_str("trap '$END' EXIT\n");
    script.push_str("$BEGIN\n");
    for directive in batch.iter() {
        script.push_str(&format!("{directive}\n"));
    }
    script.push_str("$COMMIT\n");
    script.push_str("$SAVE\n");
    script
}

/// Runs configuration scripts as the configuration engine's user.
#[derive(Clone, Debug)]
pub struct ScriptRunner {
    shell: PathBuf,
    user: String,
}

impl ScriptRunner {
    pub fn new(shell: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        ScriptRunner {
            shell: shell.into(),
            user: user.into(),
        }
    }

    /// Apply `batch` as one transaction.
    pub fn apply(&self, batch: &DirectiveBatch) -> Result<()> {
        if batch.is_empty() {
            bail!("refusing to apply an empty configuration batch");
        }

        let user = users::get_user_by_name(&self.user)
            .ok_or_else(|| anyhow!("unknown user '{}'", self.user))?;

        let script = render_script(batch);
        debug!("configuration script:\n{}", script);

        let mut file = tempfile::Builder::new()
            .prefix("vrboot-")
            .suffix(".sh")
            .tempfile()
            .context("failed to create temporary script")?;
        file.write_all(script.as_bytes())
            .context("failed to write temporary script")?;
        file.flush().context("failed to write temporary script")?;
        // The script runs as another user.
        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o755))
            .context("failed to make temporary script readable")?;

        let mut cmd = Command::new(&self.shell);
        cmd.arg(file.path())
            .uid(user.uid())
            .gid(user.primary_group_id())
            .env("HOME", user.home_dir())
            .env("USER", &self.user);

        info!(
            "applying {} configuration directives as user '{}'",
            batch.len(),
            self.user
        );
        util::try_exec(cmd).context("configuration script failed")
    }
}
