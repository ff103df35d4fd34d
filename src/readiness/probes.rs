//! Concrete readiness predicates.

use anyhow::{Context, Result};
use slog_scope::debug;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;

use crate::util;

/// Report whether `cmd` runs to a successful exit.
///
/// Both spawn failures and non-zero exits count as "not ready yet".
pub fn command_succeeds(cmd: Command) -> Result<bool> {
    let program = cmd.get_program().to_os_string();
    match util::try_exec(cmd) {
        Ok(()) => Ok(true),
        Err(e) => {
            debug!("{:?} seems not ready: {:#}", program, e);
            Ok(false)
        }
    }
}

/// Report whether `path` exists.
///
/// Only "not found" is transient; any other error (e.g. permissions) is
/// returned as-is.
pub fn path_present(path: &Path) -> Result<bool> {
    match path.metadata() {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("{} doesn't exist yet, waiting", path.display());
            Ok(false)
        }
        Err(e) => Err(e).with_context(|| format!("failed to stat '{}'", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_succeeds() {
        assert!(command_succeeds(Command::new("true")).unwrap());
        assert!(!command_succeeds(Command::new("false")).unwrap());
        assert!(!command_succeeds(Command::new("/nonexistent/iptables-save")).unwrap());
    }

    #[test]
    fn test_path_present() {
        let tmp = tempfile::tempdir().unwrap();
        let port = tmp.path().join("applianceVm.vport");

        assert!(!path_present(&port).unwrap());
        std::fs::write(&port, b"").unwrap();
        assert!(path_present(&port).unwrap());
    }
}
