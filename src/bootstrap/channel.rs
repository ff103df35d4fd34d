//! Bootstrap channel reader.
//!
//! The hypervisor writes the bootstrap document to a virtio serial port;
//! the port may show up late, and may stay empty for a while after it
//! shows up.

use anyhow::{Context, Result};
use slog_scope::{debug, info};
use std::fs;
use std::path::Path;

use super::{BootstrapDocument, RawBootstrap};
use crate::readiness::Gate;
use crate::util;

/// Mode of the cached payload; the control-plane agent reads it as another user.
const CACHE_MODE: u32 = 0o777;

/// Wait for a non-empty payload on `port`, decode it, and cache it verbatim.
///
/// An empty port is polled again; a populated port holding garbage is a
/// hard failure. Any payload that is valid JSON is cached before its fields
/// are checked.
pub fn read_bootstrap(gate: &Gate, port: &Path, cache: &Path) -> Result<BootstrapDocument> {
    let mut document = None;

    gate.wait("bootstrap info", || {
        let content = fs::read(port)
            .with_context(|| format!("failed to read '{}'", port.display()))?;
        if content.is_empty() {
            debug!(
                "no content in {}, it may not be ready, waiting",
                port.display()
            );
            return Ok(false);
        }

        let raw = RawBootstrap::decode(&content)?;
        util::write_file_with_mode(cache, &content, CACHE_MODE)
            .context("failed to cache bootstrap info")?;
        debug!("received bootstrap info:\n{}", String::from_utf8_lossy(&content));

        let doc = raw
            .validate()
            .with_context(|| format!("invalid bootstrap info cached at {}", cache.display()))?;
        document = Some(doc);
        Ok(true)
    })?;

    info!("bootstrap info cached at {}", cache.display());
    document.context("bootstrap info vanished after being read")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    static PAYLOAD: &str = r#"{
        "publicKey": "ssh-rsa AAAA admin@mgmt",
        "managementNic": {"mac": "52:54:00:11:11:11", "ip": "192.168.1.10", "netmask": "255.255.255.0"},
        "sshPort": 22
    }"#;

    fn quick_gate() -> Gate {
        Gate::new(Duration::from_millis(200), Duration::from_millis(10))
    }

    #[test]
    fn test_read_and_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let port = tmp.path().join("applianceVm.vport");
        let cache = tmp.path().join("zvr").join("bootstrap-info.json");
        fs::write(&port, PAYLOAD).unwrap();

        let doc = read_bootstrap(&quick_gate(), &port, &cache).unwrap();
        assert_eq!(doc.ssh_port, 22);
        assert_eq!(doc.public_key.id, "admin@mgmt");

        assert_eq!(fs::read_to_string(&cache).unwrap(), PAYLOAD);
        let mode = fs::metadata(&cache).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, CACHE_MODE);
    }

    #[test]
    fn test_empty_port_times_out() {
        let tmp = tempfile::tempdir().unwrap();
        let port = tmp.path().join("applianceVm.vport");
        let cache = tmp.path().join("bootstrap-info.json");
        fs::write(&port, b"").unwrap();

        let err = read_bootstrap(&quick_gate(), &port, &cache).unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
        assert!(!cache.exists());
    }

    #[test]
    fn test_garbage_fails_fast() {
        let tmp = tempfile::tempdir().unwrap();
        let port = tmp.path().join("applianceVm.vport");
        let cache = tmp.path().join("bootstrap-info.json");
        fs::write(&port, b"{ this is not json").unwrap();

        let gate = Gate::new(Duration::from_secs(30), Duration::from_millis(10));
        let start = std::time::Instant::now();
        let err = read_bootstrap(&gate, &port, &cache).unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(format!("{err:#}").contains("unable to JSON parse"), "{err:#}");
        assert!(!cache.exists());
    }

    #[test]
    fn test_invalid_fields_still_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let port = tmp.path().join("applianceVm.vport");
        let cache = tmp.path().join("bootstrap-info.json");
        let payload = PAYLOAD.replace(r#""sshPort": 22"#, r#""sshPortX": 22"#);
        fs::write(&port, &payload).unwrap();

        let err = read_bootstrap(&quick_gate(), &port, &cache).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("sshPort"), "{msg}");
        assert!(msg.contains(&cache.display().to_string()), "{msg}");
        assert_eq!(fs::read_to_string(&cache).unwrap(), payload);
    }

    #[test]
    fn test_payload_arrives_late() {
        let tmp = tempfile::tempdir().unwrap();
        let port = tmp.path().join("applianceVm.vport");
        let cache = tmp.path().join("bootstrap-info.json");
        fs::write(&port, b"").unwrap();

        let writer = {
            let port = port.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                // Swap the whole file in, so no poll sees a partial write.
                let staged = port.with_extension("staged");
                fs::write(&staged, PAYLOAD).unwrap();
                fs::rename(&staged, &port).unwrap();
            })
        };

        let gate = Gate::new(Duration::from_secs(10), Duration::from_millis(10));
        let doc = read_bootstrap(&gate, &port, &cache).unwrap();
        writer.join().unwrap();

        assert_eq!(doc.ssh_port, 22);
        assert_eq!(fs::read_to_string(&cache).unwrap(), PAYLOAD);
    }

    #[test]
    fn test_missing_port_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let port = tmp.path().join("missing.vport");
        let cache = tmp.path().join("bootstrap-info.json");

        read_bootstrap(&quick_gate(), &port, &cache).unwrap_err();
    }
}
