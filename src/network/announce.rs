//! Gratuitous ARP announcements.

use anyhow::{Context, Result};
use std::net::IpAddr;
use std::process::Command;

use crate::util;

/// Build the `arping` invocation announcing `ip` on `nic`, towards `gateway`.
pub(crate) fn arping_command(nic: &str, ip: IpAddr, gateway: IpAddr) -> Command {
    let mut cmd = Command::new("arping");
    cmd.args(["-A", "-U", "-c", "1"])
        .args(["-I", nic])
        .arg("-s")
        .arg(ip.to_string())
        .arg(gateway.to_string());
    cmd
}

/// Broadcast one unsolicited ARP reply binding `ip` to the MAC of `nic`.
pub(crate) fn arping(nic: &str, ip: IpAddr, gateway: IpAddr) -> Result<()> {
    util::try_exec(arping_command(nic, ip, gateway))
        .with_context(|| format!("failed to announce {ip} on {nic}"))
}
