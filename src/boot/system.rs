//! The real appliance.

use anyhow::{Context, Result};
use std::net::IpAddr;
use std::process::Command;

use super::Appliance;
use crate::network::{announce, NicInventory};
use crate::readiness::probes;
use crate::util;
use crate::vyos::{ConfigTree, DirectiveBatch, ScriptRunner};

const IPTABLES_SAVE: &str = "/sbin/iptables-save";
const SHOW_CONFIG: &str = "/bin/cli-shell-api";
const SHOW_CONFIG_ARGS: &[&str] = &["showConfig", "--show-active-only"];
const VBASH: &str = "/bin/vbash";
const CONFIG_USER: &str = "vyos";
const AGENT_INIT_SCRIPT: &str = "/etc/init.d/zstack-virtualrouteragent";

#[derive(Debug)]
pub struct SystemAppliance {
    runner: ScriptRunner,
}

impl SystemAppliance {
    pub fn new() -> Self {
        SystemAppliance {
            runner: ScriptRunner::new(VBASH, CONFIG_USER),
        }
    }
}

impl Default for SystemAppliance {
    fn default() -> Self {
        Self::new()
    }
}

impl Appliance for SystemAppliance {
    fn firewall_ready(&self) -> Result<bool> {
        probes::command_succeeds(Command::new(IPTABLES_SAVE))
    }

    fn nic_inventory(&self) -> Result<NicInventory> {
        NicInventory::from_host()
    }

    fn live_config(&self) -> Result<ConfigTree> {
        ConfigTree::from_system(SHOW_CONFIG, SHOW_CONFIG_ARGS)
    }

    fn apply(&self, batch: &DirectiveBatch) -> Result<()> {
        self.runner.apply(batch)
    }

    fn announce(&self, nic: &str, ip: IpAddr, gateway: IpAddr) -> Result<()> {
        announce::arping(nic, ip, gateway)
    }

    fn restart_agent(&self) -> Result<()> {
        let mut cmd = Command::new(AGENT_INIT_SCRIPT);
        cmd.arg("restart");
        util::try_exec(cmd).context("failed to restart the control-plane agent")
    }
}
