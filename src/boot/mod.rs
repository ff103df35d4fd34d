// Copyright 2026 The vrboot Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Boot orchestration
//!
//! Drives the appliance through a strictly linear sequence of phases. Each
//! phase either completes or aborts the whole boot; there is no retry
//! across phases (waiting phases retry internally, bounded by their gate).
//!
//! Everything that touches the host goes through the `Appliance` trait.

use anyhow::{Context, Result};
use slog_scope::{info, warn};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::bootstrap::{channel, BootstrapDocument};
use crate::network::NicInventory;
use crate::readiness::{probes, Gate};
use crate::synth;
use crate::vyos::{ConfigTree, DirectiveBatch};

mod system;
pub use self::system::SystemAppliance;

#[cfg(test)]
mod tests;

/// Host side effects needed during boot.
pub trait Appliance {
    /// Whether the packet filter can be driven yet.
    fn firewall_ready(&self) -> Result<bool>;
    /// Ethernet links currently on the host.
    fn nic_inventory(&self) -> Result<NicInventory>;
    /// Active configuration tree.
    fn live_config(&self) -> Result<ConfigTree>;
    /// Apply a batch as a single transaction.
    fn apply(&self, batch: &DirectiveBatch) -> Result<()>;
    /// Announce `ip` on `nic` towards `gateway`.
    fn announce(&self, nic: &str, ip: IpAddr, gateway: IpAddr) -> Result<()>;
    /// Restart the control-plane agent.
    fn restart_agent(&self) -> Result<()>;
}

/// Boot phases, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    WaitFirewall,
    WaitChannel,
    DocumentParsed,
    ConfigSynthesized,
    ConfigApplied,
    Announced,
    ServiceRestarted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Phase::WaitFirewall => "wait-firewall",
            Phase::WaitChannel => "wait-channel",
            Phase::DocumentParsed => "document-parsed",
            Phase::ConfigSynthesized => "config-synthesized",
            Phase::ConfigApplied => "config-applied",
            Phase::Announced => "announced",
            Phase::ServiceRestarted => "service-restarted",
        };
        f.write_str(name)
    }
}

/// Fixed locations and timings of a boot run.
#[derive(Clone, Debug)]
pub struct BootConfig {
    /// Virtio serial port carrying the bootstrap document.
    pub virtio_port: PathBuf,
    /// Where the raw bootstrap document is cached.
    pub cache_path: PathBuf,
    pub firewall_gate: Gate,
    pub port_gate: Gate,
    pub payload_gate: Gate,
}

impl Default for BootConfig {
    fn default() -> Self {
        BootConfig {
            virtio_port: PathBuf::from("/dev/virtio-ports/applianceVm.vport"),
            cache_path: PathBuf::from("/home/vyos/zvr/bootstrap-info.json"),
            firewall_gate: Gate::default(),
            port_gate: Gate::default(),
            payload_gate: Gate::new(Duration::from_secs(300), Duration::from_secs(1)),
        }
    }
}

/// Linear boot state machine.
#[derive(Debug)]
pub struct Orchestrator<A: Appliance> {
    config: BootConfig,
    appliance: A,
    phase: Phase,
}

impl<A: Appliance> Orchestrator<A> {
    pub fn new(config: BootConfig, appliance: A) -> Self {
        Orchestrator {
            config,
            appliance,
            phase: Phase::WaitFirewall,
        }
    }

    /// Current phase; on failure, the phase that did not complete.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run every phase to completion, or fail at the first error.
    pub fn run(&mut self) -> Result<()> {
        self.run_phases()
            .with_context(|| format!("boot failed in phase '{}'", self.phase))
    }

    fn run_phases(&mut self) -> Result<()> {
        let appliance = &self.appliance;
        self.config
            .firewall_gate
            .wait("firewall service", || appliance.firewall_ready())?;
        self.advance(Phase::WaitChannel);

        let port = &self.config.virtio_port;
        self.config
            .port_gate
            .wait("virtio port", || probes::path_present(port))?;
        let doc = channel::read_bootstrap(
            &self.config.payload_gate,
            &self.config.virtio_port,
            &self.config.cache_path,
        )?;
        self.advance(Phase::DocumentParsed);

        let nics = self.appliance.nic_inventory()?;
        if nics.is_empty() {
            warn!("no ethernet link found on the host");
        }
        let live = self.appliance.live_config()?;
        let batch = synth::synthesize(&doc, &nics, &live)?;
        info!(
            "synthesized {} directives ({} sets, {} deletions)",
            batch.len(),
            batch.sets().count(),
            batch.deletes().count()
        );
        self.advance(Phase::ConfigSynthesized);

        self.appliance.apply(&batch)?;
        self.advance(Phase::ConfigApplied);

        self.announce(&doc)?;
        self.advance(Phase::Announced);

        self.appliance.restart_agent()?;
        self.advance(Phase::ServiceRestarted);

        info!("successfully configured the system and restarted the control-plane agent");
        Ok(())
    }

    fn advance(&mut self, next: Phase) {
        info!("boot phase: {} -> {}", self.phase, next);
        self.phase = next;
    }

    /// Best-effort gratuitous ARP for each configured NIC.
    ///
    /// Links are scanned again, since applying the batch may have renamed or
    /// reset them.
    fn announce(&self, doc: &BootstrapDocument) -> Result<()> {
        let nics = match self.appliance.nic_inventory() {
            Ok(nics) => nics,
            Err(e) => {
                warn!("not announcing addresses: {:#}", e);
                return Ok(());
            }
        };
        for nic in synth::resolve_nics(doc, &nics)? {
            let gateway = match nic.spec.gateway {
                Some(gw) => gw,
                None => {
                    warn!("{} has no gateway, not announcing {}", nic.name, nic.spec.ip);
                    continue;
                }
            };
            if let Err(e) = self.appliance.announce(nic.name, nic.spec.ip, gateway) {
                warn!("{:#}", e);
            }
        }
        Ok(())
    }
}
