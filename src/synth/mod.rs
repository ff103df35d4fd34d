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

//! Directive synthesis
//!
//! Turns a bootstrap document, the host NIC inventory and the live
//! configuration into the ordered batch of directives that brings the
//! appliance to the requested state. This is a pure transformation: the
//! same inputs always produce the same batch.
//!
//! Any interface, service or setting that already has configuration is
//! deleted first, so that the following `SET`s fully redefine it.

use anyhow::{anyhow, bail, Result};
use slog_scope::warn;
use std::net::IpAddr;

use crate::bootstrap::{BootstrapDocument, NicSpec, SshPublicKey};
use crate::network::{NicInventory, PRIMARY_NIC};
use crate::vyos::{ConfigTree, DirectiveBatch};


/// User owning the bootstrap SSH key.
const LOGIN_USER: &str = "vyos";
/// Rule set shared by all links as a catch-all.
const DEFAULT_RULESET: &str = "default";
/// Rule set allowing SSH, bound to the management link.
const SSH_ON_RULESET: &str = "sshon";
/// Rule set rejecting SSH, bound to every other link.
const SSH_OFF_RULESET: &str = "sshoff";

/// A bootstrap NIC together with the host link it resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedNic<'a> {
    pub name: &'a str,
    pub spec: &'a NicSpec,
}

/// Resolve every bootstrap NIC to a host link, management NIC first.
///
/// The management NIC must be the primary link, and no two bootstrap NICs
/// may resolve to the same link.
pub fn resolve_nics<'a>(
    doc: &'a BootstrapDocument,
    nics: &'a NicInventory,
) -> Result<Vec<ResolvedNic<'a>>> {
    let mut resolved: Vec<ResolvedNic<'a>> = vec![];

    for (index, spec) in doc.nics().enumerate() {
        let is_management = index == 0;
        let nic = nics.by_mac(&spec.mac)?.ok_or_else(|| {
            if is_management {
                anyhow!("cannot find the management nic[mac:{}]", spec.mac)
            } else {
                anyhow!("the nic with mac[{}] is not found in the system", spec.mac)
            }
        })?;
        if is_management && nic.name != PRIMARY_NIC {
            bail!("the management nic is not {} but {}", PRIMARY_NIC, nic.name);
        }
        if let Some(other) = resolved.iter().find(|r| r.name == nic.name) {
            bail!(
                "nic[mac:{}] and nic[mac:{}] both resolve to {}",
                other.spec.mac,
                spec.mac,
                nic.name
            );
        }
        resolved.push(ResolvedNic {
            name: &nic.name,
            spec,
        });
    }

    Ok(resolved)
}

/// Build the configuration batch for this boot.
pub fn synthesize(
    doc: &BootstrapDocument,
    nics: &NicInventory,
    live: &ConfigTree,
) -> Result<DirectiveBatch> {
    let mut batch = DirectiveBatch::new();

    ssh_key(&mut batch, &doc.public_key);

    let resolved = resolve_nics(doc, nics)?;
    for nic in &resolved {
        interface(&mut batch, live, nic)?;
    }

    default_route(&mut batch, live, &resolved);
    ssh_service(&mut batch, live, doc.ssh_port);
    firewall(&mut batch, nics, doc.ssh_port);

    Ok(batch)
}

fn ssh_key(batch: &mut DirectiveBatch, key: &SshPublicKey) {
    let prefix = format!(
        "system login user {} authentication public-keys {}",
        LOGIN_USER, key.id
    );
    batch.set(format!("{} key {}", prefix, key.key));
    batch.set(format!("{} type {}", prefix, key.key_type));
}

fn interface(batch: &mut DirectiveBatch, live: &ConfigTree, nic: &ResolvedNic) -> Result<()> {
    let cidr = nic.spec.cidr()?;
    let path = format!("interfaces ethernet {}", nic.name);

    batch.delete_existing(live, &path);
    batch.set(format!("{path} address {cidr}"));
    batch.set(format!("{path} duplex auto"));
    batch.set(format!("{path} smp_affinity auto"));
    batch.set(format!("{path} speed auto"));
    Ok(())
}

fn default_route(batch: &mut DirectiveBatch, live: &ConfigTree, nics: &[ResolvedNic]) {
    let mut flagged = nics.iter().filter(|n| n.spec.default_route);
    let gateway: Option<IpAddr> = flagged.find_map(|n| match n.spec.gateway {
        Some(gw) => Some(gw),
        None => {
            warn!(
                "{} is flagged as default route but has no gateway, skipping",
                n.name
            );
            None
        }
    });

    if let Some(gw) = gateway {
        batch.delete_existing(live, "system gateway-address");
        batch.set(format!("system gateway-address {gw}"));
    }
}

fn ssh_service(batch: &mut DirectiveBatch, live: &ConfigTree, port: u16) {
    batch.delete_existing(live, "service ssh");
    batch.set(format!("service ssh port {port}"));
}

/// Rule sets accepting established/related traffic and ICMP.
fn baseline_rules(batch: &mut DirectiveBatch, nic: &str, suffix: &str, direction: &str) {
    let ruleset = format!("{nic}.{suffix}");
    let prefix = format!("firewall name {ruleset}");

    batch.set(format!("{prefix} default-action reject"));
    batch.set(format!("{prefix} rule 1 action accept"));
    batch.set(format!("{prefix} rule 1 state established enable"));
    batch.set(format!("{prefix} rule 1 state related enable"));
    batch.set(format!("{prefix} rule 2 action accept"));
    batch.set(format!("{prefix} rule 2 protocol icmp"));
    batch.set(format!(
        "interfaces ethernet {nic} firewall {direction} name {ruleset}"
    ));
}

fn ssh_ruleset(batch: &mut DirectiveBatch, ruleset: &str, port: u16, action: &str) {
    let prefix = format!("firewall name {ruleset} rule 1");
    batch.set(format!("{prefix} destination port {port}"));
    batch.set(format!("{prefix} protocol tcp"));
    batch.set(format!("{prefix} action {action}"));
}

fn firewall(batch: &mut DirectiveBatch, nics: &NicInventory, ssh_port: u16) {
    batch.set(format!(
        "firewall name {DEFAULT_RULESET} default-action reject"
    ));

    for nic in nics.iter() {
        baseline_rules(batch, &nic.name, "local", "local");
        baseline_rules(batch, &nic.name, "in", "in");
    }

    // SSH only reaches the appliance through the management link.
    ssh_ruleset(batch, SSH_ON_RULESET, ssh_port, "accept");
    batch.set(format!(
        "interfaces ethernet {PRIMARY_NIC} firewall local name {SSH_ON_RULESET}"
    ));

    ssh_ruleset(batch, SSH_OFF_RULESET, ssh_port, "reject");
    for nic in nics.iter().filter(|n| n.name != PRIMARY_NIC) {
        batch.set(format!(
            "interfaces ethernet {} firewall local name {}",
            nic.name, SSH_OFF_RULESET
        ));
    }
}
