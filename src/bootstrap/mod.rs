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

//! Bootstrap document
//!
//! The hypervisor hands over a single JSON document describing the SSH key,
//! the management NIC, any additional NICs and the SSH port. It is decoded
//! as plain JSON first (so that it can be cached even when a field is
//! wrong), then validated once into a `BootstrapDocument`; nothing
//! downstream ever looks at raw JSON.

use anyhow::{anyhow, bail, Context, Result};
use pnet_base::MacAddr;
use serde::{Deserialize, Deserializer};
use std::net::IpAddr;
use std::str::FromStr;

use crate::network;

pub mod channel;


/// Validated bootstrap information.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapDocument {
    pub public_key: SshPublicKey,
    pub management_nic: NicSpec,
    pub additional_nics: Vec<NicSpec>,
    pub ssh_port: u16,
}

/// An OpenSSH public key line, split into its three fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshPublicKey {
    pub key_type: String,
    pub key: String,
    pub id: String,
}

/// Desired addressing for one NIC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NicSpec {
    pub mac: MacAddr,
    pub ip: IpAddr,
    pub netmask: IpAddr,
    pub gateway: Option<IpAddr>,
    /// Whether the `isDefaultRoute` key was present, whatever its value.
    pub default_route: bool,
}

impl NicSpec {
    /// Address in `ip/prefix` notation.
    pub fn cidr(&self) -> Result<ipnetwork::IpNetwork> {
        network::try_parse_cidr(self.ip, self.netmask)
            .with_context(|| format!("invalid address for nic[mac:{}]", self.mac))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDocument {
    public_key: Option<String>,
    management_nic: Option<WireNic>,
    additional_nics: Option<Vec<WireNic>>,
    ssh_port: Option<serde_json::Number>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireNic {
    mac: Option<String>,
    ip: Option<String>,
    netmask: Option<String>,
    gateway: Option<String>,
    #[serde(default, deserialize_with = "key_present")]
    is_default_route: bool,
}

/// Map any value (including `null`) to `true`; absent keys use the default.
fn key_present<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    serde::de::IgnoredAny::deserialize(deserializer)?;
    Ok(true)
}

impl FromStr for SshPublicKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        match fields.as_slice() {
            [] => bail!("'publicKey' is empty"),
            [key_type, key, id] => Ok(SshPublicKey {
                key_type: key_type.to_string(),
                key: key.to_string(),
                id: id.to_string(),
            }),
            _ => bail!(
                "'publicKey' must have exactly 3 fields (type, key, comment), found {}: '{}'",
                fields.len(),
                s
            ),
        }
    }
}

/// A payload that decoded as JSON but has not been validated yet.
#[derive(Debug)]
pub struct RawBootstrap(serde_json::Value);

impl RawBootstrap {
    /// Decode a raw payload; only JSON syntax is checked here.
    pub fn decode(content: &[u8]) -> Result<Self> {
        let value = serde_json::from_slice(content).with_context(|| {
            format!(
                "unable to JSON parse bootstrap info:\n{}",
                String::from_utf8_lossy(content)
            )
        })?;
        Ok(RawBootstrap(value))
    }

    /// Check every field and build the typed document.
    pub fn validate(self) -> Result<BootstrapDocument> {
        let wire: WireDocument =
            serde_json::from_value(self.0).context("malformed bootstrap info")?;
        BootstrapDocument::validate(wire)
    }
}

impl BootstrapDocument {
    /// Decode and validate a raw payload.
    pub fn from_slice(content: &[u8]) -> Result<Self> {
        RawBootstrap::decode(content)?.validate()
    }

    fn validate(wire: WireDocument) -> Result<Self> {
        let public_key = wire
            .public_key
            .ok_or_else(|| anyhow!("cannot find 'publicKey' in bootstrap info"))?
            .parse()?;

        let management_nic = wire
            .management_nic
            .ok_or_else(|| anyhow!("no field 'managementNic' in bootstrap info"))
            .and_then(|nic| NicSpec::validate(nic, "the management nic"))?;

        let additional_nics = wire
            .additional_nics
            .unwrap_or_default()
            .into_iter()
            .map(|nic| NicSpec::validate(nic, "the nic"))
            .collect::<Result<Vec<_>>>()?;

        let ssh_port = wire
            .ssh_port
            .ok_or_else(|| anyhow!("'sshPort' not found in bootstrap info"))
            .and_then(|n| parse_port(&n))?;

        Ok(BootstrapDocument {
            public_key,
            management_nic,
            additional_nics,
            ssh_port,
        })
    }

    /// All NICs: management first, then additional ones in document order.
    pub fn nics(&self) -> impl Iterator<Item = &NicSpec> {
        std::iter::once(&self.management_nic).chain(self.additional_nics.iter())
    }
}

impl NicSpec {
    fn validate(wire: WireNic, which: &str) -> Result<Self> {
        let mac = wire
            .mac
            .ok_or_else(|| anyhow!("cannot find 'mac' field for {}", which))?;
        let mac = MacAddr::from_str(mac.trim())
            .map_err(|e| anyhow!("invalid 'mac' field '{}' for {}: {:?}", mac, which, e))?;
        let which = format!("{which}[mac:{mac}]");

        let netmask = wire
            .netmask
            .ok_or_else(|| anyhow!("cannot find 'netmask' field for {}", which))?;
        let netmask = parse_ip(&netmask, "netmask", &which)?;
        let ip = wire
            .ip
            .ok_or_else(|| anyhow!("cannot find 'ip' field for {}", which))?;
        let ip = parse_ip(&ip, "ip", &which)?;
        let gateway = wire
            .gateway
            .filter(|gw| !gw.trim().is_empty())
            .map(|gw| parse_ip(&gw, "gateway", &which))
            .transpose()?;

        let spec = NicSpec {
            mac,
            ip,
            netmask,
            gateway,
            default_route: wire.is_default_route,
        };
        spec.cidr()?;
        Ok(spec)
    }
}

fn parse_ip(value: &str, field: &str, which: &str) -> Result<IpAddr> {
    IpAddr::from_str(value.trim())
        .with_context(|| format!("invalid '{field}' field '{value}' for {which}"))
}

/// Accept integral JSON numbers (including `22.0`) in the TCP port range.
fn parse_port(n: &serde_json::Number) -> Result<u16> {
    let port = match (n.as_u64(), n.as_f64()) {
        (Some(v), _) => v,
        (None, Some(f)) if f.fract() == 0.0 && f >= 0.0 => f as u64,
        _ => bail!("'sshPort' is not a valid port: {}", n),
    };
    match u16::try_from(port) {
        Ok(0) => bail!("'sshPort' must not be zero"),
        Ok(p) => Ok(p),
        Err(_) => bail!("'sshPort' is out of range: {}", port),
    }
}
