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

//! network abstracts away the host network interfaces as seen by the
//! appliance: which ethernet links exist, and by which hardware address
//! they can be found.

use anyhow::{bail, Context, Result};
use ipnetwork::IpNetwork;
use pnet_base::MacAddr;
use slog_scope::trace;
use std::net::IpAddr;

pub mod announce;

/// Name of the interface that is always the management one.
pub const PRIMARY_NIC: &str = "eth0";

/// Prefix of the links that can be configured as `interfaces ethernet`.
const ETHERNET_PREFIX: &str = "eth";

/// Whether `name` is a physical ethernet link (`eth<N>`), as opposed to a
/// VLAN sub-interface such as `eth0.100`.
fn is_ethernet_link(name: &str) -> bool {
    match name.strip_prefix(ETHERNET_PREFIX) {
        Some(index) => !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Try to parse an IP+netmask pair into a CIDR network.
///
/// Non-contiguous netmasks (e.g. `255.0.255.0`) are rejected.
pub fn try_parse_cidr(address: IpAddr, netmask: IpAddr) -> Result<IpNetwork> {
    let prefix = ipnetwork::ip_mask_to_prefix(netmask)
        .with_context(|| format!("invalid netmask '{netmask}'"))?;
    IpNetwork::new(address, prefix).context("failed to parse network")
}

/// A host ethernet link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nic {
    pub name: String,
    pub mac: MacAddr,
}

/// Ethernet links currently visible on the host.
///
/// Iteration always happens in interface-name order, so that anything
/// derived from an inventory is reproducible. Links may share a MAC address;
/// only a lookup of such an address fails.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NicInventory {
    nics: Vec<Nic>,
}

impl NicInventory {
    /// Build an inventory, rejecting duplicated names.
    pub fn from_nics(nics: impl IntoIterator<Item = Nic>) -> Result<Self> {
        let mut nics: Vec<Nic> = nics.into_iter().collect();
        nics.sort_by(|a, b| a.name.cmp(&b.name));

        if let Some(pair) = nics.windows(2).find(|w| w[0].name == w[1].name) {
            bail!("duplicate interface name '{}'", pair[0].name);
        }

        Ok(Self { nics })
    }

    /// Scan the ethernet links currently present on the host.
    pub fn from_host() -> Result<Self> {
        let interfaces = pnet_datalink::interfaces();
        trace!("interfaces - {:?}", interfaces);

        let nics = interfaces.into_iter().filter_map(|iface| {
            if iface.is_loopback() || !is_ethernet_link(&iface.name) {
                return None;
            }
            match iface.mac {
                Some(mac) if mac != MacAddr::zero() => Some(Nic {
                    name: iface.name,
                    mac,
                }),
                _ => None,
            }
        });
        Self::from_nics(nics).context("failed to build host NIC inventory")
    }

    /// Look up the link with the given hardware address.
    ///
    /// Fails when more than one link carries `mac`.
    pub fn by_mac(&self, mac: &MacAddr) -> Result<Option<&Nic>> {
        let mut matches = self.nics.iter().filter(|nic| nic.mac == *mac);
        let found = matches.next();
        if let (Some(first), Some(second)) = (found, matches.next()) {
            bail!(
                "interfaces '{}' and '{}' share MAC address {}",
                first.name,
                second.name,
                mac
            );
        }
        Ok(found)
    }

    /// All links, in interface-name order.
    pub fn iter(&self) -> impl Iterator<Item = &Nic> {
        self.nics.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.nics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn nic(name: &str, mac: &str) -> Nic {
        Nic {
            name: name.to_string(),
            mac: MacAddr::from_str(mac).unwrap(),
        }
    }

    #[test]
    fn mac_addr_canonical_form() {
        let m = MacAddr::from_str("52:54:00:AB:cd:EF").unwrap();
        assert_eq!(m.to_string(), "52:54:00:ab:cd:ef");
    }

    #[test]
    fn cidr_from_contiguous_masks() {
        let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10));
        let tests = vec![
            ("255.255.255.255", "192.168.1.10/32"),
            ("255.255.255.0", "192.168.1.10/24"),
            ("255.255.254.0", "192.168.1.10/23"),
            ("255.255.0.0", "192.168.1.10/16"),
            ("255.128.0.0", "192.168.1.10/9"),
            ("0.0.0.0", "192.168.1.10/0"),
        ];
        for (mask, expected) in tests {
            let mask = IpAddr::from_str(mask).unwrap();
            let cidr = try_parse_cidr(ip, mask).unwrap();
            assert_eq!(cidr.to_string(), expected, "mask {mask}");
        }
    }

    #[test]
    fn cidr_rejects_non_contiguous_masks() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        for mask in ["255.0.255.0", "0.255.255.255", "255.255.255.1", "128.0.0.1"] {
            let mask = IpAddr::from_str(mask).unwrap();
            try_parse_cidr(ip, mask).unwrap_err();
        }
    }

    #[test]
    fn inventory_lookup_and_order() {
        let inventory = NicInventory::from_nics(vec![
            nic("eth1", "52:54:00:22:22:22"),
            nic("eth0", "52:54:00:11:11:11"),
        ])
        .unwrap();

        let names: Vec<_> = inventory.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["eth0", "eth1"]);

        let mac = MacAddr::from_str("52:54:00:22:22:22").unwrap();
        assert_eq!(inventory.by_mac(&mac).unwrap().unwrap().name, "eth1");

        let unknown = MacAddr::from_str("52:54:00:33:33:33").unwrap();
        assert_eq!(inventory.by_mac(&unknown).unwrap(), None);
    }

    #[test]
    fn ethernet_link_names() {
        for name in ["eth0", "eth1", "eth12"] {
            assert!(is_ethernet_link(name), "{name}");
        }
        for name in ["eth", "eth0.100", "eth1v2", "ethx", "lo", "veth0", "bond0"] {
            assert!(!is_ethernet_link(name), "{name}");
        }
    }

    #[test]
    fn inventory_shared_mac() {
        let inventory = NicInventory::from_nics(vec![
            nic("eth0", "52:54:00:11:11:11"),
            nic("eth0.100", "52:54:00:11:11:11"),
            nic("eth1", "52:54:00:22:22:22"),
        ])
        .unwrap();

        let other = MacAddr::from_str("52:54:00:22:22:22").unwrap();
        assert_eq!(inventory.by_mac(&other).unwrap().unwrap().name, "eth1");

        let shared = MacAddr::from_str("52:54:00:11:11:11").unwrap();
        let err = inventory.by_mac(&shared).unwrap_err();
        assert!(err.to_string().contains("eth0.100"), "{err}");
    }

    #[test]
    fn inventory_rejects_duplicate_names() {
        NicInventory::from_nics(vec![
            nic("eth0", "52:54:00:11:11:11"),
            nic("eth0", "52:54:00:22:22:22"),
        ])
        .unwrap_err();
    }
}
