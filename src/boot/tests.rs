use super::*;
use crate::network::Nic;
use anyhow::bail;
use pnet_base::MacAddr;
use std::cell::{Cell, RefCell};
use std::fs;
use std::str::FromStr;

static PAYLOAD: &str = r#"{
    "publicKey": "ssh-rsa AAAAB3Nza... user@host",
    "managementNic": {"mac": "52:54:00:11:11:11", "ip": "192.168.1.10",
                      "netmask": "255.255.255.0", "gateway": "192.168.1.1"},
    "additionalNics": [
        {"mac": "52:54:00:22:22:22", "ip": "10.0.0.10", "netmask": "255.255.0.0"},
        {"mac": "52:54:00:33:33:33", "ip": "10.1.0.10", "netmask": "255.255.0.0",
         "gateway": "10.1.0.1"}
    ],
    "sshPort": 22
}"#;

#[derive(Default)]
struct MockAppliance {
    firewall_ready_after: u32,
    firewall_polls: Cell<u32>,
    fail_rescan: bool,
    fail_apply: bool,
    fail_announce: bool,
    fail_restart: bool,
    calls: RefCell<Vec<String>>,
    applied: RefCell<Option<DirectiveBatch>>,
}

impl MockAppliance {
    fn record(&self, call: impl Into<String>) {
        self.calls.borrow_mut().push(call.into());
    }
}

impl Appliance for MockAppliance {
    fn firewall_ready(&self) -> Result<bool> {
        let polls = self.firewall_polls.get() + 1;
        self.firewall_polls.set(polls);
        Ok(polls > self.firewall_ready_after)
    }

    fn nic_inventory(&self) -> Result<NicInventory> {
        let rescan = self.calls.borrow().iter().any(|c| c == "nic_inventory");
        self.record("nic_inventory");
        if rescan && self.fail_rescan {
            bail!("netlink unavailable");
        }
        NicInventory::from_nics(
            [
                ("eth0", "52:54:00:11:11:11"),
                ("eth1", "52:54:00:22:22:22"),
                ("eth2", "52:54:00:33:33:33"),
            ]
            .iter()
            .map(|(name, mac)| Nic {
                name: name.to_string(),
                mac: MacAddr::from_str(mac).unwrap(),
            }),
        )
    }

    fn live_config(&self) -> Result<ConfigTree> {
        self.record("live_config");
        ConfigTree::parse("service {\n ssh {\n port 22\n }\n}\n")
    }

    fn apply(&self, batch: &DirectiveBatch) -> Result<()> {
        self.record("apply");
        if self.fail_apply {
            bail!("commit failed");
        }
        *self.applied.borrow_mut() = Some(batch.clone());
        Ok(())
    }

    fn announce(&self, nic: &str, ip: IpAddr, gateway: IpAddr) -> Result<()> {
        self.record(format!("announce {nic} {ip} {gateway}"));
        if self.fail_announce {
            bail!("arping not found");
        }
        Ok(())
    }

    fn restart_agent(&self) -> Result<()> {
        self.record("restart_agent");
        if self.fail_restart {
            bail!("init script failed");
        }
        Ok(())
    }
}

struct Fixture {
    _tmp: tempfile::TempDir,
    config: BootConfig,
}

fn fixture(payload: Option<&str>) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let quick = Gate::new(Duration::from_millis(200), Duration::from_millis(10));
    let config = BootConfig {
        virtio_port: tmp.path().join("applianceVm.vport"),
        cache_path: tmp.path().join("zvr").join("bootstrap-info.json"),
        firewall_gate: quick.clone(),
        port_gate: quick.clone(),
        payload_gate: quick,
    };
    if let Some(content) = payload {
        fs::write(&config.virtio_port, content).unwrap();
    }
    Fixture { _tmp: tmp, config }
}

#[test]
fn test_full_boot() {
    let fx = fixture(Some(PAYLOAD));
    let appliance = MockAppliance {
        firewall_ready_after: 2,
        ..Default::default()
    };
    let mut orch = Orchestrator::new(fx.config.clone(), appliance);

    orch.run().unwrap();
    assert_eq!(orch.phase(), Phase::ServiceRestarted);
    assert_eq!(orch.appliance.firewall_polls.get(), 3);

    assert_eq!(
        *orch.appliance.calls.borrow(),
        vec![
            "nic_inventory",
            "live_config",
            "apply",
            "nic_inventory",
            "announce eth0 192.168.1.10 192.168.1.1",
            "announce eth2 10.1.0.10 10.1.0.1",
            "restart_agent",
        ]
    );

    let applied = orch.appliance.applied.borrow();
    let batch = applied.as_ref().unwrap();
    assert!(batch
        .sets()
        .any(|p| p == "interfaces ethernet eth0 address 192.168.1.10/24"));
    assert_eq!(batch.deletes().collect::<Vec<_>>(), vec!["service ssh"]);

    assert_eq!(fs::read_to_string(&fx.config.cache_path).unwrap(), PAYLOAD);
}

#[test]
fn test_firewall_never_ready() {
    let fx = fixture(Some(PAYLOAD));
    let appliance = MockAppliance {
        firewall_ready_after: u32::MAX,
        ..Default::default()
    };
    let mut orch = Orchestrator::new(fx.config.clone(), appliance);

    let err = orch.run().unwrap_err();
    assert_eq!(orch.phase(), Phase::WaitFirewall);
    assert!(format!("{err:#}").contains("timed out"), "{err:#}");
    assert!(orch.appliance.calls.borrow().is_empty());
    assert!(!fx.config.cache_path.exists());
}

#[test]
fn test_missing_virtio_port() {
    let fx = fixture(None);
    let mut orch = Orchestrator::new(fx.config.clone(), MockAppliance::default());

    let err = orch.run().unwrap_err();
    assert_eq!(orch.phase(), Phase::WaitChannel);
    assert!(format!("{err:#}").contains("virtio port"), "{err:#}");
}

#[test]
fn test_malformed_payload() {
    let fx = fixture(Some("{\"publicKey\": 42"));
    let mut orch = Orchestrator::new(fx.config.clone(), MockAppliance::default());

    let err = orch.run().unwrap_err();
    assert_eq!(orch.phase(), Phase::WaitChannel);
    assert!(format!("{err:#}").contains("unable to JSON parse"), "{err:#}");
    assert!(orch.appliance.calls.borrow().is_empty());
}

#[test]
fn test_synthesis_failure() {
    let payload = PAYLOAD.replace("52:54:00:33:33:33", "52:54:00:99:99:99");
    let fx = fixture(Some(&payload));
    let mut orch = Orchestrator::new(fx.config.clone(), MockAppliance::default());

    let err = orch.run().unwrap_err();
    assert_eq!(orch.phase(), Phase::DocumentParsed);
    assert!(format!("{err:#}").contains("52:54:00:99:99:99"), "{err:#}");
    assert!(!orch.appliance.calls.borrow().contains(&"apply".to_string()));
}

#[test]
fn test_apply_failure_is_fatal() {
    let fx = fixture(Some(PAYLOAD));
    let appliance = MockAppliance {
        fail_apply: true,
        ..Default::default()
    };
    let mut orch = Orchestrator::new(fx.config.clone(), appliance);

    let err = orch.run().unwrap_err();
    assert_eq!(orch.phase(), Phase::ConfigSynthesized);
    assert!(format!("{err:#}").contains("commit failed"), "{err:#}");
    assert_eq!(
        *orch.appliance.calls.borrow(),
        vec!["nic_inventory", "live_config", "apply"]
    );
}

#[test]
fn test_announce_failure_is_ignored() {
    let fx = fixture(Some(PAYLOAD));
    let appliance = MockAppliance {
        fail_announce: true,
        ..Default::default()
    };
    let mut orch = Orchestrator::new(fx.config.clone(), appliance);

    orch.run().unwrap();
    assert_eq!(orch.phase(), Phase::ServiceRestarted);
    assert_eq!(
        orch.appliance.calls.borrow().last().map(String::as_str),
        Some("restart_agent")
    );
}

#[test]
fn test_rescan_failure_skips_announce() {
    let fx = fixture(Some(PAYLOAD));
    let appliance = MockAppliance {
        fail_rescan: true,
        ..Default::default()
    };
    let mut orch = Orchestrator::new(fx.config.clone(), appliance);

    orch.run().unwrap();
    assert_eq!(orch.phase(), Phase::ServiceRestarted);
    assert_eq!(
        *orch.appliance.calls.borrow(),
        vec![
            "nic_inventory",
            "live_config",
            "apply",
            "nic_inventory",
            "restart_agent",
        ]
    );
}

#[test]
fn test_restart_failure_is_fatal() {
    let fx = fixture(Some(PAYLOAD));
    let appliance = MockAppliance {
        fail_restart: true,
        ..Default::default()
    };
    let mut orch = Orchestrator::new(fx.config.clone(), appliance);

    let err = orch.run().unwrap_err();
    assert_eq!(orch.phase(), Phase::Announced);
    assert!(format!("{err:#}").contains("init script failed"), "{err:#}");
}

#[test]
fn test_phase_display() {
    assert_eq!(Phase::WaitFirewall.to_string(), "wait-firewall");
    assert_eq!(Phase::ServiceRestarted.to_string(), "service-restarted");
}
