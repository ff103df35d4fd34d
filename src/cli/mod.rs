//! Command-line arguments parsing.

use anyhow::Result;
use clap::Parser;
use slog_scope::trace;

use crate::boot::{BootConfig, Orchestrator, SystemAppliance};

/// Provision this appliance from the hypervisor bootstrap info, then
/// restart the control-plane agent
#[derive(Debug, Parser)]
#[clap(display_name = "vrboot")]
#[clap(version, about)]
pub(crate) struct CliConfig {}

impl CliConfig {
    /// Run the whole boot sequence.
    pub fn run(self) -> Result<()> {
        let mut orchestrator = Orchestrator::new(BootConfig::default(), SystemAppliance::new());
        orchestrator.run()
    }
}

/// Parse command-line arguments into CLI configuration.
pub(crate) fn parse_args(argv: impl IntoIterator<Item = String>) -> Result<CliConfig> {
    let cfg = match CliConfig::try_parse_from(argv) {
        Err(e) if e.kind() == clap::error::ErrorKind::DisplayHelp => e.exit(),
        Err(e) if e.kind() == clap::error::ErrorKind::DisplayVersion => e.exit(),
        v => v,
    }?;
    trace!("cli configuration - {:?}", cfg);
    Ok(cfg)
}
