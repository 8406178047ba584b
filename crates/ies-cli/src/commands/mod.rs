pub mod run;
pub mod summary;
pub mod validate;

use anyhow::{Context, Result};
use ies_algo::RunConfig;
use ies_core::{io::load_network, Diagnostics, Network};
use std::path::Path;
use tracing::warn;

pub fn read_network(path: &Path) -> Result<Network> {
    load_network(path).with_context(|| format!("loading network {}", path.display()))
}

/// Parse the TOML configuration at `path`, or the defaults when absent.
pub fn read_config(path: Option<&Path>) -> Result<RunConfig> {
    let Some(path) = path else {
        return Ok(RunConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    RunConfig::from_toml_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

/// Run the network diagnostics, logging warnings and returning them all.
pub fn diagnose(network: &Network) -> Diagnostics {
    let mut diag = Diagnostics::new();
    network.validate_into(&mut diag);
    for issue in diag.warnings() {
        warn!("{}", issue);
    }
    diag
}
