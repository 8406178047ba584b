use std::path::Path;

use anyhow::{bail, Result};
use ies_algo::{ConstraintRegistry, ExtensionContext};
use ies_core::topology_stats;
use tracing::info;

use crate::commands::{diagnose, read_config, read_network};

pub fn handle(network_path: &Path, config_path: Option<&Path>) -> Result<()> {
    let network = read_network(network_path)?;
    println!("Network '{}': {}", network.name, network.stats());

    let topo = topology_stats(&network);
    println!(
        "Topology: {} buses, {} branches, {} connected components, {} AC sub-networks",
        topo.node_count, topo.edge_count, topo.connected_components, topo.ac_sub_networks
    );

    let diag = diagnose(&network);
    print!("{}", diag);
    if diag.has_errors() {
        bail!("validation failed: {}", diag.summary());
    }

    if let Some(path) = config_path {
        let config = read_config(Some(path))?;
        let window = config.validate_for(&network)?;
        let registry = ConstraintRegistry::from_config(&config);
        let constraints = registry.build_all(&ExtensionContext::new(&network, window))?;
        info!(
            "Configuration builds {} extra constraints from [{}]",
            constraints.len(),
            registry.ids().join(", ")
        );
        println!(
            "Configuration OK: window {}, {} extra constraints",
            window,
            constraints.len()
        );
    }
    Ok(())
}
