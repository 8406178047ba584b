//! JSON network files.
//!
//! A network file is a [`NetworkFile`]: the horizon plus one array per
//! component class, with components referencing buses and links by name.
//!
//! ```json
//! {
//!   "name": "district",
//!   "snapshots": { "start": "2030-01-01T00:00:00", "count": 24 },
//!   "buses": [{ "name": "el", "carrier": "ac", "v_nom": 20.0 }],
//!   "loads": [{ "name": "demand", "bus": "el", "p_set": 12.5 }]
//! }
//! ```

use crate::builder::{NetworkBuilder, NetworkFile};
use crate::error::{IesError, IesResult};
use crate::Network;
use std::path::Path;
use tracing::{debug, info};

/// Parse and resolve a network from JSON text.
pub fn parse_network(json: &str) -> IesResult<Network> {
    let file: NetworkFile = serde_json::from_str(json)?;
    let network = NetworkBuilder::from_file(file)?.build()?;
    Ok(network)
}

/// Load a network file from disk.
pub fn load_network(path: impl AsRef<Path>) -> IesResult<Network> {
    let path = path.as_ref();
    debug!("Reading network from {}", path.display());
    let json = std::fs::read_to_string(path)?;
    let network = parse_network(&json).map_err(|err| match err {
        IesError::Parse(msg) => IesError::Parse(format!("{}: {}", path.display(), msg)),
        other => other,
    })?;
    info!("Loaded network '{}': {}", network.name, network.stats());
    Ok(network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Carrier, ChpRole, NetworkError, Profile};
    use std::io::Write;

    const CHP_NETWORK: &str = r#"{
        "name": "chp",
        "snapshots": { "start": "2030-01-01T00:00:00", "count": 3 },
        "buses": [
            { "name": "gas", "carrier": "gas" },
            { "name": "el", "carrier": "ac", "v_nom": 20.0 },
            { "name": "heat", "carrier": "heat" }
        ],
        "links": [
            { "name": "chp_el", "bus0": "gas", "bus1": "el", "efficiency": 0.4, "p_nom": 50, "chp_role": "electric" },
            { "name": "chp_ht", "bus0": "gas", "bus1": "heat", "efficiency": 0.5, "p_nom": 80, "chp_role": "heat" }
        ],
        "generators": [
            { "name": "gas_supply", "bus": "gas", "p_nom": 500, "marginal_cost": 30 }
        ],
        "loads": [
            { "name": "el_demand", "bus": "el", "p_set": [10, 12, 14] }
        ],
        "chp_units": [ { "name": "chp", "electric": "chp_el", "heat": "chp_ht" } ]
    }"#;

    #[test]
    fn test_parse_network() {
        let network = parse_network(CHP_NETWORK).unwrap();
        assert_eq!(network.snapshots.len(), 3);
        assert_eq!(network.buses[1].carrier, Carrier::Ac);
        assert_eq!(network.links[0].chp_role, Some(ChpRole::Electric));
        assert_eq!(network.loads[0].p_set, Profile::Series(vec![10.0, 12.0, 14.0]));
        assert_eq!(network.generators[0].p_max_pu, Profile::Static(1.0));
        assert_eq!(network.chp_units.len(), 1);
    }

    #[test]
    fn test_load_network_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CHP_NETWORK.as_bytes()).unwrap();
        let network = load_network(file.path()).unwrap();
        assert_eq!(network.name, "chp");
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        let json = CHP_NETWORK.replace("\"v_nom\": 20.0", "\"vnom\": 20.0");
        assert!(matches!(parse_network(&json), Err(IesError::Parse(_))));
    }

    #[test]
    fn test_missing_chp_partner_is_network_error() {
        let json = CHP_NETWORK.replace(
            r#"[ { "name": "chp", "electric": "chp_el", "heat": "chp_ht" } ]"#,
            "[]",
        );
        assert!(matches!(
            parse_network(&json),
            Err(IesError::Network(NetworkError::MissingCoupledLink { .. }))
        ));
    }
}
