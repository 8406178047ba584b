use crate::{BusId, Carrier, Network};
use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use serde::Serialize;

/// Electrically connected group of AC buses (an island of the line graph).
///
/// The DC power-flow angles of each island are referenced to its own slack bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubNetwork {
    pub buses: Vec<BusId>,
    /// First bus of the island in insertion order
    pub slack: BusId,
}

/// Group AC buses into islands connected by lines.
///
/// Links never join islands: they are controllable transfers without an
/// angle relation. Buses of other carriers are not part of any sub-network.
pub fn sub_networks(network: &Network) -> Vec<SubNetwork> {
    let n = network.buses.len();
    let mut sets = UnionFind::<usize>::new(n);
    for line in &network.lines {
        let (i, j) = (line.bus0.value(), line.bus1.value());
        if i < n && j < n && is_ac(network, line.bus0) && is_ac(network, line.bus1) {
            sets.union(i, j);
        }
    }

    let mut islands: Vec<(usize, Vec<BusId>)> = Vec::new();
    for bus in network.buses.iter().filter(|b| b.carrier == Carrier::Ac) {
        let root = sets.find(bus.id.value());
        match islands.iter_mut().find(|(r, _)| *r == root) {
            Some((_, members)) => members.push(bus.id),
            None => islands.push((root, vec![bus.id])),
        }
    }

    islands
        .into_iter()
        .map(|(_, buses)| SubNetwork {
            slack: buses[0],
            buses,
        })
        .collect()
}

fn is_ac(network: &Network, bus: BusId) -> bool {
    network
        .bus(bus)
        .map(|b| b.carrier == Carrier::Ac)
        .unwrap_or(false)
}

/// Summary statistics of the coupled multi-carrier topology.
#[derive(Debug, Clone, Serialize)]
pub struct TopologyStats {
    pub node_count: usize,
    pub edge_count: usize,
    /// Components of the full graph (lines and links as edges)
    pub connected_components: usize,
    /// AC islands of the line graph
    pub ac_sub_networks: usize,
    pub min_degree: usize,
    pub avg_degree: f64,
    pub max_degree: usize,
}

/// Degree and connectivity figures with buses as nodes and lines plus links as edges.
pub fn topology_stats(network: &Network) -> TopologyStats {
    let mut graph = UnGraph::<BusId, ()>::with_capacity(network.buses.len(), 0);
    let nodes: Vec<NodeIndex> = network.buses.iter().map(|b| graph.add_node(b.id)).collect();
    let edges = network
        .lines
        .iter()
        .map(|l| (l.bus0, l.bus1))
        .chain(network.links.iter().map(|l| (l.bus0, l.bus1)));
    for (a, b) in edges {
        if let (Some(&na), Some(&nb)) = (nodes.get(a.value()), nodes.get(b.value())) {
            graph.add_edge(na, nb, ());
        }
    }

    let degrees: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.neighbors(n).count())
        .collect();
    let node_count = graph.node_count();
    let avg_degree = if node_count == 0 {
        0.0
    } else {
        degrees.iter().sum::<usize>() as f64 / node_count as f64
    };

    TopologyStats {
        node_count,
        edge_count: graph.edge_count(),
        connected_components: connected_components(&graph),
        ac_sub_networks: sub_networks(network).len(),
        min_degree: degrees.iter().copied().min().unwrap_or(0),
        avg_degree,
        max_degree: degrees.iter().copied().max().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BusInput, LineInput, LinkInput, NetworkBuilder, Snapshots};
    use chrono::NaiveDate;

    fn network() -> Network {
        let start = NaiveDate::from_ymd_opt(2030, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        NetworkBuilder::new("islands", Snapshots::hourly(start, 1))
            .bus(BusInput::new("a", Carrier::Ac))
            .bus(BusInput::new("b", Carrier::Ac))
            .bus(BusInput::new("c", Carrier::Ac))
            .bus(BusInput::new("d", Carrier::Ac))
            .bus(BusInput::new("heat", Carrier::Heat))
            .line(LineInput::new("ab", "a", "b", 1.0))
            .line(LineInput::new("cd", "c", "d", 1.0))
            .link(LinkInput::new("hvdc", "b", "c", 1.0).with_carrier(Carrier::Dc))
            .link(LinkInput::new("hp", "d", "heat", 3.0))
            .build()
            .unwrap()
    }

    #[test]
    fn test_links_do_not_join_islands() {
        let islands = sub_networks(&network());
        assert_eq!(islands.len(), 2);
        assert_eq!(islands[0].slack, BusId::new(0));
        assert_eq!(islands[1].buses, vec![BusId::new(2), BusId::new(3)]);
    }

    #[test]
    fn test_non_ac_buses_excluded() {
        let islands = sub_networks(&network());
        assert!(islands
            .iter()
            .all(|s| !s.buses.contains(&BusId::new(4))));
    }

    #[test]
    fn test_topology_stats() {
        let stats = topology_stats(&network());
        assert_eq!(stats.node_count, 5);
        assert_eq!(stats.edge_count, 4);
        assert_eq!(stats.connected_components, 1);
        assert_eq!(stats.ac_sub_networks, 2);
        assert_eq!(stats.max_degree, 2);
    }
}
