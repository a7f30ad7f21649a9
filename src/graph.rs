//! Module for creating and validating the graph of an energy network
use crate::id::NodeID;
use crate::network::{EnergySystem, Node};
use crate::results::FlowKey;
use anyhow::{Context, Result, ensure};
use log::warn;
use petgraph::Directed;
use petgraph::algo::connected_components;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{Graph, NodeIndex};
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::path::Path;

/// A graph of the flows in an energy network
type NetworkGraph = Graph<GraphNode, FlowKey, Directed>;

#[derive(Eq, PartialEq, Clone, Hash, Debug)]
/// A node in the network graph
enum GraphNode {
    /// A node representing a bus
    Bus(NodeID),
    /// A node representing any other component
    Component(NodeID),
}

impl Display for GraphNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphNode::Bus(id) => write!(f, "{id} (bus)"),
            GraphNode::Component(id) => write!(f, "{id}"),
        }
    }
}

/// Creates a directed graph with one node per network node and one edge per flow
fn create_network_graph(system: &EnergySystem) -> Result<NetworkGraph> {
    let mut graph = Graph::new();
    let mut index: HashMap<NodeID, NodeIndex> = HashMap::new();

    for (label, node) in system.iter() {
        let graph_node = match node {
            Node::Bus => GraphNode::Bus(label.clone()),
            _ => GraphNode::Component(label.clone()),
        };
        index.insert(label.clone(), graph.add_node(graph_node));
    }

    for flow_ref in system.iter_flows() {
        let key = flow_ref.key;
        let from = index[&key.from];
        let to = key
            .to
            .as_ref()
            .and_then(|to| index.get(to))
            .copied()
            .with_context(|| format!("Flow {key} has an unknown destination"))?;
        graph.add_edge(from, to, key);
    }

    Ok(graph)
}

/// Check that every bus can be both fed and drained
fn validate_network_graph(graph: &NetworkGraph) -> Result<()> {
    for node_idx in graph.node_indices() {
        let GraphNode::Bus(bus) = &graph[node_idx] else {
            continue;
        };

        let has_incoming = graph
            .edges_directed(node_idx, petgraph::Direction::Incoming)
            .next()
            .is_some();
        let has_outgoing = graph
            .edges_directed(node_idx, petgraph::Direction::Outgoing)
            .next()
            .is_some();
        ensure!(has_incoming, "Bus {bus} has no inflows");
        ensure!(has_outgoing, "Bus {bus} has no outflows");
    }

    let components = connected_components(graph);
    if components > 1 {
        warn!("The energy network is made of {components} unconnected parts");
    }

    Ok(())
}

/// Build the graph of an energy network and check that it is wired up properly
pub fn validate_energy_system(system: &EnergySystem) -> Result<()> {
    let graph = create_network_graph(system)?;
    validate_network_graph(&graph)
}

/// Write the network graph in Graphviz DOT format
pub fn write_dot(system: &EnergySystem, file_path: &Path) -> Result<()> {
    let graph = create_network_graph(system)?;
    let dot = Dot::with_attr_getters(
        &graph,
        &[Config::EdgeNoLabel],
        &|_, _| String::new(),
        &|_, (_, node)| match node {
            GraphNode::Bus(_) => "shape=ellipse".to_string(),
            GraphNode::Component(_) => "shape=box".to_string(),
        },
    );
    fs::write(file_path, format!("{dot}"))
        .with_context(|| format!("Could not write {}", file_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, simple_system};
    use crate::network::Flow;
    use rstest::rstest;
    use tempfile::tempdir;

    #[rstest]
    fn test_validate_energy_system(simple_system: EnergySystem) {
        assert!(validate_energy_system(&simple_system).is_ok());
    }

    #[test]
    fn test_bus_without_outflows() {
        let mut system = EnergySystem::new(3);
        system.add_bus("heat").unwrap();
        system
            .add(
                "boiler",
                Node::Source {
                    output: "heat".into(),
                    flow: Flow::default(),
                },
            )
            .unwrap();
        assert_error!(validate_energy_system(&system), "Bus heat has no outflows");
    }

    #[test]
    fn test_isolated_bus() {
        let mut system = EnergySystem::new(3);
        system.add_bus("gas").unwrap();
        assert_error!(validate_energy_system(&system), "Bus gas has no inflows");
    }

    #[rstest]
    fn test_write_dot(simple_system: EnergySystem) {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("network.dot");
        write_dot(&simple_system, &file_path).unwrap();
        let contents = fs::read_to_string(&file_path).unwrap();
        assert!(contents.starts_with("digraph"));
        assert!(contents.contains("electricity (bus)"));
    }
}
