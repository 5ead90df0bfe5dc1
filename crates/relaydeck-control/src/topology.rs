//! Key↔relay topology graph
//!
//! Relays do not expose which key a connected peer authenticated with, so
//! edge liveness is matched by count: a relay with N live peer slots marks
//! its first N assigned keys (in assignment order) active and the rest
//! down. The graph is labelled with [`PEER_COUNT_APPROXIMATION`] so the
//! presentation layer can say so.

use relaydeck_proto::topology::{edge_id, key_node_id, relay_node_id, PEER_COUNT_APPROXIMATION};
use relaydeck_proto::{
    EdgeStatus, KeyAssignment, KeyRecord, NodeData, NodeKind, RelayRecord, RelayStats,
    TopologyEdge, TopologyGraph, TopologyNode,
};
use std::collections::{HashMap, HashSet};

/// Peers whose connectivity flag is set or which carry a live endpoint
pub fn live_peer_slots(stats: &RelayStats) -> usize {
    stats
        .peers
        .iter()
        .filter(|peer| {
            peer.stats.connectivity_flag().unwrap_or(false) || peer.stats.has_live_endpoint()
        })
        .count()
}

/// Build the graph.
///
/// `live_slots` maps relay id to its live peer count; relays missing from
/// it (stats unavailable) have every edge down. Assignments pointing at a
/// relay or key that is not a node are dropped.
pub fn build_topology(
    relays: &[RelayRecord],
    keys: &[KeyRecord],
    assignments: &[KeyAssignment],
    live_slots: &HashMap<i32, usize>,
) -> TopologyGraph {
    let mut nodes = Vec::with_capacity(relays.len() + keys.len());

    for relay in relays {
        nodes.push(TopologyNode {
            id: relay_node_id(relay.id),
            kind: NodeKind::Relay,
            label: relay.name.clone(),
            data: NodeData {
                port: Some(relay.udp_port),
                web_port: Some(relay.web_port),
                region: Some(relay.region.clone()).filter(|r| !r.is_empty()),
                tenant_id: relay.tenant_id,
                tenant: None,
            },
        });
    }

    for key in keys {
        nodes.push(TopologyNode {
            id: key_node_id(key.id),
            kind: NodeKind::Site,
            label: key.alias.clone(),
            data: NodeData {
                tenant_id: key.tenant_id,
                tenant: key.tenant_name.clone(),
                ..Default::default()
            },
        });
    }

    let relay_ids: HashSet<i32> = relays.iter().map(|r| r.id).collect();
    let key_ids: HashSet<i32> = keys.iter().map(|k| k.id).collect();

    let mut ordered: Vec<&KeyAssignment> = assignments
        .iter()
        .filter(|a| relay_ids.contains(&a.relay_id) && key_ids.contains(&a.key_id))
        .collect();
    ordered.sort_by_key(|a| (a.relay_id, a.position, a.key_id));

    // Remaining live slots per relay, consumed in assignment order
    let mut remaining: HashMap<i32, usize> = HashMap::new();

    let edges = ordered
        .into_iter()
        .map(|assignment| {
            let slots = remaining
                .entry(assignment.relay_id)
                .or_insert_with(|| live_slots.get(&assignment.relay_id).copied().unwrap_or(0));

            let status = if *slots > 0 {
                *slots -= 1;
                EdgeStatus::Active
            } else {
                EdgeStatus::Down
            };

            TopologyEdge {
                id: edge_id(assignment.key_id, assignment.relay_id),
                source: key_node_id(assignment.key_id),
                target: relay_node_id(assignment.relay_id),
                tenant: assignment.tenant_name.clone(),
                status,
            }
        })
        .collect();

    TopologyGraph {
        nodes,
        edges,
        status_source: PEER_COUNT_APPROXIMATION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn relay(id: i32, name: &str) -> RelayRecord {
        RelayRecord {
            id,
            name: name.to_string(),
            udp_port: 51820 + id,
            web_port: 8080 + id,
            tenant_id: Some(1),
            region: "eu-west".to_string(),
        }
    }

    fn key(id: i32) -> KeyRecord {
        KeyRecord {
            id,
            alias: format!("site-{}", id),
            tenant_id: Some(1),
            tenant_name: Some("acme".to_string()),
        }
    }

    fn assign(key_id: i32, relay_id: i32, position: i32) -> KeyAssignment {
        KeyAssignment {
            key_id,
            relay_id,
            relay_name: format!("relay-{}", relay_id),
            position,
            tenant_id: Some(1),
            tenant_name: Some("acme".to_string()),
        }
    }

    #[test]
    fn test_live_peer_slots() {
        let stats: RelayStats = serde_json::from_value(json!({
            "peers": {
                "a": {"status": 1},
                "b": {"status": 0, "endpoint": "203.0.113.9:51820"},
                "c": {"endpoint": "(none)"},
                "d": {}
            }
        }))
        .unwrap();
        assert_eq!(live_peer_slots(&stats), 2);
    }

    #[test]
    fn test_two_live_slots_three_keys() {
        let relays = vec![relay(1, "edge")];
        let keys = vec![key(10), key(11), key(12)];
        // Assignment order is position, not key id
        let assignments = vec![assign(12, 1, 0), assign(10, 1, 1), assign(11, 1, 2)];
        let live = HashMap::from([(1, 2)]);

        let graph = build_topology(&relays, &keys, &assignments, &live);

        let statuses: Vec<_> = graph
            .edges
            .iter()
            .map(|e| (e.source.as_str(), e.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("key-12", EdgeStatus::Active),
                ("key-10", EdgeStatus::Active),
                ("key-11", EdgeStatus::Down),
            ]
        );
        assert_eq!(graph.status_source, "peer_count_approximation");
        assert_eq!(graph.nodes.len(), 4);
    }

    #[test]
    fn test_unavailable_stats_mark_edges_down() {
        let relays = vec![relay(1, "a"), relay(2, "b")];
        let keys = vec![key(10), key(11)];
        let assignments = vec![assign(10, 1, 0), assign(11, 2, 0)];
        let live = HashMap::from([(1, 5)]);

        let graph = build_topology(&relays, &keys, &assignments, &live);
        assert_eq!(graph.edges[0].status, EdgeStatus::Active);
        assert_eq!(graph.edges[1].status, EdgeStatus::Down);
        assert_eq!(graph.edges[1].id, "edge-k11-r2");
        assert_eq!(graph.edges[1].target, "relay-2");
    }

    #[test]
    fn test_edges_to_missing_nodes_are_dropped() {
        let relays = vec![relay(1, "a")];
        let keys = vec![key(10)];
        let assignments = vec![assign(10, 1, 0), assign(10, 9, 0), assign(99, 1, 1)];

        let graph = build_topology(&relays, &keys, &assignments, &HashMap::new());
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn test_node_shapes() {
        let graph = build_topology(&[relay(1, "edge")], &[key(10)], &[], &HashMap::new());
        let value = serde_json::to_value(&graph).unwrap();

        assert_eq!(value["nodes"][0]["type"], "relay");
        assert_eq!(value["nodes"][0]["data"]["port"], 51821);
        assert_eq!(value["nodes"][1]["type"], "site");
        assert_eq!(value["nodes"][1]["data"]["tenant"], "acme");
        assert!(value["nodes"][1]["data"].get("port").is_none());
    }
}
