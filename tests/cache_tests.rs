//! Road data from an Overpass response through the on-disk cache.

mod fixtures;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Value, json};
use tempfile::tempdir;

use route_planner::Coordinate;
use route_planner::cache::{CacheKey, Freshness, ResultCache};
use route_planner::graph::AttrValue;
use route_planner::network::{NetworkOptions, NetworkProvider, NetworkSource, ResolvedNetwork};
use route_planner::overpass::{OverpassResponse, build_graph};
use route_planner::traits::FixedConnectivity;

use fixtures::{FailingNetwork, SwitchableProbe};

/// Two streets crossing at node 2, plus a service road sharing one segment.
fn overpass_body() -> OverpassResponse {
    serde_json::from_value(json!({
        "version": 0.6,
        "elements": [
            {"type": "node", "id": 1, "lat": 24.8470, "lon": 67.0310},
            {"type": "node", "id": 2, "lat": 24.8480, "lon": 67.0320},
            {"type": "node", "id": 3, "lat": 24.8490, "lon": 67.0330},
            {"type": "node", "id": 4, "lat": 24.8470, "lon": 67.0330},
            {"type": "node", "id": 5, "lat": 24.8490, "lon": 67.0310},
            {"type": "way", "id": 501, "nodes": [1, 2, 3],
             "tags": {"highway": "primary", "name": "Shahrah-e-Faisal"}},
            {"type": "way", "id": 502, "nodes": [4, 2, 5],
             "tags": {"highway": "secondary", "oneway": "yes"}},
            {"type": "way", "id": 503, "nodes": [2, 3],
             "tags": {"highway": "service"}}
        ]
    }))
    .unwrap()
}

fn resolved_network() -> ResolvedNetwork {
    let graph = build_graph(&overpass_body()).unwrap();
    let provider = NetworkProvider::new(
        Arc::new(FailingNetwork),
        Arc::new(FixedConnectivity(true)),
        NetworkOptions::default(),
    );
    let coords = [
        Coordinate::new(24.8471, 67.0311),
        Coordinate::new(24.8489, 67.0329),
        Coordinate::new(24.8471, 67.0329),
    ];
    let assignment = provider.assign(&graph, &coords, &mut StdRng::seed_from_u64(1));
    ResolvedNetwork {
        graph,
        assignment,
        source: NetworkSource::Service,
    }
}

fn graph_key() -> CacheKey {
    CacheKey::new("get_graph_and_nodes")
        .arg("(24.8471, 67.0311)")
        .kwarg("network_type", "drive")
}

#[test]
fn test_overpass_graph_survives_the_cache() {
    let dir = tempdir().unwrap();
    let cache = ResultCache::new(dir.path(), Duration::from_secs(3600), 0.0, Arc::new(FixedConnectivity(true)));
    let network = resolved_network();

    // The service road merged into the primary street between 2 and 3.
    assert_eq!(network.graph.edge_count(), 4);
    assert_eq!(
        network.graph.edge(2, 3).unwrap().attrs["osmid"],
        AttrValue::Set(vec![json!(501), json!(503)])
    );

    cache.store(&graph_key(), &network).unwrap();
    let loaded: ResolvedNetwork = cache.lookup(&graph_key(), Freshness::Strict).unwrap();

    assert_eq!(loaded, network);
    assert_eq!(loaded.assignment.nodes().len(), 3);
}

#[test]
fn test_graph_entry_layout() {
    let dir = tempdir().unwrap();
    let cache = ResultCache::new(dir.path(), Duration::from_secs(3600), 0.0, Arc::new(FixedConnectivity(true)));
    cache.store(&graph_key(), &resolved_network()).unwrap();

    let path = cache.path_for(&graph_key());
    assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("json"));
    let entry: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();

    let [graph, nodes] = entry.as_array().unwrap().as_slice() else {
        panic!("expected [graph, nodes], got {entry}");
    };
    assert_eq!(graph["nodes"]["2"]["x"], json!(67.032));
    assert_eq!(graph["nodes"]["2"]["y"], json!(24.848));
    assert!(graph["edges"][0]["attrs"]["geometry"]["__geometry__"]
        .as_str()
        .unwrap()
        .starts_with("LINESTRING"));
    assert_eq!(nodes.as_array().unwrap().len(), 3);
    assert_eq!(nodes[0]["node"], json!(1));
}

#[test]
fn test_corrupt_entry_is_a_miss() {
    let dir = tempdir().unwrap();
    let cache = ResultCache::new(dir.path(), Duration::from_secs(3600), 0.0, Arc::new(FixedConnectivity(true)));
    fs::write(cache.path_for(&graph_key()), "[{\"nodes\": 3}]").unwrap();

    assert!(cache.lookup::<ResolvedNetwork>(&graph_key(), Freshness::Strict).is_none());

    let recomputed = cache.get_or_insert_with(&graph_key(), Freshness::Strict, resolved_network);
    assert_eq!(recomputed, resolved_network());
    assert!(cache.lookup::<ResolvedNetwork>(&graph_key(), Freshness::Strict).is_some());
}

#[test]
fn test_expired_entries_depend_on_connectivity() {
    let dir = tempdir().unwrap();
    let probe = Arc::new(SwitchableProbe::new(true));
    let cache = ResultCache::new(dir.path(), Duration::ZERO, 0.0, probe.clone());
    cache.store(&graph_key(), &resolved_network()).unwrap();

    assert!(cache.lookup::<ResolvedNetwork>(&graph_key(), Freshness::OfflineTolerant).is_none());

    probe.set_online(false);
    assert!(cache.lookup::<ResolvedNetwork>(&graph_key(), Freshness::OfflineTolerant).is_some());
    assert!(cache.lookup::<ResolvedNetwork>(&graph_key(), Freshness::Strict).is_none());

    assert_eq!(cache.sweep(), 1);
    assert!(cache.lookup::<ResolvedNetwork>(&graph_key(), Freshness::OfflineTolerant).is_none());
}
