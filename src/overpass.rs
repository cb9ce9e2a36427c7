//! Overpass HTTP adapter for road networks.
//!
//! Fetches the OSM ways inside a bounding box and turns every pair of
//! consecutive way nodes into an undirected edge whose length is the
//! great-circle distance between them.

use std::collections::HashMap;
use std::time::Duration;

use geo_types::LineString;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::coordinate::{BoundingBox, Coordinate};
use crate::error::NetworkError;
use crate::graph::{AttrValue, NodeId, RoadEdge, RoadGraph, RoadNode};
use crate::haversine::haversine_m;
use crate::traits::{ConnectivityProbe, NetworkService, NetworkType};

#[derive(Debug, Clone)]
pub struct OverpassConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            url: "https://overpass-api.de/api/interpreter".to_string(),
            timeout_secs: 180,
            user_agent: concat!("route-planner/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverpassClient {
    config: OverpassConfig,
    client: reqwest::blocking::Client,
}

impl OverpassClient {
    pub fn new(config: OverpassConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { config, client })
    }

    fn query(&self, bbox: &BoundingBox, network_type: NetworkType) -> String {
        format!(
            "[out:json][timeout:{}];\n(\n  way[\"highway\"~\"{}\"]({},{},{},{});\n);\n(._;>;);\nout body;",
            self.config.timeout_secs,
            network_type.highway_filter(),
            bbox.min_lat,
            bbox.min_lon,
            bbox.max_lat,
            bbox.max_lon
        )
    }
}

impl NetworkService for OverpassClient {
    fn fetch(&self, bbox: &BoundingBox, network_type: NetworkType) -> Result<RoadGraph, NetworkError> {
        let query = self.query(bbox, network_type);
        debug!(%query, "overpass query");
        info!(
            network_type = %network_type,
            "requesting road network for {:.4},{:.4} to {:.4},{:.4}",
            bbox.min_lat, bbox.min_lon, bbox.max_lat, bbox.max_lon
        );

        let response = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "text/plain")
            .body(query)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Service {
                status: status.as_u16(),
            });
        }

        let body: OverpassResponse = response
            .json()
            .map_err(|err| NetworkError::Parse(err.to_string()))?;
        info!(elements = body.elements.len(), "downloaded road data");

        build_graph(&body)
    }
}

/// Builds an undirected road graph from an Overpass response.
///
/// Parallel segments between the same two nodes collapse into one edge that
/// keeps the shortest length and the union of the way ids.
pub fn build_graph(response: &OverpassResponse) -> Result<RoadGraph, NetworkError> {
    let positions: HashMap<NodeId, Coordinate> = response
        .elements
        .iter()
        .filter(|elem| elem.elem_type == "node")
        .filter_map(|elem| Some((elem.id, Coordinate::new(elem.lat?, elem.lon?))))
        .collect();

    let mut graph = RoadGraph::new();
    let mut ways = 0usize;

    for elem in response.elements.iter().filter(|elem| elem.elem_type == "way") {
        let Some(node_ids) = elem.nodes.as_deref() else {
            continue;
        };
        ways += 1;

        for pair in node_ids.windows(2) {
            let (u, v) = (pair[0], pair[1]);
            if u == v {
                continue;
            }
            let (Some(&from), Some(&to)) = (positions.get(&u), positions.get(&v)) else {
                continue;
            };

            for (id, coord) in [(u, from), (v, to)] {
                if graph.node(id).is_none() {
                    graph.add_node(id, RoadNode::at(coord).with_attr("osmid", json!(id)));
                }
            }

            let edge = segment_edge(elem, from, to);
            match graph.edge_mut(u, v) {
                Some(existing) => merge_parallel(existing, edge),
                None => {
                    graph.add_edge(u, v, edge);
                }
            }
        }
    }

    debug!(
        ways,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "built road graph"
    );

    if graph.edge_count() == 0 {
        return Err(NetworkError::EmptyNetwork);
    }
    Ok(graph)
}

fn segment_edge(way: &OsmElement, from: Coordinate, to: Coordinate) -> RoadEdge {
    let geometry = LineString::from(vec![(from.lon, from.lat), (to.lon, to.lat)]);
    let mut edge = RoadEdge::new(haversine_m(from, to))
        .with_attr("osmid", AttrValue::set([json!(way.id)]))
        .with_attr("geometry", AttrValue::Geometry(geometry.into()));

    if let Some(tags) = &way.tags {
        for key in ["highway", "name", "oneway"] {
            if let Some(value) = tags.get(key) {
                edge.attrs.insert(key.to_string(), AttrValue::Json(value.clone()));
            }
        }
    }
    edge
}

fn merge_parallel(existing: &mut RoadEdge, other: RoadEdge) {
    if let Some(ids) = other.attrs.get("osmid") {
        match existing.attrs.get_mut("osmid") {
            Some(mine) => mine.merge_set(ids),
            None => {
                existing.attrs.insert("osmid".to_string(), ids.clone());
            }
        }
    }
    if other.length < existing.length {
        existing.length = other.length;
        if let Some(geometry) = other.attrs.get("geometry") {
            existing.attrs.insert("geometry".to_string(), geometry.clone());
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OverpassResponse {
    pub elements: Vec<OsmElement>,
}

#[derive(Debug, Deserialize)]
pub struct OsmElement {
    #[serde(rename = "type")]
    pub elem_type: String,
    pub id: i64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub nodes: Option<Vec<i64>>,
    pub tags: Option<serde_json::Map<String, Value>>,
}

/// Connectivity probe that issues `HEAD` requests and reports online as soon
/// as any URL answers.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    urls: Vec<String>,
    client: reqwest::blocking::Client,
}

impl HttpProbe {
    pub fn new(urls: Vec<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { urls, client })
    }
}

impl ConnectivityProbe for HttpProbe {
    fn is_online(&self) -> bool {
        self.urls.iter().any(|url| match self.client.head(url).send() {
            Ok(_) => true,
            Err(err) => {
                debug!(%url, error = %err, "connectivity probe failed");
                false
            }
        })
    }
}
