//! Undirected road graph.
//!
//! Nodes carry a position (`x` = longitude, `y` = latitude) and free-form
//! attributes; edges carry a `length` in meters plus attributes such as the
//! segment geometry. Positions are indexed in an R-tree for nearest-node
//! lookups.

use std::collections::BTreeMap;
use std::hash::Hasher;

use fxhash::{FxHashMap, FxHasher64};
use geo_types::Geometry;
use petgraph::algo::{astar, dijkstra};
use petgraph::graphmap::UnGraphMap;
use petgraph::visit::EdgeRef;
use rstar::RTree;
use rstar::primitives::GeomWithData;

use crate::coordinate::Coordinate;
use crate::haversine::haversine_m;

pub type NodeId = i64;

type IndexedNode = GeomWithData<[f64; 2], NodeId>;

/// Attribute value attached to a node or an edge.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Any plain JSON value.
    Json(serde_json::Value),
    Geometry(Geometry<f64>),
    /// Unordered collection of distinct values, kept in insertion order.
    Set(Vec<serde_json::Value>),
    /// Value only known by its string form.
    Opaque(String),
}

impl AttrValue {
    pub fn set<I>(values: I) -> Self
    where
        I: IntoIterator<Item = serde_json::Value>,
    {
        let mut distinct = Vec::new();
        for value in values {
            if !distinct.contains(&value) {
                distinct.push(value);
            }
        }
        AttrValue::Set(distinct)
    }

    /// Adds the members of `other` to this set. Non-set values are replaced.
    pub fn merge_set(&mut self, other: &AttrValue) {
        match (self, other) {
            (AttrValue::Set(mine), AttrValue::Set(theirs)) => {
                for value in theirs {
                    if !mine.contains(value) {
                        mine.push(value.clone());
                    }
                }
            }
            (mine, theirs) => *mine = theirs.clone(),
        }
    }
}

impl From<serde_json::Value> for AttrValue {
    fn from(value: serde_json::Value) -> Self {
        AttrValue::Json(value)
    }
}

pub type Attributes = BTreeMap<String, AttrValue>;

#[derive(Debug, Clone, PartialEq)]
pub struct RoadNode {
    pub x: f64,
    pub y: f64,
    pub attrs: Attributes,
}

impl RoadNode {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            attrs: Attributes::new(),
        }
    }

    pub fn at(coord: Coordinate) -> Self {
        Self::new(coord.lon, coord.lat)
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn position(&self) -> Coordinate {
        Coordinate::new(self.y, self.x)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoadEdge {
    /// Meters.
    pub length: f64,
    pub attrs: Attributes,
}

impl RoadEdge {
    pub fn new(length: f64) -> Self {
        Self {
            length,
            attrs: Attributes::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }
}

/// Road network for one bounding region. Built once, then shared read-only.
#[derive(Clone, Default)]
pub struct RoadGraph {
    graph: UnGraphMap<NodeId, RoadEdge>,
    nodes: FxHashMap<NodeId, RoadNode>,
    index: RTree<IndexedNode>,
}

impl std::fmt::Debug for RoadGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RoadGraph with {} nodes and {} edges",
            self.node_count(),
            self.edge_count()
        )
    }
}

impl PartialEq for RoadGraph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
            && self.edge_count() == other.edge_count()
            && self
                .edges()
                .all(|(u, v, edge)| other.edge(u, v) == Some(edge))
    }
}

impl RoadGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete graph over the coordinates themselves, with node ids
    /// `0..n` and straight-line edge lengths. Used when no road data is
    /// available.
    pub fn complete(coords: &[Coordinate]) -> Self {
        let mut graph = Self::new();
        for (id, coord) in coords.iter().enumerate() {
            graph.add_node(id as NodeId, RoadNode::at(*coord));
        }
        for i in 0..coords.len() {
            for j in i + 1..coords.len() {
                let edge = RoadEdge::new(haversine_m(coords[i], coords[j]));
                graph.add_edge(i as NodeId, j as NodeId, edge);
            }
        }
        graph
    }

    /// Inserts or replaces a node.
    pub fn add_node(&mut self, id: NodeId, node: RoadNode) {
        if let Some(previous) = self.nodes.get(&id) {
            self.index.remove(&GeomWithData::new([previous.x, previous.y], id));
        }
        self.index.insert(GeomWithData::new([node.x, node.y], id));
        self.nodes.insert(id, node);
        self.graph.add_node(id);
    }

    /// Inserts an edge between two existing nodes, returning the edge it
    /// replaced.
    pub fn add_edge(&mut self, u: NodeId, v: NodeId, edge: RoadEdge) -> Option<RoadEdge> {
        debug_assert!(self.nodes.contains_key(&u) && self.nodes.contains_key(&v));
        self.graph.add_edge(u, v, edge)
    }

    pub fn node(&self, id: NodeId) -> Option<&RoadNode> {
        self.nodes.get(&id)
    }

    pub fn edge(&self, u: NodeId, v: NodeId) -> Option<&RoadEdge> {
        self.graph.edge_weight(u, v)
    }

    pub fn edge_mut(&mut self, u: NodeId, v: NodeId) -> Option<&mut RoadEdge> {
        self.graph.edge_weight_mut(u, v)
    }

    #[inline]
    pub fn position(&self, id: NodeId) -> Option<Coordinate> {
        self.nodes.get(&id).map(RoadNode::position)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &RoadNode)> {
        self.nodes.iter().map(|(id, node)| (*id, node))
    }

    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId, &RoadEdge)> {
        self.graph.all_edges()
    }

    /// Node closest to `coord` in degree space.
    pub fn nearest_node(&self, coord: Coordinate) -> Option<NodeId> {
        self.index
            .nearest_neighbor(&[coord.lon, coord.lat])
            .map(|entry| entry.data)
    }

    /// Shortest road distance in meters from `source` to every reachable node.
    pub fn shortest_path_lengths(&self, source: NodeId) -> FxHashMap<NodeId, f64> {
        if !self.graph.contains_node(source) {
            return FxHashMap::default();
        }
        dijkstra(&self.graph, source, None, |edge| edge.weight().length)
            .into_iter()
            .collect()
    }

    /// Shortest path by length, as `(meters, nodes)` including both ends.
    pub fn shortest_path(&self, from: NodeId, to: NodeId) -> Option<(f64, Vec<NodeId>)> {
        if !self.graph.contains_node(from) || !self.graph.contains_node(to) {
            return None;
        }
        astar(
            &self.graph,
            from,
            |node| node == to,
            |edge| edge.weight().length,
            |_| 0.0,
        )
    }

    /// Content hash over node ids, positions and edge lengths. Independent of
    /// insertion order.
    pub fn fingerprint(&self) -> u64 {
        let mut nodes: Vec<(NodeId, &RoadNode)> = self.nodes().collect();
        nodes.sort_unstable_by_key(|(id, _)| *id);

        let mut edges: Vec<(NodeId, NodeId, f64)> = self
            .edges()
            .map(|(u, v, edge)| (u.min(v), u.max(v), edge.length))
            .collect();
        edges.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut hasher = FxHasher64::default();
        hasher.write_usize(nodes.len());
        for (id, node) in nodes {
            hasher.write_i64(id);
            hasher.write_u64(node.x.to_bits());
            hasher.write_u64(node.y.to_bits());
        }
        hasher.write_usize(edges.len());
        for (u, v, length) in edges {
            hasher.write_i64(u);
            hasher.write_i64(v);
            hasher.write_u64(length.to_bits());
        }
        hasher.finish()
    }
}
