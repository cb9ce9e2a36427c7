//! JSON document form of a [`RoadGraph`].
//!
//! Plain JSON attributes are stored as-is. Geometries become
//! `{"__geometry__": "<WKT>"}`, sets become `{"__set__": [...]}` and opaque
//! values become `{"__object__": "<string form>"}`. Node positions are stored
//! as the `x`/`y` node attributes and edge lengths as the `length` edge
//! attribute.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use wkt::{ToWkt, TryFromWkt};

use crate::error::CacheError;
use crate::graph::{AttrValue, Attributes, NodeId, RoadEdge, RoadGraph, RoadNode};

const GEOMETRY_TAG: &str = "__geometry__";
const SET_TAG: &str = "__set__";
const OBJECT_TAG: &str = "__object__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: BTreeMap<String, Map<String, Value>>,
    pub edges: Vec<EdgeDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDocument {
    pub u: String,
    pub v: String,
    pub attrs: Map<String, Value>,
}

pub fn to_document(graph: &RoadGraph) -> GraphDocument {
    let nodes = graph
        .nodes()
        .map(|(id, node)| {
            let mut attrs = encode_attrs(&node.attrs);
            attrs.insert("x".to_string(), Value::from(node.x));
            attrs.insert("y".to_string(), Value::from(node.y));
            (id.to_string(), attrs)
        })
        .collect();

    let edges = graph
        .edges()
        .map(|(u, v, edge)| {
            let mut attrs = encode_attrs(&edge.attrs);
            attrs.insert("length".to_string(), Value::from(edge.length));
            EdgeDocument {
                u: u.to_string(),
                v: v.to_string(),
                attrs,
            }
        })
        .collect();

    GraphDocument { nodes, edges }
}

pub fn from_document(document: &GraphDocument) -> Result<RoadGraph, CacheError> {
    let mut graph = RoadGraph::new();

    for (id, attrs) in &document.nodes {
        let id = parse_node_id(id)?;
        let mut attrs = decode_attrs(attrs)?;
        let x = take_number(&mut attrs, "x")?;
        let y = take_number(&mut attrs, "y")?;
        graph.add_node(id, RoadNode { x, y, attrs });
    }

    for edge in &document.edges {
        let u = parse_node_id(&edge.u)?;
        let v = parse_node_id(&edge.v)?;
        if graph.node(u).is_none() || graph.node(v).is_none() {
            return Err(CacheError::Shape(format!(
                "edge {u}-{v} references an unknown node"
            )));
        }
        let mut attrs = decode_attrs(&edge.attrs)?;
        let length = take_number(&mut attrs, "length")?;
        graph.add_edge(u, v, RoadEdge { length, attrs });
    }

    Ok(graph)
}

fn encode_attrs(attrs: &Attributes) -> Map<String, Value> {
    attrs
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

fn encode_value(value: &AttrValue) -> Value {
    match value {
        AttrValue::Json(value) => value.clone(),
        AttrValue::Geometry(geometry) => tagged(GEOMETRY_TAG, Value::String(geometry.wkt_string())),
        AttrValue::Set(values) => tagged(SET_TAG, Value::Array(values.clone())),
        AttrValue::Opaque(text) => tagged(OBJECT_TAG, Value::String(text.clone())),
    }
}

fn tagged(tag: &str, value: Value) -> Value {
    let mut object = Map::with_capacity(1);
    object.insert(tag.to_string(), value);
    Value::Object(object)
}

fn decode_attrs(attrs: &Map<String, Value>) -> Result<Attributes, CacheError> {
    attrs
        .iter()
        .map(|(key, value)| Ok((key.clone(), decode_value(value)?)))
        .collect()
}

fn decode_value(value: &Value) -> Result<AttrValue, CacheError> {
    let Value::Object(object) = value else {
        return Ok(AttrValue::Json(value.clone()));
    };
    if object.len() != 1 {
        return Ok(AttrValue::Json(value.clone()));
    }

    match object.iter().next() {
        Some((tag, Value::String(text))) if tag == GEOMETRY_TAG => {
            geo_types::Geometry::<f64>::try_from_wkt_str(text)
                .map(AttrValue::Geometry)
                .map_err(|err| CacheError::Geometry(err.to_string()))
        }
        Some((tag, Value::Array(values))) if tag == SET_TAG => Ok(AttrValue::Set(values.clone())),
        Some((tag, Value::String(text))) if tag == OBJECT_TAG => Ok(AttrValue::Opaque(text.clone())),
        _ => Ok(AttrValue::Json(value.clone())),
    }
}

fn parse_node_id(id: &str) -> Result<NodeId, CacheError> {
    id.parse()
        .map_err(|_| CacheError::Shape(format!("node id `{id}` is not an integer")))
}

fn take_number(attrs: &mut Attributes, key: &str) -> Result<f64, CacheError> {
    match attrs.remove(key) {
        Some(AttrValue::Json(value)) => value
            .as_f64()
            .ok_or_else(|| CacheError::Shape(format!("`{key}` is not a number"))),
        _ => Err(CacheError::Shape(format!("missing numeric `{key}`"))),
    }
}
