//! Road network acquisition and coordinate-to-node resolution.

use std::fmt;
use std::sync::Arc;

use fxhash::FxHashSet;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::coordinate::{BoundingBox, Coordinate};
use crate::graph::{NodeId, RoadGraph};
use crate::traits::{ConnectivityProbe, NetworkService, NetworkType};

#[derive(Debug, Clone)]
pub struct NetworkOptions {
    /// Padding around the input coordinates, in degrees.
    pub buffer_degrees: f64,
    /// Jitter added per retry when a nearest node is already taken.
    pub jitter_base_degrees: f64,
    pub max_jitter_attempts: usize,
    /// Scale of the offset applied once the retries are exhausted.
    pub forced_offset_degrees: f64,
    pub network_type: NetworkType,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            buffer_degrees: 0.003,
            jitter_base_degrees: 0.00008,
            max_jitter_attempts: 20,
            forced_offset_degrees: 0.0001,
            network_type: NetworkType::Drive,
        }
    }
}

/// Where a resolved graph came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkSource {
    Service,
    /// Complete graph over the input coordinates, built when no road data
    /// was available.
    Synthetic,
}

/// Graph node for one input coordinate.
///
/// `offset` is only set when the coordinate could not get a node of its own
/// and shares one with an earlier coordinate. It displaces this assignment's
/// position as `[d_lon, d_lat]` without touching the shared node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssignedNode {
    pub node: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<[f64; 2]>,
}

impl AssignedNode {
    pub fn new(node: NodeId) -> Self {
        Self { node, offset: None }
    }
}

impl fmt::Display for AssignedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            None => write!(f, "{}", self.node),
            Some([dx, dy]) => write!(f, "{}{:+}{:+}", self.node, dx, dy),
        }
    }
}

/// One graph node per input coordinate, in input order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAssignment(Vec<AssignedNode>);

impl NodeAssignment {
    pub fn new(nodes: Vec<AssignedNode>) -> Self {
        Self(nodes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn node(&self, index: usize) -> NodeId {
        self.0[index].node
    }

    /// Position of the assigned node, displaced by this assignment's offset.
    pub fn position(&self, index: usize, graph: &RoadGraph) -> Option<Coordinate> {
        let assigned = self.0.get(index)?;
        let base = graph.position(assigned.node)?;
        Some(match assigned.offset {
            Some([dx, dy]) => base.offset(dy, dx),
            None => base,
        })
    }

    pub fn nodes(&self) -> &[AssignedNode] {
        &self.0
    }

    pub fn into_nodes(self) -> Vec<AssignedNode> {
        self.0
    }
}

impl fmt::Display for NodeAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, assigned) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{assigned}")?;
        }
        f.write_str("]")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNetwork {
    pub graph: RoadGraph,
    pub assignment: NodeAssignment,
    pub source: NetworkSource,
}

/// Resolves coordinates to a road graph and one node per coordinate.
#[derive(Clone)]
pub struct NetworkProvider {
    service: Arc<dyn NetworkService>,
    probe: Arc<dyn ConnectivityProbe>,
    options: NetworkOptions,
}

impl fmt::Debug for NetworkProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkProvider")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl NetworkProvider {
    pub fn new(
        service: Arc<dyn NetworkService>,
        probe: Arc<dyn ConnectivityProbe>,
        options: NetworkOptions,
    ) -> Self {
        Self {
            service,
            probe,
            options,
        }
    }

    pub fn options(&self) -> &NetworkOptions {
        &self.options
    }

    pub fn probe(&self) -> &Arc<dyn ConnectivityProbe> {
        &self.probe
    }

    /// Fetches the road network around `coords` and assigns a node to each.
    ///
    /// Never fails: when the service is unreachable or returns nothing, the
    /// result is a synthetic complete graph over the coordinates.
    pub fn resolve<R: Rng + ?Sized>(&self, coords: &[Coordinate], rng: &mut R) -> ResolvedNetwork {
        let Some(bbox) = BoundingBox::around(coords, self.options.buffer_degrees) else {
            return synthesize(coords);
        };

        if !self.probe.is_online() {
            info!("network unreachable, using straight-line graph");
            return synthesize(coords);
        }

        match self.service.fetch(&bbox, self.options.network_type) {
            Ok(graph) => {
                let assignment = self.assign(&graph, coords, rng);
                if assignment.len() < coords.len() {
                    warn!(
                        nodes = graph.node_count(),
                        assigned = assignment.len(),
                        coords = coords.len(),
                        "road network has no usable nodes, using straight-line graph"
                    );
                    return synthesize(coords);
                }
                ResolvedNetwork {
                    graph,
                    assignment,
                    source: NetworkSource::Service,
                }
            }
            Err(err) => {
                warn!(error = %err, "road network unavailable, using straight-line graph");
                synthesize(coords)
            }
        }
    }

    /// Assigns each coordinate the nearest node not already taken.
    pub fn assign<R: Rng + ?Sized>(
        &self,
        graph: &RoadGraph,
        coords: &[Coordinate],
        rng: &mut R,
    ) -> NodeAssignment {
        let mut taken = FxHashSet::default();
        let nodes = coords
            .iter()
            .enumerate()
            .filter_map(|(index, coord)| {
                let assigned = self.assign_one(graph, index, *coord, &taken, rng)?;
                taken.insert(assigned.node);
                Some(assigned)
            })
            .collect();
        NodeAssignment(nodes)
    }

    fn assign_one<R: Rng + ?Sized>(
        &self,
        graph: &RoadGraph,
        index: usize,
        coord: Coordinate,
        taken: &FxHashSet<NodeId>,
        rng: &mut R,
    ) -> Option<AssignedNode> {
        let nearest = graph.nearest_node(coord)?;
        if !taken.contains(&nearest) {
            return Some(AssignedNode::new(nearest));
        }

        let base = self.options.jitter_base_degrees;
        for attempt in 1..=self.options.max_jitter_attempts {
            let scale = base * attempt as f64;
            let jittered = coord.offset(
                (rng.random::<f64>() - 0.5) * scale,
                (rng.random::<f64>() - 0.5) * scale,
            );
            if let Some(node) = graph.nearest_node(jittered)
                && !taken.contains(&node)
            {
                debug!(index, attempt, node, "resolved duplicate node by jitter");
                return Some(AssignedNode::new(node));
            }
        }

        let magnitude =
            (self.options.max_jitter_attempts + 1) as f64 * self.options.forced_offset_degrees;
        let offset = [
            magnitude * rng.random::<f64>(),
            magnitude * rng.random::<f64>(),
        ];
        warn!(
            index,
            node = nearest,
            attempts = self.options.max_jitter_attempts,
            "could not find a free node, sharing it with a displaced position"
        );
        Some(AssignedNode {
            node: nearest,
            offset: Some(offset),
        })
    }
}

/// Complete graph over the coordinates with node ids `0..n`.
pub fn synthesize(coords: &[Coordinate]) -> ResolvedNetwork {
    let assignment = (0..coords.len())
        .map(|i| AssignedNode::new(i as NodeId))
        .collect();
    ResolvedNetwork {
        graph: RoadGraph::complete(coords),
        assignment: NodeAssignment(assignment),
        source: NetworkSource::Synthetic,
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::error::NetworkError;
    use crate::graph::RoadNode;
    use crate::traits::FixedConnectivity;

    struct Failing;

    impl NetworkService for Failing {
        fn fetch(&self, _: &BoundingBox, _: NetworkType) -> Result<RoadGraph, NetworkError> {
            Err(NetworkError::EmptyNetwork)
        }
    }

    struct NoNodes;

    impl NetworkService for NoNodes {
        fn fetch(&self, _: &BoundingBox, _: NetworkType) -> Result<RoadGraph, NetworkError> {
            Ok(RoadGraph::new())
        }
    }

    struct OneNode;

    impl NetworkService for OneNode {
        fn fetch(&self, _: &BoundingBox, _: NetworkType) -> Result<RoadGraph, NetworkError> {
            let mut graph = RoadGraph::new();
            graph.add_node(500, RoadNode::new(67.032, 24.848));
            Ok(graph)
        }
    }

    fn coords() -> Vec<Coordinate> {
        vec![
            Coordinate::new(24.848, 67.032),
            Coordinate::new(24.850, 67.034),
            Coordinate::new(24.846, 67.030),
        ]
    }

    #[test]
    fn test_service_error_synthesizes_graph() {
        let provider = NetworkProvider::new(
            Arc::new(Failing),
            Arc::new(FixedConnectivity(true)),
            NetworkOptions::default(),
        );
        let resolved = provider.resolve(&coords(), &mut StdRng::seed_from_u64(1));

        assert_eq!(resolved.source, NetworkSource::Synthetic);
        assert_eq!(resolved.graph.node_count(), 3);
        let ids: Vec<NodeId> = resolved.assignment.nodes().iter().map(|a| a.node).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_graph_synthesizes() {
        let provider = NetworkProvider::new(
            Arc::new(NoNodes),
            Arc::new(FixedConnectivity(true)),
            NetworkOptions::default(),
        );
        let resolved = provider.resolve(&coords(), &mut StdRng::seed_from_u64(1));

        assert_eq!(resolved.source, NetworkSource::Synthetic);
        assert_eq!(resolved.assignment.len(), 3);
        assert_eq!(resolved.graph.node_count(), 3);
    }

    #[test]
    fn test_offline_skips_service() {
        let provider = NetworkProvider::new(
            Arc::new(OneNode),
            Arc::new(FixedConnectivity(false)),
            NetworkOptions::default(),
        );
        let resolved = provider.resolve(&coords(), &mut StdRng::seed_from_u64(1));
        assert_eq!(resolved.source, NetworkSource::Synthetic);
    }

    #[test]
    fn test_single_node_forces_offsets() {
        let provider = NetworkProvider::new(
            Arc::new(OneNode),
            Arc::new(FixedConnectivity(true)),
            NetworkOptions::default(),
        );
        let resolved = provider.resolve(&coords(), &mut StdRng::seed_from_u64(7));

        assert_eq!(resolved.source, NetworkSource::Service);
        let nodes = resolved.assignment.nodes();
        assert_eq!(nodes.len(), 3);
        assert!(nodes.iter().all(|a| a.node == 500));
        assert!(nodes[0].offset.is_none());
        assert!(nodes[1].offset.is_some() && nodes[2].offset.is_some());

        // The shared node itself keeps its position.
        assert_eq!(
            resolved.graph.position(500),
            Some(Coordinate::new(24.848, 67.032))
        );
        let displaced = resolved.assignment.position(1, &resolved.graph).unwrap();
        assert_ne!(displaced, Coordinate::new(24.848, 67.032));
    }

    #[test]
    fn test_assignment_display() {
        let assignment = NodeAssignment::new(vec![
            AssignedNode::new(4),
            AssignedNode {
                node: 4,
                offset: Some([0.5, -0.25]),
            },
        ]);
        assert_eq!(assignment.to_string(), "[4,4+0.5-0.25]");
    }
}
