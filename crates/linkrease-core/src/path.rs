//! Weighted shortest paths over live edge weights.
//!
//! Nothing is cached: crease changes alter weights between queries, and
//! fleets re-route at every hop by asking again.

use crate::geom::Point;
use crate::graph::{EdgeKind, GraphError, WorldGraph};
use crate::id::NodeId;
use slotmap::SecondaryMap;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Read-only view of the world that a fleet needs while travelling.
pub trait RouteView {
    /// Weighted shortest path, inclusive of both endpoints.
    fn shortest_path(&self, source: NodeId, target: NodeId) -> Result<Vec<NodeId>, GraphError>;
    fn weight(&self, n1: NodeId, n2: NodeId) -> Result<f64, GraphError>;
    fn edge_kind(&self, n1: NodeId, n2: NodeId) -> Result<EdgeKind, GraphError>;
    fn position(&self, node: NodeId) -> Result<Point, GraphError>;
}

impl RouteView for WorldGraph {
    fn shortest_path(&self, source: NodeId, target: NodeId) -> Result<Vec<NodeId>, GraphError> {
        shortest_path(self, source, target)
    }

    fn weight(&self, n1: NodeId, n2: NodeId) -> Result<f64, GraphError> {
        WorldGraph::weight(self, n1, n2)
    }

    fn edge_kind(&self, n1: NodeId, n2: NodeId) -> Result<EdgeKind, GraphError> {
        WorldGraph::edge_kind(self, n1, n2)
    }

    fn position(&self, node: NodeId) -> Result<Point, GraphError> {
        WorldGraph::position(self, node)
    }
}

/// Path cost with a total order so it can live in a `BinaryHeap`.
/// Weights are never negative or NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Cost(f64);

impl Eq for Cost {}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Dijkstra from `source` to `target`. Returns the node sequence including
/// both endpoints; `[source]` when they are equal.
///
/// # Errors
///
/// [`GraphError::NodeNotFound`] for unknown ids, [`GraphError::NoPath`] when
/// `target` is unreachable.
pub fn shortest_path(
    graph: &WorldGraph,
    source: NodeId,
    target: NodeId,
) -> Result<Vec<NodeId>, GraphError> {
    graph.node(source)?;
    graph.node(target)?;
    if source == target {
        return Ok(vec![source]);
    }

    let mut best: SecondaryMap<NodeId, f64> = SecondaryMap::new();
    let mut came_from: SecondaryMap<NodeId, NodeId> = SecondaryMap::new();
    let mut frontier = BinaryHeap::new();

    best.insert(source, 0.0);
    frontier.push(Reverse((Cost(0.0), source)));

    while let Some(Reverse((Cost(cost), current))) = frontier.pop() {
        if current == target {
            let mut path = vec![current];
            let mut node = current;
            while let Some(&prev) = came_from.get(node) {
                path.push(prev);
                node = prev;
            }
            path.reverse();
            return Ok(path);
        }
        // Stale heap entry.
        if best.get(current).is_some_and(|&b| cost > b) {
            continue;
        }

        for &(next, edge) in graph.neighbors(current)? {
            let Some(data) = graph.edge_by_id(edge) else {
                continue;
            };
            let next_cost = cost + data.weight;
            if best.get(next).is_none_or(|&b| next_cost < b) {
                best.insert(next, next_cost);
                came_from.insert(next, current);
                frontier.push(Reverse((Cost(next_cost), next)));
            }
        }
    }

    Err(GraphError::NoPath {
        from: source,
        to: target,
    })
}

/// Sum of edge weights along `path`.
pub fn path_length(graph: &WorldGraph, path: &[NodeId]) -> Result<f64, GraphError> {
    path.windows(2)
        .map(|hop| graph.weight(hop[0], hop[1]))
        .sum()
}
