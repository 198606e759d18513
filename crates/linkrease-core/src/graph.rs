use crate::geom::Point;
use crate::id::*;
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::{HashMap, VecDeque};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during graph operations.
///
/// These are precondition violations (a bad id, a disconnected graph), not
/// gameplay outcomes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),
    #[error("no edge between {0:?} and {1:?}")]
    EdgeNotFound(NodeId, NodeId),
    #[error("edge between {0:?} and {1:?} already exists")]
    DuplicateEdge(NodeId, NodeId),
    #[error("cannot connect {0:?} to itself")]
    SelfLoop(NodeId),
    #[error("no path from {from:?} to {to:?}")]
    NoPath { from: NodeId, to: NodeId },
}

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// Travel class of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Standard lane.
    Link,
    /// Fast lane.
    Crease,
}

/// Presentation class of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Node,
    Factory,
}

// ---------------------------------------------------------------------------
// Core data structures
// ---------------------------------------------------------------------------

/// Per-node data stored in the world graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Fixed at construction.
    pub position: Point,
    pub owner: PlayerId,
    pub garrison: u32,
    /// Factories passively reinforce. Modeled, not yet simulated.
    pub factory: bool,
}

impl NodeData {
    /// An unclaimed, empty, non-factory node.
    pub fn new(position: Point) -> Self {
        Self {
            position,
            owner: PlayerId::NEUTRAL,
            garrison: 0,
            factory: false,
        }
    }
}

/// Per-edge data stored in the world graph. Edges are undirected: `a` and
/// `b` only record construction order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub a: NodeId,
    pub b: NodeId,
    pub creased: bool,
    /// `distance(a, b)`, scaled by the crease ratio when creased.
    pub weight: f64,
    pub highlighted: bool,
}

impl EdgeData {
    pub fn kind(&self) -> EdgeKind {
        if self.creased {
            EdgeKind::Crease
        } else {
            EdgeKind::Link
        }
    }
}

// ---------------------------------------------------------------------------
// WorldGraph
// ---------------------------------------------------------------------------

/// Undirected weighted graph of nodes (planets) and edges (lanes).
///
/// Every attribute is initialised when its node or edge is created, so all
/// getters are pure reads. Nodes and edges are never removed, which keeps
/// iteration in construction order.
#[derive(Debug, Clone)]
pub struct WorldGraph {
    nodes: SlotMap<NodeId, NodeData>,
    edges: SlotMap<EdgeId, EdgeData>,
    /// Neighbour lists, keyed in sync with `nodes`.
    adjacency: SecondaryMap<NodeId, Vec<(NodeId, EdgeId)>>,
    /// Both orientations of every edge.
    lookup: HashMap<(NodeId, NodeId), EdgeId>,
    /// Weight multiplier for creased edges.
    crease_ratio: f64,
}

impl WorldGraph {
    /// Create an empty graph. `crease_ratio` scales the weight of creased
    /// edges and is expected to be below 1.
    pub fn new(crease_ratio: f64) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            edges: SlotMap::with_key(),
            adjacency: SecondaryMap::new(),
            lookup: HashMap::new(),
            crease_ratio,
        }
    }

    pub fn crease_ratio(&self) -> f64 {
        self.crease_ratio
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Add an unclaimed node at `position`.
    pub fn add_node(&mut self, position: Point) -> NodeId {
        self.add_node_with(NodeData::new(position))
    }

    /// Add a node with explicit starting attributes.
    pub fn add_node_with(&mut self, data: NodeData) -> NodeId {
        let id = self.nodes.insert(data);
        self.adjacency.insert(id, Vec::new());
        id
    }

    /// Connect two nodes with an uncreased, unhighlighted edge.
    pub fn connect(&mut self, a: NodeId, b: NodeId) -> Result<EdgeId, GraphError> {
        if a == b {
            return Err(GraphError::SelfLoop(a));
        }
        let weight = self.node(a)?.position.distance(&self.node(b)?.position);
        if self.lookup.contains_key(&(a, b)) {
            return Err(GraphError::DuplicateEdge(a, b));
        }

        let edge = self.edges.insert(EdgeData {
            a,
            b,
            creased: false,
            weight,
            highlighted: false,
        });
        self.lookup.insert((a, b), edge);
        self.lookup.insert((b, a), edge);
        if let Some(adj) = self.adjacency.get_mut(a) {
            adj.push((b, edge));
        }
        if let Some(adj) = self.adjacency.get_mut(b) {
            adj.push((a, edge));
        }
        Ok(edge)
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    pub fn node(&self, node: NodeId) -> Result<&NodeData, GraphError> {
        self.nodes.get(node).ok_or(GraphError::NodeNotFound(node))
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut NodeData, GraphError> {
        self.nodes.get_mut(node).ok_or(GraphError::NodeNotFound(node))
    }

    /// The edge joining `n1` and `n2`, in either orientation.
    pub fn edge_between(&self, n1: NodeId, n2: NodeId) -> Result<EdgeId, GraphError> {
        self.node(n1)?;
        self.node(n2)?;
        self.lookup
            .get(&(n1, n2))
            .copied()
            .ok_or(GraphError::EdgeNotFound(n1, n2))
    }

    pub fn edge(&self, n1: NodeId, n2: NodeId) -> Result<&EdgeData, GraphError> {
        let id = self.edge_between(n1, n2)?;
        self.edges.get(id).ok_or(GraphError::EdgeNotFound(n1, n2))
    }

    fn edge_mut(&mut self, n1: NodeId, n2: NodeId) -> Result<&mut EdgeData, GraphError> {
        let id = self.edge_between(n1, n2)?;
        self.edges.get_mut(id).ok_or(GraphError::EdgeNotFound(n1, n2))
    }

    pub fn edge_by_id(&self, edge: EdgeId) -> Option<&EdgeData> {
        self.edges.get(edge)
    }

    /// Neighbours of `node` with the connecting edge.
    pub fn neighbors(&self, node: NodeId) -> Result<&[(NodeId, EdgeId)], GraphError> {
        self.adjacency
            .get(node)
            .map(Vec::as_slice)
            .ok_or(GraphError::NodeNotFound(node))
    }

    /// All nodes in construction order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeData)> {
        self.nodes.iter()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys()
    }

    /// All edges in construction order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &EdgeData)> {
        self.edges.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    // -----------------------------------------------------------------------
    // Node attributes
    // -----------------------------------------------------------------------

    pub fn position(&self, node: NodeId) -> Result<Point, GraphError> {
        Ok(self.node(node)?.position)
    }

    pub fn owner(&self, node: NodeId) -> Result<PlayerId, GraphError> {
        Ok(self.node(node)?.owner)
    }

    pub fn set_owner(&mut self, node: NodeId, player: PlayerId) -> Result<(), GraphError> {
        self.node_mut(node)?.owner = player;
        Ok(())
    }

    pub fn garrison(&self, node: NodeId) -> Result<u32, GraphError> {
        Ok(self.node(node)?.garrison)
    }

    pub fn set_garrison(&mut self, node: NodeId, garrison: u32) -> Result<(), GraphError> {
        self.node_mut(node)?.garrison = garrison;
        Ok(())
    }

    pub fn factory(&self, node: NodeId) -> Result<bool, GraphError> {
        Ok(self.node(node)?.factory)
    }

    pub fn set_factory(&mut self, node: NodeId, factory: bool) -> Result<(), GraphError> {
        self.node_mut(node)?.factory = factory;
        Ok(())
    }

    pub fn node_kind(&self, node: NodeId) -> Result<NodeKind, GraphError> {
        Ok(if self.factory(node)? {
            NodeKind::Factory
        } else {
            NodeKind::Node
        })
    }

    // -----------------------------------------------------------------------
    // Edge attributes
    // -----------------------------------------------------------------------

    pub fn creased(&self, n1: NodeId, n2: NodeId) -> Result<bool, GraphError> {
        Ok(self.edge(n1, n2)?.creased)
    }

    /// Set the crease flag and recompute the edge weight.
    pub fn set_creased(&mut self, n1: NodeId, n2: NodeId, creased: bool) -> Result<(), GraphError> {
        let distance = self.position(n1)?.distance(&self.position(n2)?);
        let ratio = if creased { self.crease_ratio } else { 1.0 };
        let edge = self.edge_mut(n1, n2)?;
        edge.creased = creased;
        edge.weight = distance * ratio;
        Ok(())
    }

    pub fn weight(&self, n1: NodeId, n2: NodeId) -> Result<f64, GraphError> {
        Ok(self.edge(n1, n2)?.weight)
    }

    pub fn edge_kind(&self, n1: NodeId, n2: NodeId) -> Result<EdgeKind, GraphError> {
        Ok(self.edge(n1, n2)?.kind())
    }

    pub fn highlighted(&self, n1: NodeId, n2: NodeId) -> Result<bool, GraphError> {
        Ok(self.edge(n1, n2)?.highlighted)
    }

    pub fn set_highlight(
        &mut self,
        n1: NodeId,
        n2: NodeId,
        highlighted: bool,
    ) -> Result<(), GraphError> {
        self.edge_mut(n1, n2)?.highlighted = highlighted;
        Ok(())
    }

    /// Clear the highlight flag on every edge.
    pub fn clear_highlights(&mut self) {
        for edge in self.edges.values_mut() {
            edge.highlighted = false;
        }
    }

    // -----------------------------------------------------------------------
    // Spatial queries
    // -----------------------------------------------------------------------

    /// Nearest node to a point by squared distance. Ties go to the node
    /// visited last in construction order. `None` on an empty graph.
    pub fn closest_node_to(&self, point: Point) -> Option<NodeId> {
        let mut best: Option<(NodeId, f64)> = None;
        for (id, node) in &self.nodes {
            let dist = node.position.distance_squared(&point);
            match best {
                Some((_, best_dist)) if dist > best_dist => {}
                _ => best = Some((id, dist)),
            }
        }
        best.map(|(id, _)| id)
    }

    /// Returns `true` when every node is reachable from every other.
    /// An empty graph counts as connected.
    pub fn is_connected(&self) -> bool {
        let Some(start) = self.nodes.keys().next() else {
            return true;
        };
        let mut seen: SecondaryMap<NodeId, ()> = SecondaryMap::new();
        let mut queue = VecDeque::from([start]);
        seen.insert(start, ());
        while let Some(node) = queue.pop_front() {
            for &(next, _) in self.adjacency.get(node).into_iter().flatten() {
                if seen.insert(next, ()).is_none() {
                    queue.push_back(next);
                }
            }
        }
        seen.len() == self.nodes.len()
    }
}
