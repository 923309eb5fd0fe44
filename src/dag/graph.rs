// src/dag/graph.rs

//! Validated, immutable task graph.
//!
//! Nodes live in an arena indexed by [`NodeId`]; every edge list is stored
//! as indices so the scheduler can read the graph from any thread.

use std::collections::HashMap;

use crate::dag::node::TaskNode;
use crate::errors::Result;

/// Index of a node in the graph arena.
pub type NodeId = usize;

#[derive(Debug)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<String, NodeId>,
    /// `dependsOn` predecessors.
    depends_on: Vec<Vec<NodeId>>,
    /// Reverse of `depends_on`.
    dependents: Vec<Vec<NodeId>>,
    /// `mustRunAfter` and `shouldRunAfter` predecessors.
    ordering_preds: Vec<Vec<NodeId>>,
    /// Nodes this node finalizes.
    finalizes: Vec<Vec<NodeId>>,
    /// Nodes declared in this node's `finalizedBy`.
    finalizers: Vec<Vec<NodeId>>,
    topo_order: Vec<NodeId>,
    topo_rank: Vec<usize>,
}

/// Resolved edge lists, produced by validation.
#[derive(Debug, Default)]
pub(crate) struct ResolvedEdges {
    pub depends_on: Vec<Vec<NodeId>>,
    pub ordering_preds: Vec<Vec<NodeId>>,
    pub finalizers: Vec<Vec<NodeId>>,
}

impl TaskGraph {
    /// Validate the nodes and build the graph.
    ///
    /// Fails with a configuration error on duplicate nodes, unknown edge
    /// targets, invalid properties or cycles.
    pub fn build(nodes: Vec<TaskNode>) -> Result<Self> {
        Self::try_from(nodes)
    }

    pub(crate) fn new_unchecked(
        nodes: Vec<TaskNode>,
        index: HashMap<String, NodeId>,
        edges: ResolvedEdges,
        topo_order: Vec<NodeId>,
    ) -> Self {
        let n = nodes.len();
        let mut dependents = vec![Vec::new(); n];
        for (node, preds) in edges.depends_on.iter().enumerate() {
            for &pred in preds {
                dependents[pred].push(node);
            }
        }
        let mut finalizes = vec![Vec::new(); n];
        for (node, fins) in edges.finalizers.iter().enumerate() {
            for &fin in fins {
                finalizes[fin].push(node);
            }
        }
        let mut topo_rank = vec![0; n];
        for (rank, &id) in topo_order.iter().enumerate() {
            topo_rank[id] = rank;
        }

        Self {
            nodes,
            index,
            depends_on: edges.depends_on,
            dependents,
            ordering_preds: edges.ordering_preds,
            finalizes,
            finalizers: edges.finalizers,
            topo_order,
            topo_rank,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &TaskNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &TaskNode)> {
        self.nodes.iter().enumerate()
    }

    pub fn id_of(&self, path: &str) -> Option<NodeId> {
        self.index.get(path).copied()
    }

    pub fn path_of(&self, id: NodeId) -> &str {
        &self.nodes[id].path
    }

    pub fn depends_on(&self, id: NodeId) -> &[NodeId] {
        &self.depends_on[id]
    }

    /// Nodes that declared `dependsOn` this node.
    pub fn dependents_of(&self, id: NodeId) -> &[NodeId] {
        &self.dependents[id]
    }

    pub fn ordering_preds(&self, id: NodeId) -> &[NodeId] {
        &self.ordering_preds[id]
    }

    /// Nodes whose `finalizedBy` names this node.
    pub fn finalized_nodes(&self, id: NodeId) -> &[NodeId] {
        &self.finalizes[id]
    }

    pub fn finalizers_of(&self, id: NodeId) -> &[NodeId] {
        &self.finalizers[id]
    }

    pub fn is_finalizer(&self, id: NodeId) -> bool {
        !self.finalizes[id].is_empty()
    }

    /// Topological order over every edge kind; the default ready priority.
    pub fn topological_order(&self) -> &[NodeId] {
        &self.topo_order
    }

    pub fn topo_rank(&self, id: NodeId) -> usize {
        self.topo_rank[id]
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.path.as_str())
    }
}
