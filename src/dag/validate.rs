// src/dag/validate.rs

//! Graph validation: references, properties and cycles.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::dag::graph::{NodeId, ResolvedEdges, TaskGraph};
use crate::dag::node::{EdgeKind, PropertyValue, TaskNode};
use crate::errors::{KilnError, Result};

impl TryFrom<Vec<TaskNode>> for TaskGraph {
    type Error = KilnError;

    fn try_from(nodes: Vec<TaskNode>) -> std::result::Result<Self, Self::Error> {
        let index = index_nodes(&nodes)?;
        for node in &nodes {
            validate_properties(node)?;
        }
        let edges = resolve_edges(&nodes, &index)?;

        // dependsOn + ordering edges: a cycle here can never be scheduled.
        let ordering = edge_graph(nodes.len(), &[&edges.depends_on, &edges.ordering_preds]);
        if toposort(&ordering, None).is_err() {
            return Err(KilnError::Cycle {
                path: cycle_path(&ordering, &nodes),
            });
        }

        // finalizedBy is excluded above but must not loop back through dependsOn.
        let finalizer_preds = finalized_preds(&edges.finalizers);
        let finalizer = edge_graph(nodes.len(), &[&edges.depends_on, &finalizer_preds]);
        if toposort(&finalizer, None).is_err() {
            return Err(KilnError::FinalizerCycle {
                path: cycle_path(&finalizer, &nodes),
            });
        }

        // All three kinds together decide the dispatch order; an ordering edge
        // pointing back at a finalizer would deadlock the scheduler.
        let combined = edge_graph(
            nodes.len(),
            &[&edges.depends_on, &edges.ordering_preds, &finalizer_preds],
        );
        if toposort(&combined, None).is_err() {
            return Err(KilnError::Cycle {
                path: cycle_path(&combined, &nodes),
            });
        }

        let order = stable_topological_order(
            nodes.len(),
            &[&edges.depends_on, &edges.ordering_preds, &finalizer_preds],
        );
        Ok(TaskGraph::new_unchecked(nodes, index, edges, order))
    }
}

fn index_nodes(nodes: &[TaskNode]) -> Result<HashMap<String, NodeId>> {
    let mut index = HashMap::with_capacity(nodes.len());
    for (id, node) in nodes.iter().enumerate() {
        if index.insert(node.path.clone(), id).is_some() {
            return Err(KilnError::DuplicateNode(node.path.clone()));
        }
    }
    Ok(index)
}

fn validate_properties(node: &TaskNode) -> Result<()> {
    let invalid = |property: &str, reason: &str| KilnError::InvalidProperty {
        task: node.path.clone(),
        property: property.to_string(),
        reason: reason.to_string(),
    };

    let mut seen = HashSet::new();
    for input in &node.inputs {
        if !seen.insert(input.name.as_str()) {
            return Err(invalid(&input.name, "declared more than once"));
        }
    }

    seen.clear();
    for output in &node.outputs {
        if !seen.insert(output.name.as_str()) {
            return Err(invalid(&output.name, "declared more than once"));
        }
        if matches!(output.value, PropertyValue::Scalar(_)) {
            return Err(invalid(&output.name, "outputs must be files or directories"));
        }
    }
    Ok(())
}

fn resolve_edges(nodes: &[TaskNode], index: &HashMap<String, NodeId>) -> Result<ResolvedEdges> {
    let resolve = |node: &TaskNode, kind: EdgeKind| -> Result<Vec<NodeId>> {
        let mut ids = Vec::new();
        for target in node.edges(kind) {
            let id = index.get(target).copied().ok_or_else(|| KilnError::UnknownNode {
                node: target.clone(),
                referenced_by: node.path.clone(),
                edge: kind,
            })?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    };

    let mut edges = ResolvedEdges::default();
    for node in nodes {
        edges.depends_on.push(resolve(node, EdgeKind::DependsOn)?);
        let mut ordering = resolve(node, EdgeKind::MustRunAfter)?;
        for id in resolve(node, EdgeKind::ShouldRunAfter)? {
            if !ordering.contains(&id) {
                ordering.push(id);
            }
        }
        edges.ordering_preds.push(ordering);
        edges.finalizers.push(resolve(node, EdgeKind::FinalizedBy)?);
    }
    Ok(edges)
}

/// For each node, the nodes it finalizes (its "must run after" set).
fn finalized_preds(finalizers: &[Vec<NodeId>]) -> Vec<Vec<NodeId>> {
    let mut preds = vec![Vec::new(); finalizers.len()];
    for (node, fins) in finalizers.iter().enumerate() {
        for &fin in fins {
            preds[fin].push(node);
        }
    }
    preds
}

/// Build a petgraph graph with an edge `pred -> node` for every predecessor
/// list given. Node weights are arena ids.
fn edge_graph(len: usize, pred_lists: &[&Vec<Vec<NodeId>>]) -> DiGraph<NodeId, ()> {
    let mut graph = DiGraph::with_capacity(len, len);
    for id in 0..len {
        graph.add_node(id);
    }
    for preds in pred_lists {
        for (node, node_preds) in preds.iter().enumerate() {
            for &pred in node_preds {
                graph.update_edge(NodeIndex::new(pred), NodeIndex::new(node), ());
            }
        }
    }
    graph
}

/// Extract one complete cycle from a cyclic graph.
///
/// The path is reported in declaration direction: each task is followed by
/// a task it references, and the first task is repeated at the end.
fn cycle_path(graph: &DiGraph<NodeId, ()>, nodes: &[TaskNode]) -> Vec<String> {
    let ids = find_cycle(graph).unwrap_or_default();
    ids.into_iter()
        .rev()
        .map(|id| nodes[id].path.clone())
        .collect()
}

fn find_cycle(graph: &DiGraph<NodeId, ()>) -> Option<Vec<NodeId>> {
    let mut components = tarjan_scc(graph);
    for scc in &mut components {
        scc.sort();
    }
    components.sort();

    for scc in components {
        let start = scc[0];
        if scc.len() == 1 {
            if graph.contains_edge(start, start) {
                return Some(vec![graph[start], graph[start]]);
            }
            continue;
        }

        let members: HashSet<NodeIndex> = scc.iter().copied().collect();
        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut visited = HashSet::from([start]);

        while let Some(current) = queue.pop_front() {
            let mut next: Vec<NodeIndex> = graph
                .neighbors(current)
                .filter(|n| members.contains(n))
                .collect();
            next.sort();
            for neighbor in next {
                if neighbor == start {
                    let mut path = vec![graph[current]];
                    let mut cursor = current;
                    while cursor != start {
                        cursor = parent[&cursor];
                        path.push(graph[cursor]);
                    }
                    path.reverse();
                    path.push(graph[start]);
                    return Some(path);
                }
                if visited.insert(neighbor) {
                    parent.insert(neighbor, current);
                    queue.push_back(neighbor);
                }
            }
        }
    }
    None
}

/// Kahn's algorithm, always taking the lowest declared index first so the
/// order is stable across runs.
fn stable_topological_order(len: usize, pred_lists: &[&Vec<Vec<NodeId>>]) -> Vec<NodeId> {
    let mut in_degree = vec![0usize; len];
    let mut successors: Vec<Vec<NodeId>> = vec![Vec::new(); len];
    for preds in pred_lists {
        for (node, node_preds) in preds.iter().enumerate() {
            for &pred in node_preds {
                in_degree[node] += 1;
                successors[pred].push(node);
            }
        }
    }

    let mut heap: BinaryHeap<Reverse<NodeId>> = (0..len)
        .filter(|&id| in_degree[id] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(len);
    while let Some(Reverse(id)) = heap.pop() {
        order.push(id);
        for &succ in &successors[id] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                heap.push(Reverse(succ));
            }
        }
    }
    order
}
