//! Dependency graph construction and traversal.
//!
//! The graph is rebuilt fresh before every `prepare_build`/`build_targets`
//! call from whatever nodes and builders are currently registered on the
//! owning [`crate::Execution`] — unlike the teacher's append-only
//! `GraphBuilder`, there is no separate builder-then-freeze step, since
//! `FileSet` nodes may still be growing dependencies up until the moment a
//! build starts.

use std::collections::HashMap;

use petgraph::prelude::DiGraphMap;

use crate::builder::Builder;
use crate::error::EngineError;
use crate::node::{NodeId, NodeSlot};

/// The dependency graph of every node known to an execution, at the moment
/// it was built. Edges point from a dependent node to the thing it depends
/// on, matching the teacher's `add_build_dep(dependent, dependency)`
/// convention.
#[derive(Default)]
pub struct DependencyGraph {
    graph: DiGraphMap<NodeId, ()>,
}

impl DependencyGraph {
    /// Build the graph over every node in `nodes`. An edge `a -> b` is added
    /// whenever `a` explicitly depends on `b` (invariant 4), and whenever `a`
    /// is one of the outputs of a builder that depends on `b` (invariant 5).
    pub fn build(
        nodes: &[NodeSlot],
        builders: &[std::sync::Arc<dyn Builder>],
    ) -> Result<Self, EngineError> {
        let mut graph = DiGraphMap::new();
        for i in 0..nodes.len() {
            graph.add_node(NodeId(i));
        }

        for (i, slot) in nodes.iter().enumerate() {
            let node = NodeId(i);
            for &dep in slot.depends.lock().unwrap().iter() {
                graph.add_edge(node, dep, ());
            }
            if let Some(builder_id) = *slot.builder.lock().unwrap() {
                let builder = &builders[builder_id.index()];
                for &dep in builder.depends() {
                    graph.add_edge(node, dep, ());
                }
            }
        }

        if petgraph::algo::is_cyclic_directed(&graph) {
            let edges = find_cycle_edges(&graph);
            return Err(EngineError::Cycle { edges });
        }

        Ok(Self { graph })
    }

    pub fn dependencies(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph
            .neighbors_directed(node, petgraph::Direction::Outgoing)
    }

    pub fn dependents(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph
            .neighbors_directed(node, petgraph::Direction::Incoming)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.graph.contains_node(node)
    }

    /// Topologically sort every node reachable (in either direction) from
    /// `roots`, leaves first, using Kahn's algorithm over the reversed edge
    /// direction — so a node's dependencies are always emitted before it.
    ///
    /// Ported from `_sort_dag` in the original implementation this engine
    /// was distilled from.
    pub fn topo_sort(&self, roots: &[NodeId]) -> Result<Vec<NodeId>, EngineError> {
        let reachable = self.reachable_from(roots);

        // in_degree here counts, for each node, how many of its dependents
        // (incoming edges) are still unprocessed — so a node becomes ready
        // once everything depending on it has already been emitted... no:
        // we want dependencies emitted first, so we count each node's own
        // *dependencies* (outgoing edges) still unprocessed.
        let mut remaining_deps: HashMap<NodeId, usize> = HashMap::new();
        for &node in &reachable {
            let count = self
                .graph
                .neighbors_directed(node, petgraph::Direction::Outgoing)
                .filter(|d| reachable.contains(d))
                .count();
            remaining_deps.insert(node, count);
        }

        let mut ready: Vec<NodeId> = remaining_deps
            .iter()
            .filter(|(_, &c)| c == 0)
            .map(|(&n, _)| n)
            .collect();
        ready.sort();

        let mut order = Vec::with_capacity(reachable.len());
        let mut queue = std::collections::VecDeque::from(ready);
        while let Some(node) = queue.pop_front() {
            order.push(node);
            let mut newly_ready = Vec::new();
            for dependent in self
                .graph
                .neighbors_directed(node, petgraph::Direction::Incoming)
            {
                if !reachable.contains(&dependent) {
                    continue;
                }
                let count = remaining_deps.get_mut(&dependent).unwrap();
                *count -= 1;
                if *count == 0 {
                    newly_ready.push(dependent);
                }
            }
            newly_ready.sort();
            for n in newly_ready {
                queue.push_back(n);
            }
        }

        if order.len() != reachable.len() {
            // Residual nodes never reached zero in-degree: a cycle among
            // them. Report the edges still connecting them.
            let left: std::collections::HashSet<NodeId> =
                reachable.difference(&order.iter().copied().collect()).copied().collect();
            let mut edges = Vec::new();
            for &node in &left {
                for dep in self
                    .graph
                    .neighbors_directed(node, petgraph::Direction::Outgoing)
                {
                    if left.contains(&dep) {
                        edges.push((node, dep));
                    }
                }
            }
            return Err(EngineError::Cycle { edges });
        }

        Ok(order)
    }

    /// Every node reachable from `roots` by following dependency edges
    /// (outgoing direction), plus the roots themselves.
    pub fn reachable_from(&self, roots: &[NodeId]) -> std::collections::HashSet<NodeId> {
        let mut seen = std::collections::HashSet::new();
        let mut stack: Vec<NodeId> = roots.to_vec();
        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            for dep in self
                .graph
                .neighbors_directed(node, petgraph::Direction::Outgoing)
            {
                if !seen.contains(&dep) {
                    stack.push(dep);
                }
            }
        }
        seen
    }
}

fn find_cycle_edges(graph: &DiGraphMap<NodeId, ()>) -> Vec<(NodeId, NodeId)> {
    // is_cyclic_directed already confirmed a cycle exists; walk a DFS and
    // report the first back-edge found, for a useful (if not exhaustive)
    // error message.
    let mut visiting = std::collections::HashSet::new();
    let mut visited = std::collections::HashSet::new();
    let mut stack_path = Vec::new();

    for start in graph.nodes() {
        if visited.contains(&start) {
            continue;
        }
        if let Some(edge) = dfs_find_back_edge(graph, start, &mut visiting, &mut visited, &mut stack_path) {
            return vec![edge];
        }
    }
    Vec::new()
}

fn dfs_find_back_edge(
    graph: &DiGraphMap<NodeId, ()>,
    node: NodeId,
    visiting: &mut std::collections::HashSet<NodeId>,
    visited: &mut std::collections::HashSet<NodeId>,
    path: &mut Vec<NodeId>,
) -> Option<(NodeId, NodeId)> {
    visiting.insert(node);
    path.push(node);
    for dep in graph.neighbors_directed(node, petgraph::Direction::Outgoing) {
        if visiting.contains(&dep) {
            return Some((node, dep));
        }
        if !visited.contains(&dep) {
            if let Some(edge) = dfs_find_back_edge(graph, dep, visiting, visited, path) {
                return Some(edge);
            }
        }
    }
    path.pop();
    visiting.remove(&node);
    visited.insert(node);
    None
}
