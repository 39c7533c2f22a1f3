//! Staleness detection: deciding which nodes are out of date and therefore
//! need a rebuild before the requested targets can be considered current.
//!
//! Ported from `minicons/execution.py::Execution.prepare_build`, the
//! unfiltered original this engine's staleness rules were distilled from.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::error::EngineError;
use crate::execution::ExecutionInner;
use crate::graph::DependencyGraph;
use crate::node::{NodeId, ObservedMeta, Signature};

/// The result of [`crate::Execution::prepare_build`]: everything the
/// scheduler needs to drive an actual build, computed once so a caller can
/// inspect it (e.g. for `--dry-run` or `--tree`) before committing to run
/// anything.
pub struct PreparedBuild {
    /// Every node relevant to the requested targets, leaves (no
    /// dependencies) first.
    pub ordered_nodes: Vec<NodeId>,
    pub graph: DependencyGraph,
    /// Entries detected as changed since they were last built.
    pub outdated: HashSet<NodeId>,
    /// Every node that must be (re)built to bring the targets up to date:
    /// `outdated` plus downward and upward propagation.
    pub to_build: HashSet<NodeId>,
    /// Ancestor entries whose signature value differs between the last
    /// committed run and now, reported for diagnostics only (e.g. `--tree`'s
    /// `C` marker). Not used to derive `to_build`.
    pub changed: HashSet<NodeId>,
    /// For each node, the set of entry nodes (transitively) it depends on.
    pub entry_dependencies: HashMap<NodeId, HashSet<NodeId>>,
    pub targets: Vec<NodeId>,
}

pub fn prepare_build(
    execution: &ExecutionInner,
    targets: Vec<NodeId>,
) -> Result<PreparedBuild, EngineError> {
    let builders = execution.builders_snapshot();
    let graph = execution.with_nodes(|nodes| DependencyGraph::build(nodes, &builders))?;
    let ordered_nodes = graph.topo_sort(&targets)?;

    let entry_dependencies = compute_entry_dependencies(execution, &graph, &ordered_nodes);

    // A builder-less entry that isn't on disk can never be built: fail fast
    // rather than letting every dependent silently treat it as up to date.
    for &node in &ordered_nodes {
        if execution.is_entry(node) && execution.builder_of(node).is_none() {
            let path = execution.path_of(node).expect("entry has a path");
            if !execution.filesystem().exists(&path) {
                return Err(EngineError::MissingInput { path });
            }
        }
    }

    let mut metadata: HashMap<NodeId, ObservedMeta> = HashMap::new();
    for &node in &ordered_nodes {
        if execution.is_entry(node) {
            metadata.insert(node, execution.observed_metadata(node));
        }
    }

    let (outdated, changed) =
        compute_outdated(execution, &ordered_nodes, &entry_dependencies, &metadata);

    let to_build = propagate_to_build(execution, &graph, &ordered_nodes, &outdated);

    Ok(PreparedBuild {
        ordered_nodes,
        graph,
        outdated,
        to_build,
        changed,
        entry_dependencies,
        targets,
    })
}

/// For each node, the full set of entry nodes transitively reachable by
/// following dependency edges.
fn compute_entry_dependencies(
    execution: &ExecutionInner,
    graph: &DependencyGraph,
    ordered_nodes: &[NodeId],
) -> HashMap<NodeId, HashSet<NodeId>> {
    let mut result = HashMap::new();
    for &node in ordered_nodes {
        let mut deps = HashSet::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<NodeId> = graph.dependencies(node).collect();
        while let Some(v) = stack.pop() {
            if !seen.insert(v) {
                continue;
            }
            if execution.is_entry(v) {
                deps.insert(v);
            }
            stack.extend(graph.dependencies(v));
        }
        result.insert(node, deps);
    }
    result
}

/// An entry is outdated if its output is missing, or if the signature built
/// from its current dependency metadata doesn't match what was last
/// committed to the metadata store.
///
/// An entry with a builder and no dependencies resolves as: outdated iff its
/// path is absent, or the store holds no committed signature for it — an
/// interrupted prior run that never reached the commit step leaves such an
/// entry perpetually outdated rather than perpetually up to date, since
/// `old_signature` is `None` and never equals `Some(empty_map)`.
fn compute_outdated(
    execution: &ExecutionInner,
    ordered_nodes: &[NodeId],
    entry_dependencies: &HashMap<NodeId, HashSet<NodeId>>,
    metadata: &HashMap<NodeId, ObservedMeta>,
) -> (HashSet<NodeId>, HashSet<NodeId>) {
    let mut outdated = HashSet::new();
    let mut changed = HashSet::new();
    for &node in ordered_nodes {
        if !execution.is_entry(node) || execution.builder_of(node).is_none() {
            continue;
        }
        let path = execution.path_of(node).expect("entry has a path");
        if !execution.filesystem().exists(&path) {
            outdated.insert(node);
            continue;
        }
        let old_signature = execution.store().get(&path);
        let new_signature = signature_of(execution, &entry_dependencies[&node], metadata);
        if let Some(old_signature) = &old_signature {
            mark_changed_keys(execution, old_signature, &new_signature, &mut changed);
        }
        if old_signature.as_ref() != Some(&new_signature) {
            outdated.insert(node);
        }
    }
    (outdated, changed)
}

/// For every key present in either signature whose value differs, mark the
/// ancestor entry that key came from as changed. A key whose path was never
/// interned as a node (e.g. a dependency dropped since the prior run) has no
/// ancestor entry left to mark and is skipped.
fn mark_changed_keys(
    execution: &ExecutionInner,
    old_signature: &Signature,
    new_signature: &Signature,
    changed: &mut HashSet<NodeId>,
) {
    let keys = old_signature.keys().chain(new_signature.keys());
    for key in keys {
        if old_signature.get(key) != new_signature.get(key) {
            if let Some(ancestor) = execution.node_for_path(&PathBuf::from(key)) {
                changed.insert(ancestor);
            }
        }
    }
}

/// Build the JSON-shaped signature for a node: its dependencies' observed
/// metadata, keyed by each dependency's absolute path.
pub(crate) fn signature_of(
    execution: &ExecutionInner,
    deps: &HashSet<NodeId>,
    metadata: &HashMap<NodeId, ObservedMeta>,
) -> Signature {
    let mut signature = Signature::new();
    for &dep in deps {
        let path = execution.path_of(dep).expect("entry has a path");
        let observed = metadata
            .get(&dep)
            .cloned()
            .unwrap_or(ObservedMeta::Missing);
        signature.insert(path.to_string_lossy().into_owned(), observed);
    }
    signature
}

fn propagate_to_build(
    execution: &ExecutionInner,
    graph: &DependencyGraph,
    ordered_nodes: &[NodeId],
    outdated: &HashSet<NodeId>,
) -> HashSet<NodeId> {
    let mut to_build = outdated.clone();

    // Downward: any node with an outdated (or already-to-build) dependency
    // must also rebuild. `ordered_nodes` is leaves-first, so a single
    // forward pass sees every dependency before its dependents.
    for &node in ordered_nodes {
        if graph.dependencies(node).any(|d| to_build.contains(&d)) {
            to_build.insert(node);
        }
    }

    // Upward: if a node already slated to rebuild depends on a non-entry
    // (e.g. an unbuilt `FileSet`), that dependency joins `to_build` too,
    // since its contents aren't defined until its own builder runs.
    for &node in ordered_nodes.iter().rev() {
        if !to_build.contains(&node) {
            continue;
        }
        for d in graph.dependencies(node) {
            if !execution.is_entry(d) {
                to_build.insert(d);
            }
        }
    }

    to_build
}
