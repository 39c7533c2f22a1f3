//! `--tree` output: prints the dependency tree for a set of targets.
//!
//! Ported from `minicons/main.py::print_tree`: collapse non-entry nodes
//! (`FileSet`s) into their entry children, then walk depth-first printing
//! `O`/`B`/`C` markers (out-of-date / to-build / changed), directories
//! before files, with a "(child nodes shown above)" elision for nodes
//! visited twice.

use std::collections::HashMap;

use trestle::{Execution, NodeId, PreparedBuild};

pub fn print_tree(execution: &Execution, build: &PreparedBuild) {
    let inner = execution.inner();

    // Collapse edges through non-entry nodes, the way the original
    // flattens a FileSet into its own children before printing.
    let mut new_edges: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for &node in &build.ordered_nodes {
        new_edges.insert(node, build.graph.dependencies(node).collect());
    }
    for &node in &build.ordered_nodes {
        let children = new_edges.get(&node).cloned().unwrap_or_default();
        let mut flattened = Vec::new();
        for child in children {
            if inner.is_entry(child) {
                flattened.push(child);
            } else if let Some(grandchildren) = new_edges.get(&child) {
                flattened.extend(grandchildren.iter().copied());
            }
        }
        new_edges.insert(node, flattened);
    }

    println!("O = out of date");
    println!("B = to build");
    println!("C = changed");

    let mut seen: HashMap<NodeId, usize> = HashMap::new();
    let mut to_visit: Vec<(NodeId, usize, bool)> =
        build.targets.iter().map(|&t| (t, 0, false)).collect();
    to_visit.reverse();

    while let Some((node, depth, last_child)) = to_visit.pop() {
        if depth == 0 {
            println!();
        }

        let marker = format!(
            "{} {} {} ",
            if build.outdated.contains(&node) { "O" } else { " " },
            if build.to_build.contains(&node) { "B" } else { " " },
            if build.changed.contains(&node) { "C" } else { " " },
        );
        let path = inner.path_of(node).map(|p| p.display().to_string()).unwrap_or_default();

        if depth == 0 {
            println!("{marker}{path}");
        } else {
            let indent = "\u{2502}  ".repeat(depth.saturating_sub(1));
            let branch = if last_child { "\u{2514}" } else { "\u{251c}" };
            println!("{marker}{indent}{branch}\u{2500}{path}");
        }

        let skip_children = if seen.contains_key(&node) {
            if new_edges.get(&node).is_some_and(|c| !c.is_empty()) {
                let indent = "\u{2502}  ".repeat(depth);
                println!("      {indent}\u{2514}\u{2500}(child nodes shown above)");
            }
            true
        } else {
            seen.insert(node, depth);
            false
        };

        if !skip_children {
            let mut children = new_edges.get(&node).cloned().unwrap_or_default();
            children.sort_by_key(|&n| (!inner.is_dir(n), inner.path_of(n).unwrap_or_default()));
            children.reverse();
            for (i, &child) in children.iter().enumerate() {
                to_visit.push((child, depth + 1, i == 0));
            }
        }
    }
}
