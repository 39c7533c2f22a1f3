//! The error kinds the engine can raise. All are fatal to the current
//! `build_targets` invocation; there is no retry at this layer.

use std::path::PathBuf;

use crate::node::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{path:?} is already an entry of a different kind")]
    TypeMismatch { path: PathBuf },

    #[error("{node:?} is already built by a different builder")]
    DoubleBuilder { node: NodeId },

    #[error("cannot resolve {0:?} to a node")]
    UnknownSource(String),

    #[error("required input {path:?} does not exist on the filesystem")]
    MissingInput { path: PathBuf },

    #[error("target {0:?} is neither a known alias nor a path")]
    MissingTarget(String),

    #[error("the dependency graph has a cycle:\n{}", format_residual_edges(edges))]
    Cycle { edges: Vec<(NodeId, NodeId)> },

    #[error("builder {builder} did not produce {path:?}")]
    MissingOutput { builder: String, path: PathBuf },

    #[error("builder {builder} failed: {source}")]
    BuilderFailure {
        builder: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("internal consistency check failed: {0}")]
    InternalInconsistency(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn format_residual_edges(edges: &[(NodeId, NodeId)]) -> String {
    edges
        .iter()
        .map(|(from, to)| format!("{from:?} -> {to:?}"))
        .collect::<Vec<_>>()
        .join("\n")
}
