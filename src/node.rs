//! The dependency graph's node types: [`File`], [`Dir`], and [`FileSet`].
//!
//! `File` and `Dir` are *entries*: they have a canonical filesystem path and
//! hence a key into the metadata store. `FileSet` is a logical, non-entry
//! node with no path of its own; it holds an ordered list of source nodes
//! that get flattened (and deduplicated) down to `File` leaves on iteration.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};

use crate::BuilderId;

/// An index identifying a node in an [`crate::Execution`]'s arena.
///
/// Stable for the lifetime of the `Execution` that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Default glob pattern used by [`Dir`] nodes when none is given.
pub const DEFAULT_DIR_GLOB: &str = "**/*";

#[derive(Debug)]
pub(crate) enum NodeKind {
    File(PathBuf),
    Dir { path: PathBuf, glob: GlobSpec },
    FileSet,
}

/// A glob pattern paired with its original string, since [`globset::Glob`]
/// itself does not expose it back.
#[derive(Debug, Clone)]
pub(crate) struct GlobSpec {
    pub pattern: String,
    matcher: GlobMatcher,
}

impl GlobSpec {
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let matcher = Glob::new(&pattern)
            .unwrap_or_else(|e| panic!("invalid glob pattern {pattern:?}: {e}"))
            .compile_matcher();
        Self { pattern, matcher }
    }

    pub fn is_match(&self, rel_path: &Path) -> bool {
        self.matcher.is_match(rel_path)
    }
}

impl Default for GlobSpec {
    fn default() -> Self {
        Self::new(DEFAULT_DIR_GLOB)
    }
}

/// A slot in the execution's node arena.
///
/// `builder` and `depends` are behind a `Mutex` rather than being set once at
/// construction, because builder assignment happens from user code that may
/// run well after the node was created (`register_target`), and a `FileSet`'s
/// dependency/source list may grow while its own builder's `build()` runs on
/// a worker thread.
pub(crate) struct NodeSlot {
    pub kind: NodeKind,
    pub builder: Mutex<Option<BuilderId>>,
    /// For `File`/`Dir`: the explicit extra dependency list (invariant 4).
    /// For `FileSet`: the ordered list of source nodes (invariant: may grow
    /// during the build phase).
    pub depends: Mutex<Vec<NodeId>>,
}

impl NodeSlot {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            builder: Mutex::new(None),
            depends: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.kind {
            NodeKind::File(p) => Some(p),
            NodeKind::Dir { path, .. } => Some(path),
            NodeKind::FileSet => None,
        }
    }

    pub fn is_entry(&self) -> bool {
        !matches!(self.kind, NodeKind::FileSet)
    }
}

/// The observed metadata of an entry at a point in time, used to build up a
/// [`Signature`]. `Missing` is the null sentinel used when a `File`'s path
/// does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ObservedMeta {
    Missing,
    File {
        mtime_ns: i128,
        mode: u32,
        size: u64,
    },
    Dir {
        mode: u32,
        files: BTreeMap<String, ObservedMeta>,
    },
}

/// The JSON-encoded signature of an entry: the observed metadata of every
/// entry it transitively depends on, keyed by that entry's absolute path.
///
/// A `BTreeMap` is used (rather than a `HashMap`) so two signatures built
/// from the same dependency set serialize identically, which keeps the
/// on-disk JSON stable across runs for easier diagnosis.
pub type Signature = BTreeMap<String, ObservedMeta>;

/// A typed handle to a `File` node, returned by [`crate::Environment::file`]
/// and accepted wherever a single-file dependency or target is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileNode(pub(crate) NodeId);

/// A typed handle to a `Dir` node, returned by [`crate::Environment::dir`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirNode(pub(crate) NodeId);

/// A typed handle to a `FileSet` node: a logical grouping of other nodes with
/// no filesystem path of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileSetNode(pub(crate) NodeId);

impl FileNode {
    pub fn node_id(self) -> NodeId {
        self.0
    }
}

impl DirNode {
    pub fn node_id(self) -> NodeId {
        self.0
    }
}

impl FileSetNode {
    pub fn node_id(self) -> NodeId {
        self.0
    }
}

impl From<FileNode> for NodeId {
    fn from(f: FileNode) -> NodeId {
        f.0
    }
}

impl From<DirNode> for NodeId {
    fn from(d: DirNode) -> NodeId {
        d.0
    }
}

impl From<FileSetNode> for NodeId {
    fn from(s: FileSetNode) -> NodeId {
        s.0
    }
}
