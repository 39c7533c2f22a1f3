//! [`Execution`]: the top-level object owning every node, builder, and alias
//! in a build, plus the metadata store and filesystem abstraction they're
//! checked against.
//!
//! Ported from `minicons/execution.py`'s `Execution` class. Node storage uses
//! the arena/index pattern the teacher crate uses for its own build graph
//! (`FileId`/`BuildId` over a `Vec`), avoiding the ownership cycle an
//! `Entry`-holds-a-`Builder`-holds-`Entry`s graph would otherwise require.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

use crate::builder::{Builder, BuilderId};
use crate::db::MetadataStore;
use crate::error::EngineError;
use crate::filesystem::Filesystem;
use crate::node::{DirNode, FileNode, FileSetNode, GlobSpec, NodeId, NodeKind, NodeSlot, ObservedMeta};

/// Cheaply-cloneable handle to an [`ExecutionInner`]. This is the type
/// construct-file code is expected to hold and pass around.
#[derive(Clone)]
pub struct Execution(pub(crate) Arc<ExecutionInner>);

pub struct ExecutionInner {
    root: PathBuf,
    nodes: RwLock<Vec<NodeSlot>>,
    paths: RwLock<IndexMap<PathBuf, NodeId>>,
    builders: RwLock<Vec<Arc<dyn Builder>>>,
    aliases: RwLock<HashMap<String, Vec<NodeId>>>,
    store: Arc<dyn MetadataStore>,
    filesystem: Arc<dyn Filesystem>,
}

impl Execution {
    pub fn new(
        root: impl Into<PathBuf>,
        store: Arc<dyn MetadataStore>,
        filesystem: Arc<dyn Filesystem>,
    ) -> Self {
        Self(Arc::new(ExecutionInner {
            root: root.into(),
            nodes: RwLock::new(Vec::new()),
            paths: RwLock::new(IndexMap::new()),
            builders: RwLock::new(Vec::new()),
            aliases: RwLock::new(HashMap::new()),
            store,
            filesystem,
        }))
    }

    /// Environment rooted directly at this execution's root, with the
    /// default `root/build` build directory.
    pub fn default_environment(&self) -> crate::environment::Environment {
        crate::environment::Environment::new(self.0.clone(), None, None)
    }

    pub fn inner(&self) -> &Arc<ExecutionInner> {
        &self.0
    }

    pub fn root(&self) -> &Path {
        self.0.root()
    }

    pub fn register_alias<I, T>(&self, alias: impl Into<String>, args: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = T>,
        T: Into<TargetArg>,
    {
        self.0.register_alias(alias, args)
    }

    pub fn register_builder(&self, builder: Arc<dyn Builder>) -> Result<BuilderId, EngineError> {
        self.0.register_builder(builder)
    }

    pub fn resolve_targets<I, T>(&self, args: I) -> Result<Vec<NodeId>, EngineError>
    where
        I: IntoIterator<Item = T>,
        T: Into<TargetArg>,
    {
        self.0.resolve_targets(args)
    }

    pub fn prepare_build<I, T>(&self, targets: I) -> Result<crate::staleness::PreparedBuild, EngineError>
    where
        I: IntoIterator<Item = T>,
        T: Into<TargetArg>,
    {
        let targets = self.0.resolve_targets(targets)?;
        crate::staleness::prepare_build(&self.0, targets)
    }

    /// Resolve `targets`, compute what's outdated, and run every builder
    /// needed to bring them up to date, reporting progress through
    /// `progress`.
    pub fn build_targets<I, T>(
        &self,
        targets: I,
        progress: &dyn crate::progress::Progress,
        cfg: &crate::scheduler::ExecConfig,
    ) -> Result<crate::staleness::PreparedBuild, EngineError>
    where
        I: IntoIterator<Item = T>,
        T: Into<TargetArg>,
    {
        let prepared = self.prepare_build(targets)?;
        crate::scheduler::build_targets(&self.0, &prepared, progress, cfg)?;
        Ok(prepared)
    }
}

impl ExecutionInner {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn filesystem(&self) -> &dyn Filesystem {
        &*self.filesystem
    }

    pub fn store(&self) -> &dyn MetadataStore {
        &*self.store
    }

    /// Intern `path` as a `File` node. Returns the existing node if `path`
    /// was already interned as a `File`; errors if it was interned as
    /// anything else.
    pub fn intern_file(&self, path: &Path) -> Result<FileNode, EngineError> {
        if let Some(&id) = self.paths.read().unwrap().get(path) {
            let nodes = self.nodes.read().unwrap();
            return match &nodes[id.index()].kind {
                NodeKind::File(_) => Ok(FileNode(id)),
                _ => Err(EngineError::TypeMismatch {
                    path: path.to_path_buf(),
                }),
            };
        }
        let mut nodes = self.nodes.write().unwrap();
        let mut paths = self.paths.write().unwrap();
        // Re-check under the write lock in case of a race.
        if let Some(&id) = paths.get(path) {
            return match &nodes[id.index()].kind {
                NodeKind::File(_) => Ok(FileNode(id)),
                _ => Err(EngineError::TypeMismatch {
                    path: path.to_path_buf(),
                }),
            };
        }
        let id = NodeId(nodes.len());
        nodes.push(NodeSlot::new(NodeKind::File(path.to_path_buf())));
        paths.insert(path.to_path_buf(), id);
        Ok(FileNode(id))
    }

    /// Intern `path` as a `Dir` node with the given glob. See
    /// [`ExecutionInner::intern_file`] for the interning/mismatch rules.
    pub fn intern_dir(&self, path: &Path, glob: &str) -> Result<DirNode, EngineError> {
        if let Some(&id) = self.paths.read().unwrap().get(path) {
            let nodes = self.nodes.read().unwrap();
            return match &nodes[id.index()].kind {
                NodeKind::Dir { .. } => Ok(DirNode(id)),
                _ => Err(EngineError::TypeMismatch {
                    path: path.to_path_buf(),
                }),
            };
        }
        let mut nodes = self.nodes.write().unwrap();
        let mut paths = self.paths.write().unwrap();
        if let Some(&id) = paths.get(path) {
            return match &nodes[id.index()].kind {
                NodeKind::Dir { .. } => Ok(DirNode(id)),
                _ => Err(EngineError::TypeMismatch {
                    path: path.to_path_buf(),
                }),
            };
        }
        let id = NodeId(nodes.len());
        nodes.push(NodeSlot::new(NodeKind::Dir {
            path: path.to_path_buf(),
            glob: GlobSpec::new(glob),
        }));
        paths.insert(path.to_path_buf(), id);
        Ok(DirNode(id))
    }

    /// Create a new, empty `FileSet` node. `FileSet`s have no path, so they
    /// are never deduplicated by interning — every call creates a fresh one.
    pub fn new_fileset(&self) -> FileSetNode {
        let mut nodes = self.nodes.write().unwrap();
        let id = NodeId(nodes.len());
        nodes.push(NodeSlot::new(NodeKind::FileSet));
        FileSetNode(id)
    }

    pub fn path_of(&self, node: NodeId) -> Option<PathBuf> {
        self.nodes.read().unwrap()[node.index()]
            .path()
            .map(|p| p.to_path_buf())
    }

    /// The interned node for `path`, if one has been registered. Used to map
    /// a signature key back to the ancestor entry it came from.
    pub(crate) fn node_for_path(&self, path: &Path) -> Option<NodeId> {
        self.paths.read().unwrap().get(path).copied()
    }

    pub fn is_entry(&self, node: NodeId) -> bool {
        self.nodes.read().unwrap()[node.index()].is_entry()
    }

    /// `true` for `Dir` nodes, `false` for `File` and `FileSet` nodes. Used
    /// by `--tree` output to sort directories before files.
    pub fn is_dir(&self, node: NodeId) -> bool {
        matches!(
            self.nodes.read().unwrap()[node.index()].kind,
            NodeKind::Dir { .. }
        )
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().unwrap().len()
    }

    /// Explicit extra dependencies recorded on a node (invariant 4), or — for
    /// a `FileSet` — its current source list.
    pub fn depends_of(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes.read().unwrap()[node.index()]
            .depends
            .lock()
            .unwrap()
            .clone()
    }

    pub fn builder_of(&self, node: NodeId) -> Option<BuilderId> {
        *self.nodes.read().unwrap()[node.index()].builder.lock().unwrap()
    }

    /// Add `dep` to `node`'s explicit dependency list.
    pub fn add_depend(&self, node: NodeId, dep: NodeId) {
        self.nodes.read().unwrap()[node.index()]
            .depends
            .lock()
            .unwrap()
            .push(dep);
    }

    /// Append `file` to a `FileSet`'s source list. Valid at any time,
    /// including concurrently from a builder's `build()` on a worker thread.
    pub fn append_to_fileset(&self, set: FileSetNode, file: FileNode) {
        self.add_depend(set.node_id(), file.node_id());
    }

    /// Observed metadata for an entry, read fresh from the filesystem. Not
    /// meaningful for `FileSet` nodes (they have no path); returns `Missing`.
    pub fn observed_metadata(&self, node: NodeId) -> ObservedMeta {
        let (path, glob) = {
            let nodes = self.nodes.read().unwrap();
            match &nodes[node.index()].kind {
                NodeKind::File(p) => (p.clone(), None),
                NodeKind::Dir { path, glob } => (path.clone(), Some(glob.clone())),
                NodeKind::FileSet => return ObservedMeta::Missing,
            }
        };
        match glob {
            None => self.filesystem.file_metadata(&path),
            Some(glob) => self
                .filesystem
                .dir_metadata(&path, &|rel| glob.is_match(rel)),
        }
    }

    pub fn register_builder(&self, builder: Arc<dyn Builder>) -> Result<BuilderId, EngineError> {
        let builds: Vec<NodeId> = builder.builds().to_vec();
        let mut builders = self.builders.write().unwrap();
        let id = BuilderId(builders.len());

        let nodes = self.nodes.read().unwrap();
        for &node in &builds {
            let mut slot = nodes[node.index()].builder.lock().unwrap();
            if slot.is_some() {
                return Err(EngineError::DoubleBuilder { node });
            }
        }
        for &node in &builds {
            *nodes[node.index()].builder.lock().unwrap() = Some(id);
        }
        drop(nodes);

        builders.push(builder);
        Ok(id)
    }

    pub fn builders_snapshot(&self) -> Vec<Arc<dyn Builder>> {
        self.builders.read().unwrap().clone()
    }

    pub fn builder(&self, id: BuilderId) -> Arc<dyn Builder> {
        self.builders.read().unwrap()[id.index()].clone()
    }

    pub fn with_nodes<R>(&self, f: impl FnOnce(&[NodeSlot]) -> R) -> R {
        f(&self.nodes.read().unwrap())
    }

    pub fn register_alias<I, T>(&self, alias: impl Into<String>, args: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = T>,
        T: Into<TargetArg>,
    {
        let nodes = self.resolve_targets(args)?;
        self.aliases.write().unwrap().insert(alias.into(), nodes);
        Ok(())
    }

    pub fn resolve_targets<I, T>(&self, args: I) -> Result<Vec<NodeId>, EngineError>
    where
        I: IntoIterator<Item = T>,
        T: Into<TargetArg>,
    {
        let mut out = Vec::new();
        for arg in args {
            self.resolve_one(arg.into(), &mut out)?;
        }
        Ok(out)
    }

    fn resolve_one(&self, arg: TargetArg, out: &mut Vec<NodeId>) -> Result<(), EngineError> {
        match arg {
            TargetArg::Node(id) => out.push(id),
            TargetArg::Path(p) => {
                let abs = if p.is_absolute() { p } else { self.root.join(&p) };
                let id = *self
                    .paths
                    .read()
                    .unwrap()
                    .get(&abs)
                    .ok_or_else(|| EngineError::MissingTarget(abs.display().to_string()))?;
                out.push(id);
            }
            TargetArg::PathOrAlias(s) => {
                let alias_nodes = self.aliases.read().unwrap().get(&s).cloned();
                match alias_nodes {
                    Some(nodes) => out.extend(nodes),
                    None => {
                        let abs = self.root.join(&s);
                        let id = *self
                            .paths
                            .read()
                            .unwrap()
                            .get(&abs)
                            .ok_or(EngineError::MissingTarget(s))?;
                        out.push(id);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Anything that can be resolved to one or more nodes: a path, a string that
/// is tried as an alias and then a path, or an already-typed node handle.
/// Ported from `_args_to_nodes`'s input union.
pub enum TargetArg {
    PathOrAlias(String),
    Path(PathBuf),
    Node(NodeId),
}

impl From<&str> for TargetArg {
    fn from(s: &str) -> Self {
        TargetArg::PathOrAlias(s.to_string())
    }
}

impl From<String> for TargetArg {
    fn from(s: String) -> Self {
        TargetArg::PathOrAlias(s)
    }
}

impl From<PathBuf> for TargetArg {
    fn from(p: PathBuf) -> Self {
        TargetArg::Path(p)
    }
}

impl From<&Path> for TargetArg {
    fn from(p: &Path) -> Self {
        TargetArg::Path(p.to_path_buf())
    }
}

impl From<FileNode> for TargetArg {
    fn from(f: FileNode) -> Self {
        TargetArg::Node(f.node_id())
    }
}

impl From<DirNode> for TargetArg {
    fn from(d: DirNode) -> Self {
        TargetArg::Node(d.node_id())
    }
}

impl From<FileSetNode> for TargetArg {
    fn from(s: FileSetNode) -> Self {
        TargetArg::Node(s.node_id())
    }
}

impl From<NodeId> for TargetArg {
    fn from(n: NodeId) -> Self {
        TargetArg::Node(n)
    }
}

thread_local! {
    static CURRENT_EXECUTION: RefCell<Option<Execution>> = const { RefCell::new(None) };
}

/// RAII guard that sets the thread-local "current execution" for the
/// duration of its lifetime, restoring whatever was set before on drop.
/// Construct-file code written against the convenience free functions
/// ([`get_current_execution`], [`register_alias`]) needs one of these active,
/// the same way `minicons.execution.set_current_execution` does globally —
/// but scoped to a thread rather than a process, so tests can run
/// independent executions in parallel.
pub struct ExecutionGuard {
    previous: Option<Execution>,
}

impl ExecutionGuard {
    pub fn set(execution: Execution) -> Self {
        let previous = CURRENT_EXECUTION.with(|cell| cell.borrow_mut().replace(execution));
        Self { previous }
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        CURRENT_EXECUTION.with(|cell| {
            *cell.borrow_mut() = self.previous.take();
        });
    }
}

/// The thread's current execution, if an [`ExecutionGuard`] is active.
pub fn get_current_execution() -> Result<Execution, EngineError> {
    CURRENT_EXECUTION.with(|cell| {
        cell.borrow().clone().ok_or_else(|| {
            EngineError::InternalInconsistency("no current execution set".to_string())
        })
    })
}
