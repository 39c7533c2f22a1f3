//! The [`Builder`] trait: the contract every concrete build step implements.
//!
//! Mirrors `mcon/builder.py`'s `Builder` base class: a builder declares the
//! nodes it depends on and the nodes it produces at construction time, then
//! is invoked once, later, to actually produce them.

use std::path::Path;
use std::sync::Arc;

use crate::environment::Environment;
use crate::error::EngineError;
use crate::execution::ExecutionInner;
use crate::filesystem::Filesystem;
use crate::node::{DirNode, FileNode, FileSetNode, NodeId};

/// An index identifying a registered [`Builder`] in an `Execution`'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuilderId(pub(crate) usize);

impl BuilderId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// The error type a [`Builder::build`] implementation returns on failure.
/// Wrapped by [`crate::error::EngineError::BuilderFailure`] with the
/// builder's [`Builder::display`] name attached.
pub type BuilderError = Box<dyn std::error::Error + Send + Sync>;

/// A single build step: declares its inputs and outputs up front, and is
/// invoked once (per `build_targets` call that needs it) to actually run.
pub trait Builder: Send + Sync {
    /// Nodes this builder reads from. Supplements any node-level `depends`
    /// already recorded on the nodes themselves.
    fn depends(&self) -> &[NodeId];

    /// Nodes this builder is responsible for producing.
    fn builds(&self) -> &[NodeId];

    /// Produce every node in [`Builder::builds`]. Called with the node's
    /// output directory already created and any stale existing output
    /// already removed.
    fn build(&self, ctx: &BuildContext) -> Result<(), BuilderError>;

    /// Human-readable name used in progress output and error messages.
    fn display(&self) -> String {
        "builder".to_string()
    }
}

/// Handle passed to [`Builder::build`], giving access to the filesystem
/// abstraction and to the owning execution (for growing a `FileSet` target
/// dynamically, or resolving a dependency's resolved path).
pub struct BuildContext<'a> {
    execution: &'a Arc<ExecutionInner>,
    pub dry_run: bool,
}

impl<'a> BuildContext<'a> {
    pub(crate) fn new(execution: &'a Arc<ExecutionInner>, dry_run: bool) -> Self {
        Self { execution, dry_run }
    }

    /// Resolve a node's filesystem path. Panics if called on a `FileSet`
    /// node, which has none.
    pub fn path_of(&self, node: impl Into<NodeId>) -> std::path::PathBuf {
        self.execution
            .path_of(node.into())
            .expect("FileSet nodes have no filesystem path")
    }

    /// Append `file` to a `FileSet` target. Valid during `build()` for any
    /// `FileSet` this builder owns, letting an install-style builder grow
    /// its output list as it processes each source file.
    pub fn add_to_fileset(&self, set: FileSetNode, file: FileNode) {
        self.execution.append_to_fileset(set, file);
    }

    pub fn filesystem(&self) -> &dyn Filesystem {
        self.execution.filesystem()
    }
}

/// Accumulates the depends/builds lists a concrete builder is assembling at
/// construction time, and registers them with the owning environment's
/// execution. Concrete builders embed one of these and delegate to it,
/// the way `mcon/builder.py` builders call `self.depends_file(...)` /
/// `self.register_target(...)`.
pub struct BuilderInputs {
    env: Environment,
    depends: Vec<NodeId>,
    builds: Vec<NodeId>,
}

impl BuilderInputs {
    pub fn new(env: Environment) -> Self {
        Self {
            env,
            depends: Vec::new(),
            builds: Vec::new(),
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn depends(&self) -> &[NodeId] {
        &self.depends
    }

    pub fn builds(&self) -> &[NodeId] {
        &self.builds
    }

    /// Declare a dependency on a single file, interning `path` if it is not
    /// already a `FileNode`.
    pub fn depends_file(
        &mut self,
        path: impl Into<crate::environment::FileSource>,
    ) -> Result<FileNode, EngineError> {
        let node = self.env.file(path)?;
        self.depends.push(node.node_id());
        Ok(node)
    }

    /// Declare a dependency on every file in `paths`.
    pub fn depends_files<I, S>(&mut self, paths: I) -> Result<Vec<FileNode>, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<crate::environment::FileSource>,
    {
        paths.into_iter().map(|p| self.depends_file(p)).collect()
    }

    /// Declare a dependency on a directory listing.
    pub fn depends_dir(
        &mut self,
        path: impl Into<crate::environment::DirSource>,
    ) -> Result<DirNode, EngineError> {
        let node = self.env.dir(path)?;
        self.depends.push(node.node_id());
        Ok(node)
    }

    /// Register a single file this builder will produce.
    pub fn register_file_target(&mut self, path: impl AsRef<Path>) -> Result<FileNode, EngineError> {
        let node = self.env.file(path.as_ref())?;
        self.builds.push(node.node_id());
        Ok(node)
    }

    /// Register a directory this builder will produce (e.g. an unpacked
    /// archive).
    pub fn register_dir_target(&mut self, path: impl AsRef<Path>) -> Result<DirNode, EngineError> {
        let node = self.env.dir(path.as_ref())?;
        self.builds.push(node.node_id());
        Ok(node)
    }

    /// Register a new, empty `FileSet` this builder will populate during
    /// `build()` via [`BuildContext::add_to_fileset`].
    pub fn register_fileset_target(&mut self) -> FileSetNode {
        let node = self.env.execution.new_fileset();
        self.builds.push(node.node_id());
        node
    }
}
