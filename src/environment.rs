//! [`Environment`]: the root/build-root context that [`File`](crate::node::FileNode)
//! and [`Dir`](crate::node::DirNode) paths resolve against.
//!
//! Ported from `minicons/environment.py`. Multiple environments can coexist
//! within one [`crate::Execution`]; each `Builder` uses whichever environment
//! it was constructed with to decide where its derived files land.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::EngineError;
use crate::execution::ExecutionInner;
use crate::node::{DirNode, FileNode};

/// Defines where `File`/`Dir` paths resolve from, and where derived files get
/// written by default.
#[derive(Clone)]
pub struct Environment {
    pub(crate) execution: Arc<ExecutionInner>,
    root: PathBuf,
    build_root: PathBuf,
}

impl Environment {
    /// Build an environment rooted at `root` (defaulting to the execution's
    /// own root) with derived files written under `build_root` (defaulting
    /// to `root/build`).
    pub fn new(
        execution: Arc<ExecutionInner>,
        root: Option<PathBuf>,
        build_root: Option<PathBuf>,
    ) -> Self {
        let root = root.unwrap_or_else(|| execution.root().to_path_buf());
        let build_root = build_root.unwrap_or_else(|| root.join("build"));
        Self {
            execution,
            root,
            build_root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn build_root(&self) -> &Path {
        &self.build_root
    }

    /// Intern `path` as a `File` node, or pass an existing `FileNode` through
    /// unchanged. Fails if `path` was already interned as a `Dir` or
    /// `FileSet`.
    pub fn file(&self, path: impl Into<FileSource>) -> Result<FileNode, EngineError> {
        match path.into() {
            FileSource::Existing(f) => Ok(f),
            FileSource::Path(p) => self.execution.intern_file(&self.root.join(p)),
        }
    }

    /// Intern `path` as a `Dir` node with the default `**/*` glob, or pass an
    /// existing `DirNode` through unchanged.
    pub fn dir(&self, path: impl Into<DirSource>) -> Result<DirNode, EngineError> {
        match path.into() {
            DirSource::Existing(d) => Ok(d),
            DirSource::Path(p) => self
                .execution
                .intern_dir(&self.root.join(p), crate::node::DEFAULT_DIR_GLOB),
        }
    }

    /// Like [`Environment::dir`] but with an explicit glob pattern.
    pub fn dir_with_glob(
        &self,
        path: impl AsRef<Path>,
        glob: impl Into<String>,
    ) -> Result<DirNode, EngineError> {
        self.execution
            .intern_dir(&self.root.join(path.as_ref()), &glob.into())
    }

    /// Path to `src` relative to either the environment's root, or — if `src`
    /// falls underneath an immediate subdirectory of `build_root` — relative
    /// to that build subdirectory.
    ///
    /// ```text
    /// env.get_rel_path("foo/bar/baz.txt")          == "foo/bar/baz.txt"
    /// env.get_rel_path("build/bdir/foo/bar/baz.txt") == "foo/bar/baz.txt"
    /// ```
    ///
    /// This lets a builder recreate the relative directory layout of its
    /// input regardless of whether that input is an original source file or
    /// itself a derived file sitting under some other build subdirectory.
    pub fn get_rel_path(&self, src: impl AsRef<Path>) -> PathBuf {
        let src = self.root.join(src.as_ref());

        let ancestors: Vec<&Path> = src.ancestors().skip(1).collect();
        match ancestors.iter().position(|p| *p == self.build_root) {
            Some(index) => {
                // One level below build_root is the build subdirectory;
                // strip up to and including that subdirectory. If src sits
                // directly in build_root with no bucket subdirectory, fall
                // back to the topmost ancestor (filesystem root).
                let subdir = if index == 0 {
                    ancestors[ancestors.len() - 1]
                } else {
                    ancestors[index - 1]
                };
                src.strip_prefix(subdir).unwrap_or(&src).to_path_buf()
            }
            None => src.strip_prefix(&self.root).unwrap_or(&src).to_path_buf(),
        }
    }

    /// Compute a path under `build_root/build_dir` for a file derived from
    /// `src`, preserving `src`'s relative directory structure as returned by
    /// [`Environment::get_rel_path`]. `new_ext` of `Some("")` strips the
    /// extension; `None` leaves it untouched.
    ///
    /// ```text
    /// env.get_build_path("src/foo/bar.c", "obj", Some("o")) == "build/obj/src/foo/bar.o"
    /// ```
    pub fn get_build_path(
        &self,
        src: impl AsRef<Path>,
        build_dir: impl AsRef<Path>,
        new_ext: Option<&str>,
    ) -> PathBuf {
        let rel_path = self.get_rel_path(src);
        let build_dir = self.build_root.join(build_dir.as_ref());
        let mut full_path = build_dir.join(&rel_path);
        if let Some(ext) = new_ext {
            if ext.is_empty() {
                full_path.set_extension("");
            } else {
                full_path.set_extension(ext);
            }
        }
        full_path
    }

    /// Derive a sibling path for `src` under the given build subdirectory,
    /// with an optional new extension. Thin wrapper matching
    /// `Entry.derive()`'s common usage from the original implementation.
    pub fn derive(
        &self,
        src: impl AsRef<Path>,
        build_dir: impl AsRef<Path>,
        new_ext: Option<&str>,
    ) -> Result<FileNode, EngineError> {
        let path = self.get_build_path(src, build_dir, new_ext);
        self.file(FileSource::Path(path))
    }
}

/// Anything that can be turned into a `File` node: a path-like value, or an
/// already-interned `FileNode` (returned as-is, matching
/// `Environment.file()`'s idempotence on existing `File` instances).
pub enum FileSource {
    Path(PathBuf),
    Existing(FileNode),
}

impl From<FileNode> for FileSource {
    fn from(f: FileNode) -> Self {
        FileSource::Existing(f)
    }
}

impl From<&str> for FileSource {
    fn from(s: &str) -> Self {
        FileSource::Path(PathBuf::from(s))
    }
}

impl From<String> for FileSource {
    fn from(s: String) -> Self {
        FileSource::Path(PathBuf::from(s))
    }
}

impl From<PathBuf> for FileSource {
    fn from(p: PathBuf) -> Self {
        FileSource::Path(p)
    }
}

impl From<&Path> for FileSource {
    fn from(p: &Path) -> Self {
        FileSource::Path(p.to_path_buf())
    }
}

/// Anything that can be turned into a `Dir` node. See [`FileSource`].
pub enum DirSource {
    Path(PathBuf),
    Existing(DirNode),
}

impl From<DirNode> for DirSource {
    fn from(d: DirNode) -> Self {
        DirSource::Existing(d)
    }
}

impl From<&str> for DirSource {
    fn from(s: &str) -> Self {
        DirSource::Path(PathBuf::from(s))
    }
}

impl From<String> for DirSource {
    fn from(s: String) -> Self {
        DirSource::Path(PathBuf::from(s))
    }
}

impl From<PathBuf> for DirSource {
    fn from(p: PathBuf) -> Self {
        DirSource::Path(p)
    }
}

impl From<&Path> for DirSource {
    fn from(p: &Path) -> Self {
        DirSource::Path(p.to_path_buf())
    }
}
