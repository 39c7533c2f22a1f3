//! Abstracts the filesystem operations the engine needs, so tests can run
//! against an in-memory mock instead of the real disk.
//!
//! All file operations the staleness engine and scheduler perform go through
//! this trait, the same way the teacher crate routes all I/O through its
//! `World` trait.

use std::path::{Path, PathBuf};

use crate::node::ObservedMeta;

/// A view of the outside world as seen by the engine: filesystem queries and
/// mutations only. Builders are free to use `std::fs` directly inside their
/// own `build()` method; this trait exists for the engine's own bookkeeping
/// (staleness checks, pre/post-build hooks), which must be mockable.
pub trait Filesystem: Send + Sync {
    /// Test whether a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Observed metadata for a `File` entry: `Missing` if absent.
    fn file_metadata(&self, path: &Path) -> ObservedMeta;

    /// Observed metadata for a `Dir` entry: the directory's mode plus every
    /// regular file under it matching `glob`, lazily discovered.
    fn dir_metadata(&self, path: &Path, glob: &dyn Fn(&Path) -> bool) -> ObservedMeta;

    /// List every regular file under `path` matching `glob`, relative to
    /// `path`. Used by [`crate::node::NodeKind::Dir`] iteration.
    fn list_dir(&self, path: &Path, glob: &dyn Fn(&Path) -> bool) -> std::io::Result<Vec<PathBuf>>;

    /// Remove a file if it exists. No-op if it does not.
    fn remove_file(&self, path: &Path) -> std::io::Result<()>;

    /// Remove a directory and its contents, recursively. No-op if it does
    /// not exist.
    fn remove_dir_all(&self, path: &Path) -> std::io::Result<()>;

    /// Create `path` and all missing parent directories.
    fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;
}

/// The default [`Filesystem`] implementation, backed by the real local disk.
pub struct LocalFilesystem;

pub static LOCAL_FILESYSTEM: LocalFilesystem = LocalFilesystem;

impl Filesystem for LocalFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn file_metadata(&self, path: &Path) -> ObservedMeta {
        stat_file(path)
    }

    fn dir_metadata(&self, path: &Path, glob: &dyn Fn(&Path) -> bool) -> ObservedMeta {
        let Ok(meta) = std::fs::metadata(path) else {
            return ObservedMeta::Missing;
        };
        let mut files = std::collections::BTreeMap::new();
        if let Ok(entries) = self.list_dir(path, glob) {
            for rel in entries {
                let abs = path.join(&rel);
                files.insert(rel.to_string_lossy().into_owned(), stat_file(&abs));
            }
        }
        ObservedMeta::Dir {
            mode: mode_of(&meta),
            files,
        }
    }

    fn list_dir(&self, path: &Path, glob: &dyn Fn(&Path) -> bool) -> std::io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        walk(path, path, glob, &mut out)?;
        Ok(out)
    }

    fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> std::io::Result<()> {
        match std::fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(path)
    }
}

fn stat_file(path: &Path) -> ObservedMeta {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => ObservedMeta::File {
            mtime_ns: mtime_ns(&meta),
            mode: mode_of(&meta),
            size: meta.len(),
        },
        _ => ObservedMeta::Missing,
    }
}

fn walk(
    root: &Path,
    dir: &Path,
    glob: &dyn Fn(&Path) -> bool,
    out: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(());
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(root, &path, glob, out)?;
        } else if file_type.is_file() {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            if glob(rel) {
                out.push(rel.to_path_buf());
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

#[cfg(not(unix))]
fn mode_of(_meta: &std::fs::Metadata) -> u32 {
    0
}

#[cfg(unix)]
fn mtime_ns(meta: &std::fs::Metadata) -> i128 {
    use std::os::unix::fs::MetadataExt;
    meta.mtime() as i128 * 1_000_000_000 + meta.mtime_nsec() as i128
}

#[cfg(not(unix))]
fn mtime_ns(meta: &std::fs::Metadata) -> i128 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i128)
        .unwrap_or(0)
}
