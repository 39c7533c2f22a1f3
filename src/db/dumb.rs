//! Whole-file-locked, load-on-open/flush-on-drop metadata store.

use std::{
    collections::HashMap,
    fs::File,
    io::{Read, Seek, Write},
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use crate::db::MetadataStore;
use crate::node::Signature;

const CFG: bincode::config::Configuration = bincode::config::standard();
const MAGIC: &[u8; 16] = b"TRESTLE_DB_00000";

/// File-backed metadata store for small tasks and single runs.
///
/// Loads the entire store into memory on open, holds an exclusive file lock
/// for the lifetime of the instance, and persists the whole state back to
/// disk on drop. Reads and writes during a build are in-memory only; there is
/// no mid-run durability. If the on-disk data cannot be read back, a fresh
/// empty store is used — the next successful run rewrites it from scratch.
///
/// Use when:
/// - Graphs are small and write throughput is low (incremental builds driven
///   from a `build.rs` or a one-shot CLI invocation).
/// - Losing the store on a crash mid-build is acceptable.
///
/// Avoid when:
/// - You expect interrupts mid-run and want partial progress preserved.
/// - The graph is large or long-running; use the `redb`-backed store
///   instead.
pub struct DumbFileStore {
    inner: Arc<DumbInner>,
}

struct DumbInner {
    file: File,
    data: RwLock<HashMap<PathBuf, String>>,
}

/// On-disk representation: path (as a lossy string) paired with its
/// JSON-encoded signature. Plain `String`/`Vec`/tuples are used rather than
/// `HashMap<PathBuf, String>` directly, since those are the types bincode's
/// built-in trait impls are guaranteed to cover.
type OnDisk = Vec<(String, String)>;

impl DumbFileStore {
    /// Open and read the store from `path`, creating it if absent.
    ///
    /// Blocks until an exclusive lock on the file can be acquired, which may
    /// take a while if another process holds it.
    ///
    /// A bad magic header or corrupted body is treated as an empty store
    /// rather than an error.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.lock()?;

        let mut magic_buf = [0u8; 16];
        let Ok(()) = file.read_exact(&mut magic_buf) else {
            tracing::warn!("metadata store has no magic header, starting empty");
            return Ok(Self::create(file, HashMap::new()));
        };
        if &magic_buf != MAGIC {
            tracing::warn!("metadata store magic header mismatch, starting empty");
            return Ok(Self::create(file, HashMap::new()));
        }

        let on_disk: OnDisk = bincode::decode_from_std_read(&mut file, CFG).unwrap_or_default();
        let data = on_disk
            .into_iter()
            .map(|(path, sig)| (PathBuf::from(path), sig))
            .collect();

        Ok(Self::create(file, data))
    }

    fn create(file: File, data: HashMap<PathBuf, String>) -> Self {
        Self {
            inner: Arc::new(DumbInner {
                file,
                data: RwLock::new(data),
            }),
        }
    }
}

impl Drop for DumbInner {
    fn drop(&mut self) {
        let Ok(()) = self.file.rewind() else {
            tracing::error!("failed to rewind metadata store file, not persisting");
            return;
        };
        if self.file.set_len(0).is_err() {
            tracing::error!("failed to truncate metadata store file, not persisting");
            return;
        }
        let data = self.data.get_mut().expect("lock poisoned");
        if self.file.write_all(MAGIC).is_err() {
            tracing::error!("failed to write metadata store magic header");
            return;
        }
        let on_disk: OnDisk = data
            .iter()
            .map(|(path, sig)| (path.to_string_lossy().into_owned(), sig.clone()))
            .collect();
        if bincode::encode_into_std_write(&on_disk, &mut self.file, CFG).is_err() {
            tracing::error!("failed to write metadata store body");
            return;
        }
        let _ = self.file.flush();
    }
}

impl MetadataStore for DumbFileStore {
    fn get(&self, path: &Path) -> Option<Signature> {
        let data = self.inner.data.read().unwrap();
        let raw = data.get(path)?;
        serde_json::from_str(raw).ok()
    }

    fn set(&self, path: &Path, signature: Signature) {
        let raw = serde_json::to_string(&signature).expect("signature serializes");
        self.inner
            .data
            .write()
            .unwrap()
            .insert(path.to_path_buf(), raw);
    }

    fn invalidate(&self, path: &Path) {
        self.inner.data.write().unwrap().remove(path);
    }
}
