//! An in-memory [`Filesystem`] for exercising the engine without touching
//! real disk.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use trestle::{Filesystem, ObservedMeta};

#[derive(Clone)]
struct MockFile {
    contents: Vec<u8>,
    mtime_ns: i128,
    mode: u32,
}

pub struct MockFilesystem {
    inner: Mutex<MockFsInner>,
}

struct MockFsInner {
    /// Monotonic counter standing in for wall-clock time; bumped every write
    /// so successive writes are always observably newer.
    epoch: i128,
    files: BTreeMap<PathBuf, MockFile>,
}

impl MockFilesystem {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockFsInner {
                epoch: 0,
                files: BTreeMap::new(),
            }),
        }
    }

    /// Write (or create) a file with the given contents, bumping its mtime.
    pub fn write(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let mut inner = self.inner.lock().unwrap();
        inner.epoch += 1;
        let mtime_ns = inner.epoch;
        inner.files.insert(
            path.as_ref().to_path_buf(),
            MockFile {
                contents: contents.as_ref().to_vec(),
                mtime_ns,
                mode: 0o644,
            },
        );
    }

    /// Bump an existing file's mtime without changing its contents. Panics
    /// if the file doesn't exist, since touching a nonexistent file is
    /// always a test bug.
    pub fn touch(&self, path: impl AsRef<Path>) {
        let mut inner = self.inner.lock().unwrap();
        inner.epoch += 1;
        let mtime_ns = inner.epoch;
        let file = inner
            .files
            .get_mut(path.as_ref())
            .unwrap_or_else(|| panic!("cannot touch nonexistent file {:?}", path.as_ref()));
        file.mtime_ns = mtime_ns;
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .files
            .get(path.as_ref())
            .map(|f| f.contents.clone())
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.inner.lock().unwrap().files.remove(path.as_ref());
    }
}

impl Default for MockFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Filesystem for MockFilesystem {
    fn exists(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().files.contains_key(path)
    }

    fn file_metadata(&self, path: &Path) -> ObservedMeta {
        match self.inner.lock().unwrap().files.get(path) {
            Some(f) => ObservedMeta::File {
                mtime_ns: f.mtime_ns,
                mode: f.mode,
                size: f.contents.len() as u64,
            },
            None => ObservedMeta::Missing,
        }
    }

    fn dir_metadata(&self, path: &Path, glob: &dyn Fn(&Path) -> bool) -> ObservedMeta {
        let inner = self.inner.lock().unwrap();
        let mut files = BTreeMap::new();
        for (p, f) in inner.files.iter() {
            let Ok(rel) = p.strip_prefix(path) else {
                continue;
            };
            if glob(rel) {
                files.insert(
                    rel.to_string_lossy().into_owned(),
                    ObservedMeta::File {
                        mtime_ns: f.mtime_ns,
                        mode: f.mode,
                        size: f.contents.len() as u64,
                    },
                );
            }
        }
        ObservedMeta::Dir { mode: 0o755, files }
    }

    fn list_dir(
        &self,
        path: &Path,
        glob: &dyn Fn(&Path) -> bool,
    ) -> std::io::Result<Vec<PathBuf>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .files
            .keys()
            .filter_map(|p| p.strip_prefix(path).ok())
            .filter(|rel| glob(rel))
            .map(|rel| rel.to_path_buf())
            .collect())
    }

    fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        self.inner.lock().unwrap().files.remove(path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> std::io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.files.retain(|p, _| !p.starts_with(path));
        Ok(())
    }

    fn create_dir_all(&self, _path: &Path) -> std::io::Result<()> {
        // Directories are implicit in this mock: any path prefix "exists"
        // for file writes without needing a separate entry.
        Ok(())
    }
}
