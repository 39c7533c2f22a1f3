//! Plain `RwLock<HashMap<...>>` metadata store, used by tests and as a
//! scratch default when no persistence is wanted.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use crate::db::MetadataStore;
use crate::node::Signature;

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<HashMap<PathBuf, Signature>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for InMemoryStore {
    fn get(&self, path: &Path) -> Option<Signature> {
        self.inner.read().unwrap().get(path).cloned()
    }

    fn set(&self, path: &Path, signature: Signature) {
        self.inner.write().unwrap().insert(path.to_path_buf(), signature);
    }

    fn invalidate(&self, path: &Path) {
        self.inner.write().unwrap().remove(path);
    }
}
