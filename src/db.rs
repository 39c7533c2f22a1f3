//! Persists each entry's committed [`Signature`] across runs.
//!
//! A store only needs to answer two questions: what signature did we commit
//! for this path last time, and please remember this new one. Every backend
//! implements [`MetadataStore`] with `&self` methods rather than `&mut self`,
//! since `set` is called concurrently from worker threads during a build —
//! each backend picks its own interior-mutability strategy (a `RwLock` for
//! the in-memory and dumb-file stores, `redb`'s own MVCC for the satellite
//! crate).

pub mod in_memory;

#[cfg(feature = "db-dumb")]
pub mod dumb;

use std::path::Path;

use crate::node::Signature;

/// Where committed entry signatures are read from and written to.
pub trait MetadataStore: Send + Sync {
    /// The signature committed for `path` on a previous run, if any.
    fn get(&self, path: &Path) -> Option<Signature>;

    /// Commit `signature` as `path`'s current state. Overwrites any prior
    /// value.
    fn set(&self, path: &Path, signature: Signature);

    /// Forget everything committed for `path`. Used when a build fails
    /// partway through, so a later run does not treat a half-written output
    /// as up to date.
    fn invalidate(&self, path: &Path);
}
