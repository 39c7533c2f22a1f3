//! A [`trestle::MetadataStore`] backed by an embedded `redb` database, for
//! builds that want persistence across runs without the whole-file-lock
//! contention of [`trestle::DumbFileStore`].
//!
//! Grounded on the teacher crate's own split of its redb backend into a
//! satellite crate (`n2o5-redb`); the table shape here is simpler than the
//! teacher's `BuildHash`/`FileInfo` pair of tables since `MetadataStore` has
//! a single signature-per-path schema rather than separate file-stat and
//! build-hash tables.

use std::path::Path;

use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use trestle::{MetadataStore, Signature};

mod codec;

use codec::PathKey;

static SIGNATURES: TableDefinition<PathKey, &str> = TableDefinition::new("signatures");

pub struct RedbStore {
    db: redb::Database,
}

impl RedbStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, redb::DatabaseError> {
        let db = redb::Database::create(path)?;
        let txn = db.begin_write().expect("failed to begin initial transaction");
        txn.open_table(SIGNATURES)
            .expect("failed to create signatures table");
        txn.commit().expect("failed to commit initial transaction");
        Ok(Self { db })
    }
}

impl MetadataStore for RedbStore {
    fn get(&self, path: &Path) -> Option<Signature> {
        let txn = self.db.begin_read().expect("failed to begin read transaction");
        let table = txn.open_table(SIGNATURES).expect("failed to open signatures table");
        let raw = table.get(path).expect("failed to read signatures table")?;
        serde_json::from_str(raw.value()).ok()
    }

    fn set(&self, path: &Path, signature: Signature) {
        let raw = serde_json::to_string(&signature).expect("signature serializes");
        let txn = self.db.begin_write().expect("failed to begin write transaction");
        {
            let mut table = txn.open_table(SIGNATURES).expect("failed to open signatures table");
            table
                .insert(path, raw.as_str())
                .expect("failed to insert into signatures table");
        }
        txn.commit().expect("failed to commit write transaction");
    }

    fn invalidate(&self, path: &Path) {
        let txn = self.db.begin_write().expect("failed to begin write transaction");
        {
            let mut table = txn.open_table(SIGNATURES).expect("failed to open signatures table");
            table
                .remove(path)
                .expect("failed to remove from signatures table");
        }
        txn.commit().expect("failed to commit write transaction");
    }
}
