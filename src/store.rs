//! Embedded persistent store backing the capture-and-sync subsystem.
//!
//! Owns the `native_db` handle and the schema registry. The store has no
//! business logic: managers compose its primitives, and reach for
//! [`LocalStore::db`] directly when a mutation has to land as one atomic
//! transaction (claims, cascading deletes).

use std::path::Path;

use anyhow::{Context, Result};
use native_db::db_type::{KeyOptions, ToKeyDefinition};
use native_db::{Builder, Database, Models, ToInput, ToKey};
use once_cell::sync::Lazy;

use crate::models::{InspectionRecord, PhotoAttachment, SyncQueueEntry};

// Schema registry. Registration only fails on a duplicate or malformed
// model definition, which is a programming error, not a runtime one.
static MODELS: Lazy<Models> = Lazy::new(|| {
    let mut models = Models::new();
    models
        .define::<InspectionRecord>()
        .expect("InspectionRecord model definition");
    models
        .define::<PhotoAttachment>()
        .expect("PhotoAttachment model definition");
    models
        .define::<SyncQueueEntry>()
        .expect("SyncQueueEntry model definition");
    models
});

/// Handle to the on-device database.
///
/// Constructed once and passed to the managers explicitly; there is no
/// global lazily-initialized handle. Every mutating call commits before
/// it returns, so a reader never observes a partial write.
pub struct LocalStore {
    db: Database<'static>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Opens (creating if absent) the database file at `path`.
    ///
    /// Failures here are storage-fatal: disk full, permissions,
    /// corruption. They propagate to the caller untouched.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = Builder::new()
            .create(&MODELS, path)
            .with_context(|| format!("failed to open local store at {}", path.display()))?;
        tracing::info!("opened local store at {}", path.display());
        Ok(Self { db })
    }

    /// In-memory backend, used by tests and previews.
    pub fn in_memory() -> Result<Self> {
        let db = Builder::new()
            .create_in_memory(&MODELS)
            .context("failed to create in-memory store")?;
        Ok(Self { db })
    }

    /// Raw database access for multi-model atomic transactions.
    pub(crate) fn db(&self) -> &Database<'static> {
        &self.db
    }

    pub fn get<T: ToInput>(&self, key: impl ToKey) -> Result<Option<T>> {
        let r = self.db.r_transaction()?;
        Ok(r.get().primary::<T>(key)?)
    }

    pub fn put<T: ToInput>(&self, item: T) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        rw.upsert(item)?;
        rw.commit()?;
        Ok(())
    }

    /// Removes the item under `key`; returns whether anything was there.
    pub fn delete<T: ToInput>(&self, key: impl ToKey) -> Result<bool> {
        let rw = self.db.rw_transaction()?;
        let existing = rw.get().primary::<T>(key)?;
        let found = match existing {
            Some(item) => {
                rw.remove(item)?;
                true
            }
            None => false,
        };
        rw.commit()?;
        Ok(found)
    }

    pub fn count<T: ToInput>(&self) -> Result<u64> {
        let r = self.db.r_transaction()?;
        Ok(r.len().primary::<T>()?)
    }

    /// All items whose secondary `index` starts with `value`. Exact-match
    /// callers filter the prefix themselves; status values never prefix
    /// one another but entity ids can.
    pub fn get_all_by_index<T: ToInput>(
        &self,
        index: impl ToKeyDefinition<KeyOptions>,
        value: impl ToKey,
    ) -> Result<Vec<T>> {
        let r = self.db.r_transaction()?;
        let items = {
            let scan = r.scan().secondary::<T>(index)?;
            let iter = scan.start_with(value)?;
            iter.collect::<Result<Vec<T>, _>>()?
        };
        Ok(items)
    }

    pub fn all<T: ToInput>(&self) -> Result<Vec<T>> {
        let r = self.db.r_transaction()?;
        let items = {
            let scan = r.scan().primary::<T>()?;
            let iter = scan.all()?;
            iter.collect::<Result<Vec<T>, _>>()?
        };
        Ok(items)
    }

    pub fn clear<T: ToInput>(&self) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        let items = {
            let scan = rw.scan().primary::<T>()?;
            let iter = scan.all()?;
            iter.collect::<Result<Vec<T>, _>>()?
        };
        for item in items {
            rw.remove(item)?;
        }
        rw.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InspectionRecord;

    #[test]
    fn test_put_get_delete_round_trip() {
        let store = LocalStore::in_memory().unwrap();

        let record = InspectionRecord::new(
            "insp-1".to_string(),
            serde_json::json!({"notes": "leak"}),
            Some("prop-9".to_string()),
        );
        store.put(record.clone()).unwrap();

        let loaded: Option<InspectionRecord> = store.get("insp-1").unwrap();
        assert_eq!(loaded, Some(record));
        assert_eq!(store.count::<InspectionRecord>().unwrap(), 1);

        assert!(store.delete::<InspectionRecord>("insp-1").unwrap());
        assert!(!store.delete::<InspectionRecord>("insp-1").unwrap());
        assert_eq!(store.count::<InspectionRecord>().unwrap(), 0);
    }

    #[test]
    fn test_put_is_upsert() {
        let store = LocalStore::in_memory().unwrap();

        let mut record =
            InspectionRecord::new("insp-1".to_string(), serde_json::json!({"v": 1}), None);
        store.put(record.clone()).unwrap();
        record.payload = serde_json::json!({"v": 2}).to_string();
        store.put(record).unwrap();

        assert_eq!(store.count::<InspectionRecord>().unwrap(), 1);
        let loaded: InspectionRecord = store.get("insp-1").unwrap().unwrap();
        assert_eq!(loaded.payload_json().unwrap(), serde_json::json!({"v": 2}));
    }

    #[test]
    fn test_clear_empties_collection() {
        let store = LocalStore::in_memory().unwrap();
        for i in 0..3 {
            store
                .put(InspectionRecord::new(
                    format!("insp-{i}"),
                    serde_json::Value::Null,
                    None,
                ))
                .unwrap();
        }
        store.clear::<InspectionRecord>().unwrap();
        assert_eq!(store.count::<InspectionRecord>().unwrap(), 0);
    }

    #[test]
    fn test_open_creates_and_reopens_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fieldscope.db");

        {
            let store = LocalStore::open(&path).unwrap();
            store
                .put(InspectionRecord::new(
                    "insp-1".to_string(),
                    serde_json::Value::Null,
                    None,
                ))
                .unwrap();
        }

        let store = LocalStore::open(&path).unwrap();
        let loaded: Option<InspectionRecord> = store.get("insp-1").unwrap();
        assert!(loaded.is_some());
    }
}
