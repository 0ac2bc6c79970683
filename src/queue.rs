//! Priority-ordered delivery queue.
//!
//! The queue is the single source of "what still needs to leave this
//! device". It never performs uploads itself; the sync engine drains it
//! and reports outcomes through the managers.

use anyhow::Result;

use crate::models::{EntityKind, InspectionRecord, PhotoAttachment, SyncQueueEntry};
use crate::store::LocalStore;

pub struct SyncQueue<'a> {
    store: &'a LocalStore,
}

impl<'a> SyncQueue<'a> {
    pub fn new(store: &'a LocalStore) -> Self {
        Self { store }
    }

    /// Idempotent enqueue: the entry id is derived from the entity, so a
    /// second call for the same entity leaves the existing entry (and its
    /// `enqueued_at`) untouched. Retries never jump the queue.
    pub async fn enqueue(
        &self,
        entity: EntityKind,
        reference_id: &str,
        priority: i32,
    ) -> Result<()> {
        let id = SyncQueueEntry::derive_id(entity, reference_id);
        let rw = self.store.db().rw_transaction()?;
        let existing: Option<SyncQueueEntry> = rw.get().primary(id.clone())?;
        if existing.is_none() {
            let mut entry = SyncQueueEntry::new(entity, reference_id.to_string());
            entry.priority = priority;
            rw.insert(entry)?;
            tracing::debug!("enqueued {}", id);
        }
        rw.commit()?;
        Ok(())
    }

    /// Snapshot of the outstanding work, in mandatory drain order:
    /// `(priority asc, enqueued_at asc, id asc)`. Entries are not removed
    /// here; they fall out when their entity is retired.
    pub async fn drain(&self) -> Result<Vec<SyncQueueEntry>> {
        let mut entries: Vec<SyncQueueEntry> = self.store.all()?;
        entries.sort_by(|a, b| {
            (a.priority, a.enqueued_at, &a.id).cmp(&(b.priority, b.enqueued_at, &b.id))
        });
        Ok(entries)
    }

    pub async fn count(&self) -> Result<u64> {
        self.store.count::<SyncQueueEntry>()
    }

    /// Full local-state wipe: inspections, photos and queue entries are
    /// cleared unconditionally in one transaction. Logout and
    /// corrupted-state recovery only; not part of normal operation.
    pub async fn reset(&self) -> Result<()> {
        let rw = self.store.db().rw_transaction()?;

        let inspections = {
            let scan = rw.scan().primary::<InspectionRecord>()?;
            let iter = scan.all()?;
            iter.collect::<Result<Vec<_>, _>>()?
        };
        for record in inspections {
            rw.remove(record)?;
        }

        let photos = {
            let scan = rw.scan().primary::<PhotoAttachment>()?;
            let iter = scan.all()?;
            iter.collect::<Result<Vec<_>, _>>()?
        };
        for photo in photos {
            rw.remove(photo)?;
        }

        let entries = {
            let scan = rw.scan().primary::<SyncQueueEntry>()?;
            let iter = scan.all()?;
            iter.collect::<Result<Vec<_>, _>>()?
        };
        for entry in entries {
            rw.remove(entry)?;
        }

        rw.commit()?;
        tracing::warn!("local store reset: all collections cleared");
        Ok(())
    }
}
