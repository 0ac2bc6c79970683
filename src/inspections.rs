//! Inspection record lifecycle: capture, claim, retry accounting and the
//! cascading retirement that keeps the device mailbox consistent.

use anyhow::Result;
use chrono::Utc;

use crate::models::{
    EntityKind, InspectionRecord, InspectionRecordKey, PhotoAttachment, PhotoAttachmentKey,
    SyncQueueEntry, SyncStatus,
};
use crate::store::LocalStore;

pub struct InspectionManager<'a> {
    store: &'a LocalStore,
}

impl<'a> InspectionManager<'a> {
    pub fn new(store: &'a LocalStore) -> Self {
        Self { store }
    }

    /// Upserts an inspection and makes sure exactly one queue entry
    /// exists for it, all in one transaction.
    ///
    /// The record always comes out `pending`: re-saving a failed record
    /// is the resync path. `retry_count` and `created_at` survive from
    /// any prior record with the same id; only payload, property and
    /// `updated_at` move. An already-queued entry keeps its original
    /// `enqueued_at`, so a resync does not jump the queue.
    pub async fn save_inspection(
        &self,
        id: &str,
        payload: serde_json::Value,
        property_id: Option<String>,
    ) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let rw = self.store.db().rw_transaction()?;

        let prior: Option<InspectionRecord> = rw.get().primary(id.to_string())?;
        let record = match prior {
            Some(prev) => InspectionRecord {
                id: id.to_string(),
                payload: payload.to_string(),
                property_id,
                status: SyncStatus::Pending.as_str().to_string(),
                retry_count: prev.retry_count,
                created_at: prev.created_at,
                updated_at: now.max(prev.updated_at),
                error_message: None,
            },
            None => InspectionRecord::new(id.to_string(), payload, property_id),
        };
        rw.upsert(record)?;

        let queue_id = SyncQueueEntry::derive_id(EntityKind::Inspection, id);
        let queued: Option<SyncQueueEntry> = rw.get().primary(queue_id)?;
        if queued.is_none() {
            rw.insert(SyncQueueEntry::new(EntityKind::Inspection, id.to_string()))?;
        }

        rw.commit()?;
        tracing::info!("saved inspection {} (pending)", id);
        Ok(())
    }

    pub async fn get_inspection(&self, id: &str) -> Result<Option<InspectionRecord>> {
        self.store.get(id.to_string())
    }

    /// All records still waiting for a first (or next) upload attempt.
    /// `syncing` and `failed` records are the executor's and the retry
    /// policy's business respectively, and never show up here.
    pub async fn list_pending(&self) -> Result<Vec<InspectionRecord>> {
        self.list_by_status(SyncStatus::Pending)
    }

    pub async fn list_failed(&self) -> Result<Vec<InspectionRecord>> {
        self.list_by_status(SyncStatus::Failed)
    }

    fn list_by_status(&self, status: SyncStatus) -> Result<Vec<InspectionRecord>> {
        let records: Vec<InspectionRecord> = self
            .store
            .get_all_by_index(InspectionRecordKey::status, status.as_str().to_string())?;
        Ok(records
            .into_iter()
            .filter(|record| record.sync_status() == status)
            .collect())
    }

    /// Atomically takes ownership of a `pending` or `failed` record for
    /// upload, moving it to `syncing`. Returns whether this caller won.
    ///
    /// The read and the write happen inside a single storage transaction,
    /// so two racing executors cannot both claim the same record.
    pub async fn claim(&self, id: &str) -> Result<bool> {
        let rw = self.store.db().rw_transaction()?;
        let record: Option<InspectionRecord> = rw.get().primary(id.to_string())?;
        let mut record = match record {
            Some(record) => record,
            None => return Ok(false),
        };
        match record.sync_status() {
            SyncStatus::Pending | SyncStatus::Failed => {
                record.set_status(SyncStatus::Syncing);
                record.updated_at = Utc::now().timestamp_millis().max(record.updated_at);
                rw.upsert(record)?;
                rw.commit()?;
                tracing::debug!("claimed inspection {}", id);
                Ok(true)
            }
            SyncStatus::Syncing => Ok(false),
        }
    }

    /// Retires a delivered inspection: the record, every photo that
    /// references it (orphans included) and all of their queue entries go
    /// in one transaction. Calling this on an already-removed id is a
    /// no-op.
    pub async fn mark_synced(&self, id: &str) -> Result<()> {
        let rw = self.store.db().rw_transaction()?;

        let record: Option<InspectionRecord> = rw.get().primary(id.to_string())?;
        let had_record = record.is_some();
        if let Some(record) = record {
            rw.remove(record)?;
        }

        let photos = {
            let scan = rw.scan().secondary::<PhotoAttachment>(PhotoAttachmentKey::inspection_id)?;
            let iter = scan.start_with(id.to_string())?;
            iter.collect::<Result<Vec<_>, _>>()?
        };
        let photos: Vec<PhotoAttachment> = photos
            .into_iter()
            .filter(|photo| photo.inspection_id == id)
            .collect();

        let mut queue_ids = Vec::with_capacity(photos.len() + 1);
        queue_ids.push(SyncQueueEntry::derive_id(EntityKind::Inspection, id));
        for photo in photos {
            queue_ids.push(SyncQueueEntry::derive_id(EntityKind::Photo, &photo.id));
            rw.remove(photo)?;
        }
        for queue_id in queue_ids {
            let entry: Option<SyncQueueEntry> = rw.get().primary(queue_id)?;
            if let Some(entry) = entry {
                rw.remove(entry)?;
            }
        }

        rw.commit()?;
        if had_record {
            tracing::info!("inspection {} synced and retired", id);
        }
        Ok(())
    }

    /// Records an upload failure reported by the executor. Failures are
    /// state, not errors: the record stays queued with its counter
    /// bumped. Absent ids are ignored (a racing caller may have synced
    /// and removed the record already).
    pub async fn mark_failed(&self, id: &str, error_message: &str) -> Result<()> {
        let rw = self.store.db().rw_transaction()?;
        let record: Option<InspectionRecord> = rw.get().primary(id.to_string())?;
        let mut record = match record {
            Some(record) => record,
            None => return Ok(()),
        };
        record.set_status(SyncStatus::Failed);
        record.retry_count += 1;
        record.error_message = Some(error_message.to_string());
        record.updated_at = Utc::now().timestamp_millis().max(record.updated_at);
        let retry_count = record.retry_count;
        rw.upsert(record)?;
        rw.commit()?;
        tracing::warn!(
            "inspection {} failed (attempt {}): {}",
            id,
            retry_count,
            error_message
        );
        Ok(())
    }

    /// Recovers records stranded in `syncing` by a crashed executor:
    /// anything claimed longer than `max_age_ms` ago is treated as a
    /// failed attempt and becomes eligible for retry again. Returns the
    /// number of records reclaimed.
    pub async fn reclaim_stale(&self, max_age_ms: i64) -> Result<u32> {
        let now = Utc::now().timestamp_millis();
        let rw = self.store.db().rw_transaction()?;

        let syncing = {
            let scan = rw.scan().secondary::<InspectionRecord>(InspectionRecordKey::status)?;
            let iter = scan.start_with(SyncStatus::Syncing.as_str().to_string())?;
            iter.collect::<Result<Vec<_>, _>>()?
        };

        let mut reclaimed = 0u32;
        for mut record in syncing {
            if record.sync_status() != SyncStatus::Syncing {
                continue;
            }
            if now - record.updated_at < max_age_ms {
                continue;
            }
            record.set_status(SyncStatus::Failed);
            record.retry_count += 1;
            record.error_message = Some("sync claim went stale; reclaimed".to_string());
            record.updated_at = now;
            tracing::warn!("reclaimed stale syncing inspection {}", record.id);
            rw.upsert(record)?;
            reclaimed += 1;
        }

        rw.commit()?;
        Ok(reclaimed)
    }
}
