//! Sync engine: drives outstanding work from the queue to an uploader.
//!
//! The engine is the only consumer of the queue and the only party
//! allowed to decide *when* a failed record is retried. The transport
//! itself lives behind [`Uploader`]; this crate never does network I/O.
//!
//! Obligation carried here on behalf of every executor: the queue's
//! drain order (inspections before their photos) must be respected so
//! the remote record exists before any photo references it. The engine
//! honors it by delivering each inspection's photos under the
//! inspection itself and never uploading a photo independently.

use anyhow::Result;
use chrono::Utc;

use crate::inspections::InspectionManager;
use crate::models::{EntityKind, InspectionRecord, PhotoAttachment, SyncStatus};
use crate::photos::AttachmentManager;
use crate::queue::SyncQueue;
use crate::store::LocalStore;

/// Contract the remote transport must satisfy. Implementations perform
/// the actual upload; errors come back as state via `mark_failed`, never
/// as exceptions past the engine.
pub trait Uploader {
    fn upload_inspection(
        &self,
        record: &InspectionRecord,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn upload_photo(
        &self,
        record: &InspectionRecord,
        photo: &PhotoAttachment,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Exponential back-off eligibility for failed records. Pure function of
/// the record's bookkeeping; the managers themselves never schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay_ms: i64,
    pub max_delay_ms: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 30_000,
            max_delay_ms: 3_600_000,
        }
    }
}

impl RetryPolicy {
    pub fn eligible(&self, record: &InspectionRecord, now_ms: i64) -> bool {
        match record.sync_status() {
            SyncStatus::Pending => true,
            SyncStatus::Syncing => false,
            SyncStatus::Failed => {
                let exponent = record.retry_count.saturating_sub(1).min(20);
                let delay = self
                    .base_delay_ms
                    .saturating_mul(1i64 << exponent)
                    .min(self.max_delay_ms);
                now_ms - record.updated_at >= delay
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub synced: u32,
    pub failed: u32,
    pub skipped: u32,
}

pub struct SyncEngine<'a, U: Uploader> {
    store: &'a LocalStore,
    uploader: U,
    policy: RetryPolicy,
    stale_claim_ms: i64,
}

impl<'a, U: Uploader> SyncEngine<'a, U> {
    pub fn new(store: &'a LocalStore, uploader: U) -> Self {
        Self {
            store,
            uploader,
            policy: RetryPolicy::default(),
            // A claim older than this is assumed orphaned by a crash.
            stale_claim_ms: 10 * 60 * 1000,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_stale_claim_ms(mut self, stale_claim_ms: i64) -> Self {
        self.stale_claim_ms = stale_claim_ms;
        self
    }

    /// One delivery pass over the queue.
    ///
    /// For each inspection entry, in drain order: back-off check, atomic
    /// claim, upload the record, upload each owned photo, then
    /// `mark_synced` on full success or `mark_failed` otherwise. Photo
    /// entries are handled under their owner; an entry whose photo is
    /// already gone was retired by a cascade earlier in the pass.
    pub async fn run_once(&self) -> Result<SyncReport> {
        let inspections = InspectionManager::new(self.store);
        let photos = AttachmentManager::new(self.store);
        let queue = SyncQueue::new(self.store);

        let reclaimed = inspections.reclaim_stale(self.stale_claim_ms).await?;
        if reclaimed > 0 {
            tracing::warn!("reclaimed {} stale claims before sync pass", reclaimed);
        }

        let mut report = SyncReport::default();
        let now = Utc::now().timestamp_millis();

        for entry in queue.drain().await? {
            match entry.entity {
                EntityKind::Inspection => {
                    let record = match inspections.get_inspection(&entry.reference_id).await? {
                        Some(record) => record,
                        None => {
                            report.skipped += 1;
                            continue;
                        }
                    };
                    if !self.policy.eligible(&record, now) {
                        report.skipped += 1;
                        continue;
                    }
                    if !inspections.claim(&record.id).await? {
                        // Another executor got there first.
                        report.skipped += 1;
                        continue;
                    }
                    match self.deliver(&photos, &record).await {
                        Ok(()) => {
                            inspections.mark_synced(&record.id).await?;
                            report.synced += 1;
                        }
                        Err(e) => {
                            inspections.mark_failed(&record.id, &e.to_string()).await?;
                            report.failed += 1;
                        }
                    }
                }
                EntityKind::Photo => {
                    if photos.get_photo(&entry.reference_id).await?.is_some() {
                        // Still waiting on its owner; stays queued.
                        report.skipped += 1;
                    }
                }
            }
        }

        tracing::info!(
            "sync pass: {} synced, {} failed, {} skipped",
            report.synced,
            report.failed,
            report.skipped
        );
        Ok(report)
    }

    async fn deliver(
        &self,
        photos: &AttachmentManager<'_>,
        record: &InspectionRecord,
    ) -> Result<()> {
        self.uploader.upload_inspection(record).await?;
        for photo in photos.list_by_inspection(&record.id).await? {
            self.uploader.upload_photo(record, &photo).await?;
        }
        Ok(())
    }
}
