use native_db::{native_db, ToKey};
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use serde_json;

use chrono::Utc;

// ===== ENUMS =====

/// Lifecycle status of an inspection record on this device.
///
/// Persisted as a plain string so it can double as a secondary key;
/// `SyncStatus` is the typed view used at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Syncing,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Failed => "failed",
        }
    }
}

impl From<&str> for SyncStatus {
    fn from(s: &str) -> Self {
        match s {
            "pending" => SyncStatus::Pending,
            "syncing" => SyncStatus::Syncing,
            "failed" => SyncStatus::Failed,
            _ => SyncStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoKind {
    Pressure,
    Condition,
    Dataplate,
    Other,
}

impl PhotoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoKind::Pressure => "pressure",
            PhotoKind::Condition => "condition",
            PhotoKind::Dataplate => "dataplate",
            PhotoKind::Other => "other",
        }
    }
}

impl From<&str> for PhotoKind {
    fn from(s: &str) -> Self {
        match s {
            "pressure" => PhotoKind::Pressure,
            "condition" => PhotoKind::Condition,
            "dataplate" => PhotoKind::Dataplate,
            _ => PhotoKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Inspection,
    Photo,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Inspection => "inspection",
            EntityKind::Photo => "photo",
        }
    }

    /// Queue priority for this entity kind. Inspections must leave the
    /// device before the photos that reference them.
    pub fn priority(&self) -> i32 {
        match self {
            EntityKind::Inspection => 1,
            EntityKind::Photo => 2,
        }
    }
}

impl From<&str> for EntityKind {
    fn from(s: &str) -> Self {
        match s {
            "inspection" => EntityKind::Inspection,
            "photo" => EntityKind::Photo,
            _ => EntityKind::Inspection,
        }
    }
}

// ===== DATA STRUCTURES =====

/// Optional capture location attached to a photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoTag {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    pub captured_at: i64,
}

/// A technician's structured findings for one visit, pending delivery.
///
/// `payload` is opaque to this crate; the extraction services and the
/// scoring engine are the only parties that interpret it. It is kept as
/// JSON text because the store's wire codec is not self-describing and
/// cannot round-trip a dynamic `serde_json::Value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct InspectionRecord {
    #[primary_key]
    pub id: String,
    pub payload: String,
    pub property_id: Option<String>,
    #[secondary_key]
    pub status: String,
    pub retry_count: u32,
    pub created_at: i64,
    pub updated_at: i64,
    pub error_message: Option<String>,
}

impl Default for InspectionRecord {
    fn default() -> Self {
        Self {
            id: String::new(),
            payload: "null".to_string(),
            property_id: None,
            status: SyncStatus::Pending.as_str().to_string(),
            retry_count: 0,
            created_at: 0,
            updated_at: 0,
            error_message: None,
        }
    }
}

impl InspectionRecord {
    pub fn new(id: String, payload: serde_json::Value, property_id: Option<String>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id,
            payload: payload.to_string(),
            property_id,
            status: SyncStatus::Pending.as_str().to_string(),
            retry_count: 0,
            created_at: now,
            updated_at: now,
            error_message: None,
        }
    }

    pub fn sync_status(&self) -> SyncStatus {
        SyncStatus::from(self.status.as_str())
    }

    /// The payload parsed back into structured form.
    pub fn payload_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.payload)
    }

    pub fn set_status(&mut self, status: SyncStatus) {
        self.status = status.as_str().to_string();
    }
}

/// A binary image owned by one inspection, optionally geotagged.
///
/// Ownership is best-effort: an attachment whose `inspection_id` never
/// resolves is tolerated and swept when the owner is retired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[native_model(id = 2, version = 1)]
#[native_db]
pub struct PhotoAttachment {
    #[primary_key]
    pub id: String,
    #[secondary_key]
    pub inspection_id: String,
    pub payload: Vec<u8>,
    pub kind: PhotoKind,
    pub geo_tag: Option<GeoTag>,
    pub created_at: i64,
}

impl Default for PhotoAttachment {
    fn default() -> Self {
        Self {
            id: String::new(),
            inspection_id: String::new(),
            payload: Vec::new(),
            kind: PhotoKind::Other,
            geo_tag: None,
            created_at: 0,
        }
    }
}

impl PhotoAttachment {
    pub fn new(
        id: String,
        inspection_id: String,
        payload: Vec<u8>,
        kind: PhotoKind,
        geo_tag: Option<GeoTag>,
    ) -> Self {
        Self {
            id,
            inspection_id,
            payload,
            kind,
            geo_tag,
            created_at: Utc::now().timestamp_millis(),
        }
    }
}

/// A pointer into the delivery backlog, one per outstanding entity.
///
/// The primary key is derived from the referenced entity, which is what
/// makes enqueue idempotent: re-saving an entity upserts the same entry
/// instead of growing the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[native_model(id = 3, version = 1)]
#[native_db]
pub struct SyncQueueEntry {
    #[primary_key]
    pub id: String,
    pub entity: EntityKind,
    pub reference_id: String,
    #[secondary_key]
    pub priority: i32,
    pub enqueued_at: i64,
}

impl Default for SyncQueueEntry {
    fn default() -> Self {
        Self {
            id: String::new(),
            entity: EntityKind::Inspection,
            reference_id: String::new(),
            priority: EntityKind::Inspection.priority(),
            enqueued_at: 0,
        }
    }
}

impl SyncQueueEntry {
    /// Deterministic queue id for an entity: at most one live entry per
    /// entity follows from this plus upsert-by-id semantics.
    pub fn derive_id(entity: EntityKind, reference_id: &str) -> String {
        format!("{}:{}", entity.as_str(), reference_id)
    }

    pub fn new(entity: EntityKind, reference_id: String) -> Self {
        Self {
            id: Self::derive_id(entity, &reference_id),
            entity,
            reference_id,
            priority: entity.priority(),
            enqueued_at: Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [SyncStatus::Pending, SyncStatus::Syncing, SyncStatus::Failed] {
            assert_eq!(SyncStatus::from(status.as_str()), status);
        }
        assert_eq!(SyncStatus::from("garbage"), SyncStatus::Pending);
    }

    #[test]
    fn test_photo_kind_defaults_to_other() {
        assert_eq!(PhotoKind::from("dataplate"), PhotoKind::Dataplate);
        assert_eq!(PhotoKind::from("thermal"), PhotoKind::Other);
    }

    #[test]
    fn test_queue_id_is_deterministic() {
        let a = SyncQueueEntry::derive_id(EntityKind::Inspection, "insp-7");
        let b = SyncQueueEntry::new(EntityKind::Inspection, "insp-7".to_string());
        assert_eq!(a, b.id);
        assert_eq!(a, "inspection:insp-7");
        assert_eq!(
            SyncQueueEntry::derive_id(EntityKind::Photo, "insp-7"),
            "photo:insp-7"
        );
    }

    #[test]
    fn test_priorities() {
        assert_eq!(EntityKind::Inspection.priority(), 1);
        assert_eq!(EntityKind::Photo.priority(), 2);
    }

    #[test]
    fn test_new_record_starts_pending() {
        let record = InspectionRecord::new(
            "insp-1".to_string(),
            serde_json::json!({"notes": "leak"}),
            None,
        );
        assert_eq!(record.sync_status(), SyncStatus::Pending);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.created_at, record.updated_at);
        assert!(record.error_message.is_none());
        assert_eq!(
            record.payload_json().unwrap(),
            serde_json::json!({"notes": "leak"})
        );
    }
}
