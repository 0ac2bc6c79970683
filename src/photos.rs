//! Photo attachments: opaque binaries owned by an inspection.
//!
//! Photos have no lifecycle of their own; they leave the device as part
//! of their owner's retirement (or a full reset) and never individually.

use anyhow::Result;
use uuid::Uuid;

use crate::models::{EntityKind, GeoTag, PhotoAttachment, PhotoAttachmentKey, PhotoKind, SyncQueueEntry};
use crate::store::LocalStore;

pub struct AttachmentManager<'a> {
    store: &'a LocalStore,
}

impl<'a> AttachmentManager<'a> {
    pub fn new(store: &'a LocalStore) -> Self {
        Self { store }
    }

    /// Stores a photo under a fresh id and queues it for delivery at
    /// photo priority, in one transaction. Returns the generated id.
    ///
    /// The owning inspection does not have to exist yet (or ever); an
    /// unresolved `inspection_id` is tolerated and swept when the owner
    /// is retired.
    pub async fn save_photo(
        &self,
        inspection_id: &str,
        payload: Vec<u8>,
        kind: PhotoKind,
        geo_tag: Option<GeoTag>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let photo = PhotoAttachment::new(
            id.clone(),
            inspection_id.to_string(),
            payload,
            kind,
            geo_tag,
        );

        let rw = self.store.db().rw_transaction()?;
        rw.insert(photo)?;
        let queue_id = SyncQueueEntry::derive_id(EntityKind::Photo, &id);
        let queued: Option<SyncQueueEntry> = rw.get().primary(queue_id)?;
        if queued.is_none() {
            rw.insert(SyncQueueEntry::new(EntityKind::Photo, id.clone()))?;
        }
        rw.commit()?;

        tracing::info!(
            "saved {} photo {} for inspection {}",
            kind.as_str(),
            id,
            inspection_id
        );
        Ok(id)
    }

    pub async fn list_by_inspection(&self, inspection_id: &str) -> Result<Vec<PhotoAttachment>> {
        let photos: Vec<PhotoAttachment> = self
            .store
            .get_all_by_index(PhotoAttachmentKey::inspection_id, inspection_id.to_string())?;
        let mut photos: Vec<PhotoAttachment> = photos
            .into_iter()
            .filter(|photo| photo.inspection_id == inspection_id)
            .collect();
        photos.sort_by_key(|photo| (photo.created_at, photo.id.clone()));
        Ok(photos)
    }

    pub async fn get_photo(&self, id: &str) -> Result<Option<PhotoAttachment>> {
        self.store.get(id.to_string())
    }

    pub async fn get_binary_payload(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let photo: Option<PhotoAttachment> = self.store.get(id.to_string())?;
        Ok(photo.map(|photo| photo.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SyncQueue;

    #[tokio::test]
    async fn test_save_photo_generates_id_and_enqueues() {
        let store = LocalStore::in_memory().unwrap();
        let photos = AttachmentManager::new(&store);
        let queue = SyncQueue::new(&store);

        let id = photos
            .save_photo("insp-1", vec![0xde, 0xad], PhotoKind::Dataplate, None)
            .await
            .unwrap();

        assert!(!id.is_empty());
        assert_eq!(queue.count().await.unwrap(), 1);
        let entries = queue.drain().await.unwrap();
        assert_eq!(entries[0].id, format!("photo:{}", id));
        assert_eq!(entries[0].priority, 2);
    }

    #[tokio::test]
    async fn test_list_by_inspection_scopes_to_owner() {
        let store = LocalStore::in_memory().unwrap();
        let photos = AttachmentManager::new(&store);

        photos
            .save_photo("insp-1", vec![1], PhotoKind::Condition, None)
            .await
            .unwrap();
        photos
            .save_photo("insp-1", vec![2], PhotoKind::Pressure, None)
            .await
            .unwrap();
        photos
            .save_photo("insp-2", vec![3], PhotoKind::Other, None)
            .await
            .unwrap();

        let owned = photos.list_by_inspection("insp-1").await.unwrap();
        assert_eq!(owned.len(), 2);
        assert!(owned.iter().all(|p| p.inspection_id == "insp-1"));
        assert!(photos.list_by_inspection("insp-3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_geo_tag_round_trips() {
        let store = LocalStore::in_memory().unwrap();
        let photos = AttachmentManager::new(&store);

        let tag = GeoTag {
            latitude: 40.7128,
            longitude: -74.006,
            accuracy_m: 4.5,
            captured_at: 1_724_400_000_000,
        };
        let id = photos
            .save_photo("insp-1", vec![9], PhotoKind::Pressure, Some(tag.clone()))
            .await
            .unwrap();

        let photo = photos.get_photo(&id).await.unwrap().unwrap();
        assert_eq!(photo.geo_tag, Some(tag));
        assert_eq!(photo.kind, PhotoKind::Pressure);
    }

    #[tokio::test]
    async fn test_get_binary_payload() {
        let store = LocalStore::in_memory().unwrap();
        let photos = AttachmentManager::new(&store);

        let id = photos
            .save_photo("insp-1", vec![1, 2, 3], PhotoKind::Other, None)
            .await
            .unwrap();

        assert_eq!(
            photos.get_binary_payload(&id).await.unwrap(),
            Some(vec![1, 2, 3])
        );
        assert_eq!(photos.get_binary_payload("missing").await.unwrap(), None);
    }
}
