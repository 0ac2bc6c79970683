//! Offline capture-and-sync core for FieldScope inspection devices.
//!
//! Field technicians capture structured inspection records and photo
//! attachments on devices that lose connectivity mid-session. This crate
//! is the durable local mailbox: records and photos persist across
//! process restarts, and a priority-ordered queue hands outstanding work
//! to an uploader with explicit retry and failure accounting.
//!
//! At-least-once delivery intent, single device. No payload
//! interpretation, no network I/O, no cross-device conflict resolution.

pub mod inspections;
pub mod models;
pub mod photos;
pub mod queue;
pub mod store;
pub mod sync;

pub use inspections::InspectionManager;
pub use models::{
    EntityKind, GeoTag, InspectionRecord, PhotoAttachment, PhotoKind, SyncQueueEntry, SyncStatus,
};
pub use photos::AttachmentManager;
pub use queue::SyncQueue;
pub use store::LocalStore;
pub use sync::{RetryPolicy, SyncEngine, SyncReport, Uploader};
