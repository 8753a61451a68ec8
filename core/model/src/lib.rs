//! Syncable entity types for CareSync.
//!
//! Each entity type that participates in synchronization implements the
//! [`SyncRecord`] trait, which supplies the capability set the generic sync
//! strategy needs: collection and table names, the owner-scoping field, and
//! access to the id, owner and `synced` flag.

pub mod history;
pub mod notification;
pub mod record;

pub use history::{ClientHistoryItem, ConsultationKind};
pub use notification::{Notification, NotificationKind};
pub use record::{SyncRecord, Tombstone};
