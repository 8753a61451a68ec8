//! In-app notification records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use caresync_common::{AccountId, Error, RecordId, Result};

use crate::record::SyncRecord;

/// Category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    General,
    Appointment,
    Reminder,
    System,
    /// Unrecognized kind; rejected by validation, kept for decoding safety.
    Unknown,
}

impl Default for NotificationKind {
    fn default() -> Self {
        Self::General
    }
}

/// A notification shown to a user, synced between device and backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Stable record identifier.
    pub id: RecordId,
    /// User the notification is addressed to.
    pub user_id: AccountId,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// When the notification was produced.
    pub timestamp: DateTime<Utc>,
    /// Whether the user has opened it.
    #[serde(default)]
    pub read: bool,
    /// Notification category.
    #[serde(default)]
    pub kind: NotificationKind,
    /// Local sync state; never serialized.
    #[serde(skip_serializing, default)]
    pub synced: bool,
}

impl Notification {
    /// Create a new locally authored notification (unsynced).
    pub fn new(
        user_id: AccountId,
        title: impl Into<String>,
        message: impl Into<String>,
        kind: NotificationKind,
    ) -> Self {
        Self {
            id: RecordId::generate(),
            user_id,
            title: title.into(),
            message: message.into(),
            timestamp: Utc::now(),
            read: false,
            kind,
            synced: false,
        }
    }
}

impl SyncRecord for Notification {
    const COLLECTION: &'static str = "notifications";
    const TABLE: &'static str = "notification";
    const OWNER_FIELD: &'static str = "userId";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn owner(&self) -> &AccountId {
        &self.user_id
    }

    fn synced(&self) -> bool {
        self.synced
    }

    fn set_synced(&mut self, synced: bool) {
        self.synced = synced;
    }

    fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.title.trim().is_empty() {
            errors.push("title is required");
        }
        if self.message.trim().is_empty() {
            errors.push("message is required");
        }
        if self.user_id.as_str().trim().is_empty() {
            errors.push("user id is required");
        }
        if self.kind == NotificationKind::Unknown {
            errors.push("invalid notification kind");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidRecord(errors.join("; ")))
        }
    }
}
