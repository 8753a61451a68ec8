//! The capability trait shared by all syncable entity types.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use caresync_common::{AccountId, RecordId, Result};

/// Capability set of a syncable entity type.
///
/// One implementation per concrete entity type replaces the per-entity
/// copy-pasted control flow a naive sync layer would grow: the engine's
/// pull/push orchestration is written once against this trait.
///
/// The `synced` flag is local bookkeeping only. It is excluded from
/// serialized payloads (local and wire) and stored in its own column;
/// implementations mark it `#[serde(skip_serializing, default)]`.
pub trait SyncRecord: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Remote collection this entity type lives in.
    const COLLECTION: &'static str;

    /// Local table this entity type is persisted in.
    const TABLE: &'static str;

    /// Document field that scopes remote queries to one account.
    const OWNER_FIELD: &'static str;

    /// Stable identifier, shared between local and remote copies.
    fn id(&self) -> &RecordId;

    /// Account the record belongs to. Immutable after creation.
    fn owner(&self) -> &AccountId;

    /// Whether the local content is known to be reflected remotely.
    fn synced(&self) -> bool;

    /// Set the synced flag.
    fn set_synced(&mut self, synced: bool);

    /// Validate entity-specific field constraints.
    ///
    /// # Errors
    /// - `Error::InvalidRecord` listing every violated constraint
    fn validate(&self) -> Result<()>;
}

/// A pending deletion that has not been propagated remotely yet.
///
/// Created when a record is deleted locally; participates in the push phase
/// (the remote document is removed, not merely marked) and is purged once the
/// remote delete is acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    /// Remote collection of the deleted record.
    pub collection: String,
    /// Identifier of the deleted record.
    pub id: RecordId,
    /// When the local deletion happened.
    pub deleted_at: DateTime<Utc>,
}

impl Tombstone {
    /// Create a tombstone for a record of entity type `T`.
    pub fn new<T: SyncRecord>(id: RecordId) -> Self {
        Self {
            collection: T::COLLECTION.to_string(),
            id,
            deleted_at: Utc::now(),
        }
    }
}
