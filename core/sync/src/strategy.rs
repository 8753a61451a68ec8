//! Generic per-entity sync strategy.
//!
//! One [`TypedStrategy`] per registered entity type carries the shared
//! pull/push control flow; entity specifics come entirely from the
//! [`SyncRecord`] capability set. Nothing in here is duplicated per type.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use caresync_common::{AccountId, Error, RecordId, Result};
use caresync_model::SyncRecord;
use caresync_remote::{Document, QueryFilter, RemoteStore};
use caresync_store::RecordStore;

use crate::engine::CancelFlag;
use crate::retry::RetryExecutor;

/// Shared collaborators handed to every entity strategy.
pub(crate) struct SyncContext {
    pub store: Arc<RecordStore>,
    pub remote: Arc<dyn RemoteStore>,
    pub retry: Arc<RetryExecutor>,
    pub owner: AccountId,
    pub cancel: CancelFlag,
}

/// What one entity type's pull phase accomplished.
#[derive(Debug, Default)]
pub(crate) struct PullOutcome {
    pub pulled: usize,
    pub skipped: Vec<String>,
    pub cancelled: bool,
}

/// What one entity type's push phase accomplished.
#[derive(Debug, Default)]
pub(crate) struct PushOutcome {
    pub pushed: usize,
    pub deletions: usize,
    pub failures: Vec<(String, Error)>,
    pub cancelled: bool,
}

/// Object-safe face of the generic strategy.
#[async_trait]
pub(crate) trait EntityStrategy: Send + Sync {
    fn collection(&self) -> &'static str;

    /// Merge remote documents into the local store (remote wins on pull).
    async fn pull(&self, ctx: &SyncContext) -> Result<PullOutcome>;

    /// Push unsynced records and pending deletions to the remote store.
    async fn push(&self, ctx: &SyncContext) -> Result<PushOutcome>;
}

pub(crate) struct TypedStrategy<T: SyncRecord> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: SyncRecord> TypedStrategy<T> {
    pub(crate) fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: SyncRecord> EntityStrategy for TypedStrategy<T> {
    fn collection(&self) -> &'static str {
        T::COLLECTION
    }

    async fn pull(&self, ctx: &SyncContext) -> Result<PullOutcome> {
        let mut outcome = PullOutcome::default();

        let filter = QueryFilter::new().field_eq(T::OWNER_FIELD, ctx.owner.as_str());
        let remote = ctx.remote.clone();
        let docs = ctx
            .retry
            .execute(|| {
                let remote = remote.clone();
                let filter = filter.clone();
                async move { remote.fetch_all(T::COLLECTION, &filter).await }
            })
            .await?;

        debug!("Fetched {} documents from {}", docs.len(), T::COLLECTION);

        for doc in docs {
            if ctx.cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let doc_id = doc.id.clone();
            let record_id = match RecordId::new(doc_id.clone()) {
                Ok(id) => id,
                Err(_) => {
                    warn!("Skipping document with empty id in {}", T::COLLECTION);
                    outcome.skipped.push(doc_id);
                    continue;
                }
            };

            // A pulled copy must not resurrect a deletion that has not been
            // pushed yet.
            if ctx.store.has_tombstone(T::COLLECTION, &record_id)? {
                debug!(
                    "Skipping {}/{}: deletion pending locally",
                    T::COLLECTION,
                    record_id
                );
                continue;
            }

            match doc.into_record::<T>() {
                Ok(mut record) => {
                    record.set_synced(true);
                    ctx.store.upsert(&record)?;
                    outcome.pulled += 1;
                }
                Err(e) => {
                    warn!(
                        "Skipping malformed document {}/{}: {}",
                        T::COLLECTION,
                        doc_id,
                        e
                    );
                    outcome.skipped.push(doc_id);
                }
            }
        }

        Ok(outcome)
    }

    async fn push(&self, ctx: &SyncContext) -> Result<PushOutcome> {
        let mut outcome = PushOutcome::default();

        let unsynced = ctx.store.get_unsynced::<T>()?;
        if !unsynced.is_empty() {
            info!(
                "Pushing {} unsynced {} record(s)",
                unsynced.len(),
                T::COLLECTION
            );
        }

        for mut record in unsynced {
            if ctx.cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let id = record.id().clone();

            if let Err(e) = record.validate() {
                warn!(
                    "Not pushing invalid record {}/{}: {}",
                    T::COLLECTION,
                    id,
                    e
                );
                outcome.failures.push((id.to_string(), e));
                continue;
            }

            let doc = match Document::from_record(id.as_str(), &record) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("Failed to encode {}/{}: {}", T::COLLECTION, id, e);
                    outcome.failures.push((id.to_string(), e));
                    continue;
                }
            };

            let remote = ctx.remote.clone();
            let push_result = ctx
                .retry
                .execute(|| {
                    let remote = remote.clone();
                    let doc = doc.clone();
                    let id = id.clone();
                    async move { remote.set(T::COLLECTION, id.as_str(), doc).await }
                })
                .await;

            match push_result {
                Ok(_) => {
                    record.set_synced(true);
                    ctx.store.update(&record)?;
                    outcome.pushed += 1;
                    debug!("Pushed {}/{}", T::COLLECTION, id);
                }
                Err(Error::Cancelled) => {
                    outcome.cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!("Failed to push {}/{}: {}", T::COLLECTION, id, e);
                    outcome.failures.push((id.to_string(), e));
                }
            }
        }

        if outcome.cancelled {
            return Ok(outcome);
        }

        // Propagate pending deletions: the remote document is removed, not
        // merely marked, and only then is the local tombstone purged.
        for tombstone in ctx.store.tombstones(T::COLLECTION)? {
            if ctx.cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let id = tombstone.id.clone();
            let remote = ctx.remote.clone();
            let delete_result = ctx
                .retry
                .execute(|| {
                    let remote = remote.clone();
                    let id = id.clone();
                    async move { remote.delete(T::COLLECTION, id.as_str()).await }
                })
                .await;

            match delete_result {
                Ok(()) => {
                    ctx.store.purge_tombstone(T::COLLECTION, &id)?;
                    outcome.deletions += 1;
                    debug!("Deleted {}/{} remotely", T::COLLECTION, id);
                }
                Err(Error::Cancelled) => {
                    outcome.cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!("Failed to delete {}/{} remotely: {}", T::COLLECTION, id, e);
                    outcome.failures.push((id.to_string(), e));
                }
            }
        }

        Ok(outcome)
    }
}
