//! Core sync engine that orchestrates pull and push passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, warn};

use caresync_common::{AccountId, Error, Result};
use caresync_model::SyncRecord;
use caresync_remote::RemoteStore;
use caresync_store::RecordStore;

use crate::outcome::{EntityReport, SyncReport, SyncResult, SyncStatus};
use crate::retry::{RetryConfig, RetryExecutor};
use crate::strategy::{EntityStrategy, SyncContext, TypedStrategy};

/// Store metadata key recording the end of the last completed run.
pub const META_LAST_FULL_SYNC: &str = "last_full_sync";

/// Cooperative cancellation flag shared between the engine and its caller.
///
/// Cancellation is observed between record operations: the in-flight local
/// or remote operation always completes, so no record is left half-written.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a new, uncancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the running pass stops after the current record.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so a later run can proceed.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Main sync engine.
///
/// Performs, for every registered entity type, a pull phase followed by a
/// push phase, and aggregates outcomes into a [`SyncResult`]. The engine
/// holds no record state of its own beyond one pass; the record store owns
/// the canonical local copies. One run executes at a time; single-flight is
/// the scheduler's guarantee, not a lock in here.
pub struct SyncEngine {
    ctx: SyncContext,
    entities: Vec<Box<dyn EntityStrategy>>,
}

impl SyncEngine {
    /// Create a new sync engine with default retry behavior.
    pub fn new(
        store: Arc<RecordStore>,
        remote: Arc<dyn RemoteStore>,
        owner: AccountId,
    ) -> Self {
        Self::with_retry_config(store, remote, owner, RetryConfig::default())
    }

    /// Create a new sync engine with explicit retry configuration.
    pub fn with_retry_config(
        store: Arc<RecordStore>,
        remote: Arc<dyn RemoteStore>,
        owner: AccountId,
        retry: RetryConfig,
    ) -> Self {
        Self {
            ctx: SyncContext {
                store,
                remote,
                retry: Arc::new(RetryExecutor::new(retry)),
                owner,
                cancel: CancelFlag::new(),
            },
            entities: Vec::new(),
        }
    }

    /// Register an entity type for syncing.
    ///
    /// Creates the entity's local table if needed. Registration order is the
    /// order entity types are processed in a run.
    pub fn register<T: SyncRecord>(&mut self) -> Result<()> {
        self.ctx.store.register::<T>()?;
        self.entities.push(Box::new(TypedStrategy::<T>::new()));
        Ok(())
    }

    /// Get a handle for cancelling a running pass.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.ctx.cancel.clone()
    }

    /// Perform one full sync pass over all registered entity types.
    ///
    /// Never returns an error: every failure is classified into the result
    /// status, and everything committed record-by-record before a failure
    /// stays committed.
    pub async fn run(&self) -> SyncResult {
        let start = Instant::now();
        let mut status = SyncStatus::Success;
        let mut report = SyncReport::default();

        info!(
            "Starting sync run ({} entity types)",
            self.entities.len()
        );

        for strategy in &self.entities {
            if self.ctx.cancel.is_cancelled() {
                report.cancelled = true;
                status.absorb(&Error::Cancelled);
                break;
            }

            let mut entity_report = EntityReport::new(strategy.collection());

            // Pull before push so a push cannot overwrite a remote copy it
            // has not seen yet.
            let mut pull_failed = false;
            match strategy.pull(&self.ctx).await {
                Ok(outcome) => {
                    entity_report.pulled = outcome.pulled;
                    if outcome.cancelled {
                        report.cancelled = true;
                    }
                    if !outcome.skipped.is_empty() {
                        status.absorb(&Error::Deserialization(format!(
                            "{} malformed document(s) in {}",
                            outcome.skipped.len(),
                            strategy.collection()
                        )));
                        entity_report.skipped_documents = outcome.skipped;
                    }
                }
                Err(e) => {
                    error!("Pull failed for {}: {}", strategy.collection(), e);
                    status.absorb(&e);
                    pull_failed = true;
                }
            }

            if report.cancelled || self.ctx.cancel.is_cancelled() {
                report.cancelled = true;
                status.absorb(&Error::Cancelled);
                report.entities.push(entity_report);
                break;
            }

            // When the pull could not complete, pushing would risk
            // overwriting an unseen authoritative remote copy; the records
            // stay unsynced and are retried next run.
            if pull_failed {
                report.entities.push(entity_report);
                continue;
            }

            match strategy.push(&self.ctx).await {
                Ok(outcome) => {
                    entity_report.pushed = outcome.pushed;
                    entity_report.deletions = outcome.deletions;
                    entity_report.push_failures = outcome.failures.len();
                    for (id, e) in &outcome.failures {
                        warn!(
                            "Push failure for {}/{}: {}",
                            strategy.collection(),
                            id,
                            e
                        );
                        status.absorb(e);
                    }
                    if outcome.cancelled {
                        report.cancelled = true;
                        status.absorb(&Error::Cancelled);
                    }
                }
                Err(e) => {
                    error!("Push failed for {}: {}", strategy.collection(), e);
                    status.absorb(&e);
                }
            }

            report.entities.push(entity_report);
            if report.cancelled {
                break;
            }
        }

        if !report.cancelled {
            if let Err(e) = self
                .ctx
                .store
                .meta_set(META_LAST_FULL_SYNC, &Utc::now().to_rfc3339())
            {
                warn!("Failed to record last sync time: {}", e);
                status.absorb(&e);
            }
        }

        report.duration = start.elapsed();
        info!(
            "Sync run finished in {:?}: {} pulled, {} pushed, {} push failure(s), status: {}",
            report.duration,
            report.total_pulled(),
            report.total_pushed(),
            report.total_push_failures(),
            status
        );

        SyncResult { status, report }
    }
}
