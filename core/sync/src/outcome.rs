//! Sync run results and error classification.

use std::fmt;
use std::time::Duration;

use caresync_common::Error;

/// How a failure should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Worth retrying later; the condition is expected to self-resolve.
    Transient,
    /// Retrying will not help; needs intervention or escalation.
    Permanent,
}

/// Classify an error for retry purposes.
///
/// Network trouble and cancellation are transient. Quota/permission
/// rejections, local store corruption and malformed data are permanent.
/// Anything unlisted defaults to transient: duplicate work is cheaper than
/// dropping data.
pub fn classify(err: &Error) -> Severity {
    match err {
        Error::QuotaOrPermission(_)
        | Error::LocalStore(_)
        | Error::Deserialization(_)
        | Error::InvalidRecord(_)
        | Error::InvalidInput(_) => Severity::Permanent,
        Error::Network(_) | Error::Timeout(_) | Error::Cancelled | Error::Io(_) => {
            Severity::Transient
        }
        _ => Severity::Transient,
    }
}

/// Terminal classification of a whole sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Every entity type completed pull and push without unrecoverable error.
    Success,
    /// A transient failure occurred; the run should be retried later.
    Retryable { reason: String },
    /// A non-transient failure occurred; automatic retries should stop.
    PermanentFailure { reason: String },
}

impl SyncStatus {
    /// Fold an error into the aggregate status, worst-wins.
    ///
    /// Permanent dominates retryable dominates success; the first reason of
    /// the winning severity is kept.
    pub fn absorb(&mut self, err: &Error) {
        match classify(err) {
            Severity::Permanent => {
                if !matches!(self, SyncStatus::PermanentFailure { .. }) {
                    *self = SyncStatus::PermanentFailure {
                        reason: err.to_string(),
                    };
                }
            }
            Severity::Transient => {
                if matches!(self, SyncStatus::Success) {
                    *self = SyncStatus::Retryable {
                        reason: err.to_string(),
                    };
                }
            }
        }
    }

    /// Whether the run completed without any failure.
    pub fn is_success(&self) -> bool {
        matches!(self, SyncStatus::Success)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Success => write!(f, "success"),
            SyncStatus::Retryable { reason } => write!(f, "retryable: {}", reason),
            SyncStatus::PermanentFailure { reason } => write!(f, "permanent failure: {}", reason),
        }
    }
}

/// Per-entity-type counters for one run.
#[derive(Debug, Clone, Default)]
pub struct EntityReport {
    /// Remote collection name of the entity type.
    pub entity: String,
    /// Documents merged into the local store during pull.
    pub pulled: usize,
    /// Records pushed and marked synced.
    pub pushed: usize,
    /// Deletions propagated remotely (tombstones cleared).
    pub deletions: usize,
    /// Records whose push failed this run.
    pub push_failures: usize,
    /// Ids of remote documents skipped as malformed.
    pub skipped_documents: Vec<String>,
}

impl EntityReport {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            ..Self::default()
        }
    }
}

/// Summary of one sync run across all entity types.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// One entry per registered entity type, in run order.
    pub entities: Vec<EntityReport>,
    /// Whether the run was cut short by cancellation.
    pub cancelled: bool,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl SyncReport {
    /// Total records merged during pull.
    pub fn total_pulled(&self) -> usize {
        self.entities.iter().map(|e| e.pulled).sum()
    }

    /// Total records pushed and marked synced.
    pub fn total_pushed(&self) -> usize {
        self.entities.iter().map(|e| e.pushed).sum()
    }

    /// Total per-record push failures.
    pub fn total_push_failures(&self) -> usize {
        self.entities.iter().map(|e| e.push_failures).sum()
    }
}

/// Outcome of [`SyncEngine::run`](crate::engine::SyncEngine::run).
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// Terminal classification for the scheduler.
    pub status: SyncStatus,
    /// What actually happened, per entity type.
    pub report: SyncReport,
}
