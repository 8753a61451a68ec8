//! CareSync Engine
//!
//! This module provides the offline-first synchronization core, including:
//! - Pull/push orchestration per registered entity type
//! - A generic per-entity strategy driven by the SyncRecord capability set
//! - Result and error classification for the scheduler
//! - Retry strategy with exponential backoff
//! - A single-flight scheduler task for manual and periodic syncing

pub mod engine;
pub mod outcome;
pub mod retry;
pub mod scheduler;

mod strategy;

// Re-export main types
pub use engine::{CancelFlag, SyncEngine, META_LAST_FULL_SYNC};
pub use outcome::{classify, EntityReport, Severity, SyncReport, SyncResult, SyncStatus};
pub use retry::{RetryConfig, RetryExecutor};
pub use scheduler::{ScheduleConfig, SchedulerHandle, SyncMode, SyncScheduler};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        // Verify all main types are accessible
        let _retry_config = RetryConfig::default();
        let _schedule_config = ScheduleConfig::default();
        let _status = SyncStatus::Success;
        let _flag = CancelFlag::new();
    }
}
