//! Sync scheduling - manual and periodic modes.
//!
//! One cancellable task abstraction drives all background syncing; the loop
//! awaits each run to completion, so at most one sync executes at a time
//! (single-flight). Backoff between automatic attempts after a retryable
//! failure is the scheduler's job, not the engine's.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use caresync_common::{Error, Result};

use crate::outcome::{SyncResult, SyncStatus};
use crate::retry::RetryConfig;

/// Sync mode configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncMode {
    /// Sync only when explicitly requested.
    Manual,
    /// Sync at regular intervals.
    Periodic { interval: Duration },
}

/// Scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// When automatic syncs fire.
    pub mode: SyncMode,
    /// Backoff between automatic attempts after a retryable failure.
    pub backoff: RetryConfig,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Periodic {
                interval: Duration::from_secs(15 * 60),
            },
            backoff: RetryConfig::new(8)
                .with_initial_delay(Duration::from_secs(15 * 60))
                .with_max_delay(Duration::from_secs(2 * 60 * 60)),
        }
    }
}

/// Sync request types.
#[derive(Debug)]
enum SyncRequest {
    /// Run a sync now ("retry now").
    Run,
    /// Shut down the scheduler.
    Shutdown,
}

type RequestTx = mpsc::Sender<(SyncRequest, oneshot::Sender<SyncResult>)>;
type RequestRx = mpsc::Receiver<(SyncRequest, oneshot::Sender<SyncResult>)>;

/// Requester half of the scheduler.
pub struct SyncScheduler {
    request_tx: RequestTx,
}

impl SyncScheduler {
    /// Create a scheduler and the handle that runs its background loop.
    pub fn new(config: ScheduleConfig) -> (Self, SchedulerHandle) {
        let (request_tx, request_rx) = mpsc::channel(16);
        (
            Self { request_tx },
            SchedulerHandle { config, request_rx },
        )
    }

    /// Request an immediate sync and wait for its result.
    ///
    /// Requests queue behind a running sync; they never overlap one.
    pub async fn request_sync(&self) -> Result<SyncResult> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send((SyncRequest::Run, reply_tx))
            .await
            .map_err(|_| Error::Internal("Scheduler not running".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::Internal("Scheduler dropped the request".to_string()))
    }

    /// Shut down the scheduler loop.
    pub async fn shutdown(&self) {
        let (reply_tx, _reply_rx) = oneshot::channel();
        let _ = self.request_tx.send((SyncRequest::Shutdown, reply_tx)).await;
    }
}

/// Handle for the scheduler background task.
pub struct SchedulerHandle {
    config: ScheduleConfig,
    request_rx: RequestRx,
}

impl SchedulerHandle {
    /// Run the scheduler loop.
    ///
    /// Spawn this on tokio. `sync_fn` is invoked for every trigger and
    /// awaited to completion before the next trigger is considered.
    pub async fn run<F, Fut>(self, sync_fn: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = SyncResult> + Send,
    {
        let SchedulerHandle {
            config,
            mut request_rx,
        } = self;

        let mut attempts: u32 = 0;
        let mut next_auto = match config.mode {
            SyncMode::Periodic { interval } => Some(Instant::now() + interval),
            SyncMode::Manual => None,
        };

        info!("Sync scheduler started");

        loop {
            tokio::select! {
                request = request_rx.recv() => {
                    match request {
                        None | Some((SyncRequest::Shutdown, _)) => {
                            info!("Sync scheduler shutting down");
                            break;
                        }
                        Some((SyncRequest::Run, reply_tx)) => {
                            debug!("Processing explicit sync request");
                            let result = sync_fn().await;
                            next_auto = schedule_next(&config, &result.status, &mut attempts);
                            let _ = reply_tx.send(result);
                        }
                    }
                }

                _ = wait_until(next_auto), if next_auto.is_some() => {
                    debug!("Triggering scheduled sync");
                    let result = sync_fn().await;
                    match &result.status {
                        SyncStatus::Success => info!(
                            "Scheduled sync completed: {} pulled, {} pushed",
                            result.report.total_pulled(),
                            result.report.total_pushed()
                        ),
                        SyncStatus::Retryable { reason } => {
                            warn!("Scheduled sync will be retried: {}", reason);
                        }
                        SyncStatus::PermanentFailure { reason } => {
                            error!("Scheduled sync failed permanently: {}", reason);
                        }
                    }
                    next_auto = schedule_next(&config, &result.status, &mut attempts);
                }
            }
        }
    }
}

fn schedule_next(
    config: &ScheduleConfig,
    status: &SyncStatus,
    attempts: &mut u32,
) -> Option<Instant> {
    match status {
        SyncStatus::Success => {
            *attempts = 0;
            match config.mode {
                SyncMode::Periodic { interval } => Some(Instant::now() + interval),
                SyncMode::Manual => None,
            }
        }
        SyncStatus::Retryable { .. } => {
            if matches!(config.mode, SyncMode::Manual) {
                return None;
            }
            let delay = config.backoff.delay_for_attempt(*attempts);
            *attempts = attempts.saturating_add(1);
            debug!("Next automatic attempt in {:?}", delay);
            Some(Instant::now() + delay)
        }
        SyncStatus::PermanentFailure { .. } => {
            // Automatic retries stop; an explicit request resumes them.
            *attempts = 0;
            None
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        // Guarded out by the select arm condition.
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::SyncReport;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn result_with(status: SyncStatus) -> SyncResult {
        SyncResult {
            status,
            report: SyncReport::default(),
        }
    }

    fn manual_config() -> ScheduleConfig {
        ScheduleConfig {
            mode: SyncMode::Manual,
            backoff: RetryConfig::new(3).with_jitter(false),
        }
    }

    #[tokio::test]
    async fn test_explicit_request() {
        let (scheduler, handle) = SyncScheduler::new(manual_config());

        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let task = tokio::spawn(handle.run(move || {
            let count = count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                result_with(SyncStatus::Success)
            }
        }));

        let result = scheduler.request_sync().await.unwrap();
        assert!(result.status.is_success());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        scheduler.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_after_shutdown_fails() {
        let (scheduler, handle) = SyncScheduler::new(manual_config());
        let task = tokio::spawn(handle.run(|| async { result_with(SyncStatus::Success) }));

        scheduler.shutdown().await;
        task.await.unwrap();

        assert!(scheduler.request_sync().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_syncs_fire() {
        let config = ScheduleConfig {
            mode: SyncMode::Periodic {
                interval: Duration::from_secs(60),
            },
            backoff: RetryConfig::new(3).with_jitter(false),
        };
        let (scheduler, handle) = SyncScheduler::new(config);

        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let task = tokio::spawn(handle.run(move || {
            let count = count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                result_with(SyncStatus::Success)
            }
        }));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        scheduler.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_result_backs_off() {
        let config = ScheduleConfig {
            mode: SyncMode::Periodic {
                interval: Duration::from_secs(60),
            },
            backoff: RetryConfig::new(8)
                .with_initial_delay(Duration::from_secs(300))
                .with_jitter(false),
        };
        let (scheduler, handle) = SyncScheduler::new(config);

        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let task = tokio::spawn(handle.run(move || {
            let count = count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                result_with(SyncStatus::Retryable {
                    reason: "offline".to_string(),
                })
            }
        }));

        // First attempt at the periodic interval.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // The next attempt waits out the backoff delay, not the interval.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        scheduler.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_suspends_automatic_retries() {
        let config = ScheduleConfig {
            mode: SyncMode::Periodic {
                interval: Duration::from_secs(60),
            },
            backoff: RetryConfig::new(3).with_jitter(false),
        };
        let (scheduler, handle) = SyncScheduler::new(config);

        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let task = tokio::spawn(handle.run(move || {
            let count = count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                result_with(SyncStatus::PermanentFailure {
                    reason: "malformed data".to_string(),
                })
            }
        }));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // No further automatic attempts.
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // An explicit "retry now" still goes through.
        let result = scheduler.request_sync().await.unwrap();
        assert!(matches!(result.status, SyncStatus::PermanentFailure { .. }));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        scheduler.shutdown().await;
        task.await.unwrap();
    }
}
