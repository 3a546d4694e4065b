//! Interval scheduler driving the sync engine.
//!
//! A single background task sleeps for the configured interval and invokes
//! the job once per tick. Tick failures are logged and the loop carries on:
//! there is no backoff and missed ticks are not coalesced. Stopping cancels
//! the task and awaits its handle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use calbridge_core::SyncEngine;
use calbridge_domain::{Result as DomainResult, SyncReport};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Unit of work executed on every tick.
#[async_trait]
pub trait SyncJob: Send + Sync {
    async fn run(&self) -> DomainResult<SyncReport>;
}

#[async_trait]
impl SyncJob for SyncEngine {
    async fn run(&self) -> DomainResult<SyncReport> {
        self.sync().await
    }
}

/// Type alias for task handle to avoid complexity warnings
type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Configuration for the sync scheduler
#[derive(Debug, Clone)]
pub struct SyncSchedulerConfig {
    /// Sleep between the end of one run and the start of the next.
    pub interval: Duration,
    /// Timeout for awaiting the background task handle on stop.
    pub join_timeout: Duration,
}

impl Default for SyncSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(86_400), // 24 hours
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Periodic driver for the sync engine
pub struct SyncScheduler {
    job: Arc<dyn SyncJob>,
    config: SyncSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl SyncScheduler {
    pub fn new(job: Arc<dyn SyncJob>, config: SyncSchedulerConfig) -> Self {
        Self {
            job,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the scheduler, spawning the background loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler is already running.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        // A fresh token supports restart after stop.
        self.cancellation_token = CancellationToken::new();

        let job = Arc::clone(&self.job);
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            Self::sync_loop(job, config, cancel).await;
        });

        *self.task_handle.lock().await = Some(handle);

        info!(interval_secs = self.config.interval.as_secs(), "sync scheduler started");
        Ok(())
    }

    /// Stop the scheduler and wait for the background task to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler is not running.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|err| SchedulerError::TaskJoinFailed(err.to_string()))?;
        }

        info!("sync scheduler stopped");
        Ok(())
    }

    /// Check if the scheduler has a live background task.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    async fn sync_loop(
        job: Arc<dyn SyncJob>,
        config: SyncSchedulerConfig,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("sync loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.interval) => {
                    let started = Instant::now();
                    match job.run().await {
                        Ok(report) => {
                            info!(
                                duration_ms = started.elapsed().as_millis() as u64,
                                events = report.events_observed,
                                issues = report.issues_observed,
                                failed_items = report.items_failed,
                                "scheduled sync finished"
                            );
                        }
                        Err(err) => {
                            error!(error = %err, "scheduled sync failed");
                        }
                    }
                }
            }
        }
    }
}

/// Ensure outstanding work is cancelled when dropped
impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if !self.cancellation_token.is_cancelled() {
            self.cancellation_token.cancel();
        }
    }
}
