//! Scheduler background loop.
//!
//! Spawns a tokio task that wakes on a fixed tick, loads every task from the
//! store, and backs up the ones that are due. A task is re-armed only after
//! its archive reached every recipient; any failure leaves its due time alone
//! so the next tick retries it.

use crate::archive::{ArchivePart, Compressor};
use crate::config::ArchivistConfig;
use crate::delivery::{DeliverySink, RecipientId, backup_caption, deliver_to_all};
use crate::error::{BackupError, Result};
use crate::store::{Task, TaskStore, format_timestamp, local_now};
use chrono::NaiveDateTime;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Source of the current local wall-clock time.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Counters for one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tasks loaded from the store.
    pub evaluated: usize,
    /// Due tasks whose target existed.
    pub due: usize,
    /// Due tasks delivered to every recipient.
    pub delivered: usize,
    /// Due tasks that failed and stay due.
    pub failed: usize,
    /// Due tasks skipped because their target is missing.
    pub skipped_missing: usize,
}

/// Background scheduler for recurring backups.
pub struct Scheduler {
    store: Arc<TaskStore>,
    sink: Arc<dyn DeliverySink>,
    compressor: Compressor,
    recipients: Vec<RecipientId>,
    max_part_size: u64,
    tick_interval: Duration,
    operation_timeout: Duration,
    run_on_start: bool,
    clock: Clock,
}

impl Scheduler {
    /// Scheduler with default settings and no recipients.
    pub fn new(store: Arc<TaskStore>, sink: Arc<dyn DeliverySink>) -> Self {
        Self::from_config(&ArchivistConfig::default(), store, sink)
    }

    /// Scheduler configured from `config`.
    pub fn from_config(
        config: &ArchivistConfig,
        store: Arc<TaskStore>,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        Self {
            store,
            sink,
            compressor: Compressor::new(config.archive.compression_level),
            recipients: config.delivery.recipients.clone(),
            max_part_size: config.archive.max_part_size,
            tick_interval: config.scheduler.tick(),
            operation_timeout: config.scheduler.operation_timeout(),
            run_on_start: config.scheduler.run_on_start,
            clock: Arc::new(local_now),
        }
    }

    /// Replace the recipient allow-list.
    pub fn with_recipients(mut self, recipients: Vec<RecipientId>) -> Self {
        self.recipients = recipients;
        self
    }

    /// Override the archive part ceiling.
    pub fn with_max_part_size(mut self, max_part_size: u64) -> Self {
        self.max_part_size = max_part_size;
        self
    }

    /// Override the tick period.
    pub fn with_tick_interval(mut self, tick: Duration) -> Self {
        self.tick_interval = tick;
        self
    }

    /// Override the per-operation deadline.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Evaluate immediately instead of waiting one tick first.
    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Start the scheduler background loop.
    ///
    /// The loop only ends when `cancel` fires or the store turns out to be
    /// corrupted; the latter is returned as the task's error.
    pub fn run(self, cancel: CancellationToken) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move {
            info!(
                recipients = self.recipients.len(),
                tick_secs = self.tick_interval.as_secs(),
                store = %self.store.path().display(),
                "scheduler started"
            );
            if self.recipients.is_empty() {
                warn!("no recipients configured; due backups will be re-armed without being sent");
            }

            let first = if self.run_on_start {
                Instant::now()
            } else {
                Instant::now() + self.tick_interval
            };
            let mut interval = tokio::time::interval_at(first, self.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let pass = tokio::select! {
                    _ = cancel.cancelled() => break,
                    pass = self.tick() => pass,
                };

                match pass {
                    Ok(report) => info!(
                        evaluated = report.evaluated,
                        due = report.due,
                        delivered = report.delivered,
                        failed = report.failed,
                        skipped_missing = report.skipped_missing,
                        "scheduler pass complete"
                    ),
                    Err(e) if e.is_fatal() => {
                        error!(error = %e, "scheduler stopping on unrecoverable store error");
                        return Err(e);
                    }
                    Err(e) => warn!(error = %e, "scheduler pass failed, retrying next tick"),
                }
            }

            info!("scheduler stopped");
            Ok(())
        })
    }

    /// Execute one evaluation pass over every stored task.
    ///
    /// Only a failure to load or re-arm through the store escapes; per-task
    /// failures are logged and counted.
    pub async fn tick(&self) -> Result<TickReport> {
        let tasks = self.store.list().await?;
        let mut report = TickReport {
            evaluated: tasks.len(),
            ..TickReport::default()
        };

        for task in tasks.values() {
            if !task.is_due_at((self.clock)()) {
                continue;
            }

            if !tokio::fs::try_exists(&task.path).await.unwrap_or(false) {
                debug!(
                    task_id = task.id,
                    path = %task.path.display(),
                    "backup target missing, keeping task for a later tick"
                );
                report.skipped_missing += 1;
                continue;
            }
            report.due += 1;

            let fired_at = match self.run_task(task).await {
                Ok(fired_at) => fired_at,
                Err(e) => {
                    warn!(
                        task_id = task.id,
                        path = %task.path.display(),
                        error = %e,
                        "scheduled backup failed, will retry next tick"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            let next_due_at = match task.next_due_after(fired_at) {
                Ok(next_due_at) => next_due_at,
                Err(e) => {
                    warn!(
                        task_id = task.id,
                        error = %e,
                        "backup delivered but next due time is out of range, task stays due"
                    );
                    report.failed += 1;
                    continue;
                }
            };
            match self.store.rearm(task.id, next_due_at).await {
                Ok(true) => {
                    info!(
                        task_id = task.id,
                        next_due_at = %format_timestamp(next_due_at),
                        "backup delivered, task re-armed"
                    );
                    report.delivered += 1;
                }
                Ok(false) => {
                    info!(task_id = task.id, "backup delivered for a task deleted meanwhile");
                    report.delivered += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        task_id = task.id,
                        error = %e,
                        "backup delivered but re-arm failed, task stays due"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Compress and deliver one task. Returns the fire time.
    async fn run_task(&self, task: &Task) -> Result<NaiveDateTime> {
        let fired_at = (self.clock)();
        let parts = compress_with_timeout(
            &self.compressor,
            &task.path,
            self.max_part_size,
            self.operation_timeout,
        )
        .await?;

        let caption = backup_caption(&task.path, fired_at);
        deliver_with_timeout(
            self.sink.as_ref(),
            &self.recipients,
            &parts,
            &caption,
            self.operation_timeout,
        )
        .await?;

        info!(
            task_id = task.id,
            parts = parts.len(),
            recipients = self.recipients.len(),
            "backup sent"
        );
        Ok(fired_at)
    }
}

/// Run a blocking filesystem job on the blocking pool, bounded by `limit`.
///
/// On expiry the job keeps running detached; its result is discarded.
pub(crate) async fn blocking_with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    job: F,
) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(job)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(BackupError::Compression(format!(
            "{operation} task failed: {join}"
        ))),
        Err(_) => Err(BackupError::Timeout {
            operation,
            secs: limit.as_secs(),
        }),
    }
}

/// [`Compressor::compress`] via [`blocking_with_timeout`].
pub(crate) async fn compress_with_timeout(
    compressor: &Compressor,
    path: &Path,
    max_part_size: u64,
    limit: Duration,
) -> Result<Vec<ArchivePart>> {
    let compressor = compressor.clone();
    let path = path.to_path_buf();
    blocking_with_timeout("compression", limit, move || {
        compressor.compress(&path, max_part_size)
    })
    .await
}

/// [`deliver_to_all`] bounded by `limit`.
pub(crate) async fn deliver_with_timeout(
    sink: &dyn DeliverySink,
    recipients: &[RecipientId],
    parts: &[ArchivePart],
    caption: &str,
    limit: Duration,
) -> Result<()> {
    tokio::time::timeout(limit, deliver_to_all(sink, recipients, parts, caption))
        .await
        .map_err(|_| BackupError::Timeout {
            operation: "delivery",
            secs: limit.as_secs(),
        })?
}
