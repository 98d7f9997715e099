//! Task management facade used by front-ends.
//!
//! Registration verifies a target end to end before it is stored: the path
//! must be readable and a test archive must reach the requester.

use crate::archive::{Compressor, check_readable, normalize_path};
use crate::config::ArchivistConfig;
use crate::delivery::{DeliverySink, Notifier, RecipientId, test_caption};
use crate::error::{BackupError, Result};
use crate::scheduler::{Clock, blocking_with_timeout, compress_with_timeout, deliver_with_timeout};
use crate::store::{Task, TaskId, TaskMap, TaskStore, advance, format_timestamp, local_now};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Registers, lists, and removes backup tasks.
pub struct BackupService {
    store: Arc<TaskStore>,
    sink: Arc<dyn DeliverySink>,
    notifier: Arc<dyn Notifier>,
    compressor: Compressor,
    max_part_size: u64,
    operation_timeout: Duration,
    clock: Clock,
}

impl BackupService {
    /// Service configured from `config`.
    pub fn from_config(
        config: &ArchivistConfig,
        store: Arc<TaskStore>,
        sink: Arc<dyn DeliverySink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            sink,
            notifier,
            compressor: Compressor::new(config.archive.compression_level),
            max_part_size: config.archive.max_part_size,
            operation_timeout: config.scheduler.operation_timeout(),
            clock: Arc::new(local_now),
        }
    }

    /// Override the archive part ceiling.
    pub fn with_max_part_size(mut self, max_part_size: u64) -> Self {
        self.max_part_size = max_part_size;
        self
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Verify `raw_path`, send a test backup to `requester`, then store a
    /// task that first fires `interval_hours` from now.
    ///
    /// The requester is notified of the outcome either way.
    ///
    /// # Errors
    ///
    /// - [`BackupError::InvalidTask`] for an interval of zero or above
    ///   [`crate::store::MAX_INTERVAL_HOURS`].
    /// - [`BackupError::PathNotFound`] / [`BackupError::Permission`] when the
    ///   target cannot be read.
    /// - Any compression, delivery, or store error from the test run or the
    ///   insert. Nothing is stored in these cases.
    pub async fn register_task(
        &self,
        requester: &RecipientId,
        raw_path: &Path,
        interval_hours: u32,
    ) -> Result<Task> {
        let outcome = self.try_register(requester, raw_path, interval_hours).await;
        let notice = match &outcome {
            Ok(task) => format!(
                "Task {} created: {} every {} hours, next backup at {}",
                task.id,
                task.path.display(),
                task.interval_hours,
                format_timestamp(task.next_due_at)
            ),
            Err(e) => format!("Task not created: {e}"),
        };
        self.notify(requester, &notice).await;
        outcome
    }

    async fn try_register(
        &self,
        requester: &RecipientId,
        raw_path: &Path,
        interval_hours: u32,
    ) -> Result<Task> {
        // Fail on a bad interval before anything is sent.
        advance((self.clock)(), interval_hours)?;

        let path = self.test_backup(requester, raw_path).await?;
        let next_due_at = advance((self.clock)(), interval_hours)?;
        let task = self.store.create(path, interval_hours, next_due_at).await?;
        info!(
            task_id = task.id,
            path = %task.path.display(),
            interval_hours,
            %requester,
            "backup task registered"
        );
        Ok(task)
    }

    /// One-off backup of `raw_path` sent only to `requester`, captioned
    /// `Test backup <name>`. Returns the resolved target path.
    ///
    /// # Errors
    ///
    /// Path, compression, timeout, and delivery errors.
    pub async fn test_backup(&self, requester: &RecipientId, raw_path: &Path) -> Result<PathBuf> {
        let path = resolve_target(raw_path)?;
        let target = path.clone();
        blocking_with_timeout("path check", self.operation_timeout, move || {
            check_readable(&target)
        })
        .await?;

        let parts = compress_with_timeout(
            &self.compressor,
            &path,
            self.max_part_size,
            self.operation_timeout,
        )
        .await?;
        deliver_with_timeout(
            self.sink.as_ref(),
            std::slice::from_ref(requester),
            &parts,
            &test_caption(&path),
            self.operation_timeout,
        )
        .await?;

        info!(path = %path.display(), parts = parts.len(), %requester, "test backup sent");
        Ok(path)
    }

    /// Every stored task, by id.
    pub async fn list_tasks(&self) -> Result<TaskMap> {
        self.store.list().await
    }

    /// Remove a task. Returns `false` when no such task existed.
    pub async fn delete_task(&self, id: TaskId) -> Result<bool> {
        let removed = self.store.delete(id).await?;
        if removed {
            info!(task_id = id, "backup task deleted");
        }
        Ok(removed)
    }

    async fn notify(&self, recipient: &RecipientId, text: &str) {
        if let Err(e) = self.notifier.notify(recipient, text).await {
            warn!(%recipient, error = %e, "failed to notify requester");
        }
    }
}

/// Absolute, lexically normalized form of a user-supplied path.
fn resolve_target(raw: &Path) -> Result<PathBuf> {
    if raw.as_os_str().is_empty() {
        return Err(BackupError::InvalidTask("empty path".to_owned()));
    }
    Ok(normalize_path(&std::path::absolute(raw)?))
}
