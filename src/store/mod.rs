//! Durable task store backed by a single JSON file.
//!
//! Every mutation is a read-modify-write of the whole task mapping performed
//! while holding the store's write lock, and every write goes to a temp file
//! that is fsynced and renamed over the canonical file. Readers never take the
//! lock and may observe a snapshot that is already stale.

pub mod task;

pub use task::{
    DATE_FORMAT, MAX_INTERVAL_HOURS, Task, TaskId, TaskMap, advance, format_timestamp, local_now,
    parse_timestamp,
};

use crate::error::{BackupError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use task::TaskRecord;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Persisted document: `{"tasks": {"<id>": {...}}}`.
///
/// Unknown top-level keys are kept so that rewriting the task mapping never
/// drops state written by other tools.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    tasks: BTreeMap<String, TaskRecord>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Handle to the on-disk task table.
///
/// Share it between the scheduler and front-end callers behind an `Arc`.
#[derive(Debug)]
pub struct TaskStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TaskStore {
    /// Open a store at `path`. The file is created lazily on first access.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Backing file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot of every task.
    ///
    /// Initializes the file with an empty mapping when it does not exist yet.
    ///
    /// # Errors
    ///
    /// [`BackupError::StoreCorruption`] when the file is malformed.
    pub async fn list(&self) -> Result<TaskMap> {
        if let Some(doc) = self.read_document().await? {
            return self.decode(doc);
        }

        // Re-check under the lock so initialization never clobbers a writer
        // that created the file after our first read.
        let _guard = self.write_lock.lock().await;
        match self.read_document().await? {
            Some(doc) => self.decode(doc),
            None => {
                info!(path = %self.path.display(), "initializing empty task store");
                self.write_document(&StoreDocument::default()).await?;
                Ok(TaskMap::new())
            }
        }
    }

    /// Look up one task by id.
    pub async fn get(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.list().await?.remove(&id))
    }

    /// Replace the whole persisted mapping with `tasks`.
    ///
    /// # Errors
    ///
    /// [`BackupError::InvalidTask`] when a key disagrees with its task id or a
    /// task has an out-of-range interval; nothing is written in that case.
    pub async fn upsert_all(&self, tasks: &TaskMap) -> Result<()> {
        let records = encode(tasks)?;
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_document().await?.unwrap_or_default();
        doc.tasks = records;
        self.write_document(&doc).await
    }

    /// Remove one task. Returns `true` when it existed.
    pub async fn delete(&self, id: TaskId) -> Result<bool> {
        self.modify(|tasks| Ok(tasks.remove(&id).is_some())).await
    }

    /// Register a new task with id `max(existing) + 1`, or `0` when empty.
    ///
    /// The id is computed and the task written under one lock acquisition, so
    /// concurrent creations never collide.
    pub async fn create(
        &self,
        path: impl Into<PathBuf>,
        interval_hours: u32,
        next_due_at: NaiveDateTime,
    ) -> Result<Task> {
        let path = path.into();
        self.modify(move |tasks| {
            let id = tasks
                .last_key_value()
                .map(|(id, _)| id.saturating_add(1))
                .unwrap_or(0);
            let task = Task::new(id, path, interval_hours, next_due_at)?;
            tasks.insert(id, task.clone());
            Ok(task)
        })
        .await
    }

    /// Move a task's next due time. Returns `false` when the task was deleted
    /// in the meantime; a deleted task is never resurrected.
    pub async fn rearm(&self, id: TaskId, next_due_at: NaiveDateTime) -> Result<bool> {
        self.modify(|tasks| match tasks.get_mut(&id) {
            Some(task) => {
                task.next_due_at = next_due_at;
                Ok(true)
            }
            None => Ok(false),
        })
        .await
    }

    /// Overwrite the store with an empty mapping. Recovery path for a
    /// corrupted file.
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_document(&StoreDocument::default()).await
    }

    /// Read-modify-write the full mapping under the write lock.
    ///
    /// When `f` fails nothing is written and its error is returned.
    pub async fn modify<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut TaskMap) -> Result<R>,
    {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_document().await?.unwrap_or_default();
        let mut tasks = self.decode_tasks(std::mem::take(&mut doc.tasks))?;
        let out = f(&mut tasks)?;
        doc.tasks = encode(&tasks)?;
        self.write_document(&doc).await?;
        Ok(out)
    }

    async fn read_document(&self) -> Result<Option<StoreDocument>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| self.corruption(e.to_string()))
    }

    async fn write_document(&self, doc: &StoreDocument) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(doc)
            .map_err(|e| BackupError::Io(std::io::Error::other(e)))?;

        let tmp_path = temp_path_for(&self.path);
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!(path = %self.path.display(), tasks = doc.tasks.len(), "task store written");
        Ok(())
    }

    fn decode(&self, doc: StoreDocument) -> Result<TaskMap> {
        self.decode_tasks(doc.tasks)
    }

    fn decode_tasks(&self, records: BTreeMap<String, TaskRecord>) -> Result<TaskMap> {
        let mut tasks = TaskMap::new();
        for (key, record) in records {
            let task = record.into_task(&key).map_err(|reason| self.corruption(reason))?;
            if tasks.insert(task.id, task).is_some() {
                return Err(self.corruption(format!("duplicate task id {key:?}")));
            }
        }
        Ok(tasks)
    }

    fn corruption(&self, reason: String) -> BackupError {
        BackupError::StoreCorruption {
            path: self.path.clone(),
            reason,
        }
    }
}

fn encode(tasks: &TaskMap) -> Result<BTreeMap<String, TaskRecord>> {
    tasks
        .iter()
        .map(|(id, task)| {
            if *id != task.id {
                return Err(BackupError::InvalidTask(format!(
                    "task stored under key {id} has id {}",
                    task.id
                )));
            }
            task::check_interval(task.interval_hours)
                .map_err(|reason| BackupError::InvalidTask(format!("task {id}: {reason}")))?;
            Ok((id.to_string(), TaskRecord::from_task(task)))
        })
        .collect()
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
