//! Task records and their persisted shape.
//!
//! On disk a task is `{"path": ..., "sheduledTo": ..., "delay": ...}` keyed by
//! its decimal id. The misspelled `sheduledTo` key is part of the stored format
//! and must be kept for existing stores to load.

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Local wall-clock format used for `sheduledTo`, e.g. `Monday 2026/10/19 13:00:00`.
pub const DATE_FORMAT: &str = "%A %Y/%m/%d %H:%M:%S";

/// Longest accepted interval: one hundred years of hours.
pub const MAX_INTERVAL_HOURS: u32 = 100 * 366 * 24;

/// Task identifier, unique within one store.
pub type TaskId = u64;

/// Full task collection in store iteration order.
pub type TaskMap = BTreeMap<TaskId, Task>;

/// A recurring backup of one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Store-assigned identifier.
    pub id: TaskId,
    /// Normalized file or directory path.
    pub path: PathBuf,
    /// Re-arm period in hours, always > 0.
    pub interval_hours: u32,
    /// Local time at or after which the task is due.
    pub next_due_at: NaiveDateTime,
}

impl Task {
    /// Build a task, rejecting an interval outside `1..=MAX_INTERVAL_HOURS`.
    pub fn new(
        id: TaskId,
        path: impl Into<PathBuf>,
        interval_hours: u32,
        next_due_at: NaiveDateTime,
    ) -> crate::Result<Self> {
        check_interval(interval_hours).map_err(crate::BackupError::InvalidTask)?;
        Ok(Self {
            id,
            path: path.into(),
            interval_hours,
            next_due_at,
        })
    }

    /// Returns `true` when `now` has reached the next due time.
    pub fn is_due_at(&self, now: NaiveDateTime) -> bool {
        now >= self.next_due_at
    }

    /// Re-arm period as a [`TimeDelta`].
    pub fn interval(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.interval_hours))
    }

    /// Next due time for a run that fired at `fired_at`.
    ///
    /// # Errors
    ///
    /// [`crate::BackupError::InvalidTask`] when the sum leaves the calendar range.
    pub fn next_due_after(&self, fired_at: NaiveDateTime) -> crate::Result<NaiveDateTime> {
        advance(fired_at, self.interval_hours)
    }
}

/// `from + hours`, failing instead of overflowing.
///
/// # Errors
///
/// [`crate::BackupError::InvalidTask`] for an out-of-range interval or a
/// result past the last representable date.
pub fn advance(from: NaiveDateTime, hours: u32) -> crate::Result<NaiveDateTime> {
    check_interval(hours).map_err(crate::BackupError::InvalidTask)?;
    from.checked_add_signed(TimeDelta::hours(i64::from(hours)))
        .ok_or_else(|| {
            crate::BackupError::InvalidTask(format!(
                "{} plus {hours} hours is out of range",
                format_timestamp(from)
            ))
        })
}

pub(crate) fn check_interval(hours: u32) -> Result<(), String> {
    match hours {
        0 => Err("interval must be at least one hour".to_owned()),
        h if h > MAX_INTERVAL_HOURS => Err(format!(
            "interval of {h} hours exceeds the {MAX_INTERVAL_HOURS} hour maximum"
        )),
        _ => Ok(()),
    }
}

/// Format a timestamp the way the store persists it.
pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(DATE_FORMAT).to_string()
}

/// Parse a persisted `sheduledTo` timestamp.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw.trim(), DATE_FORMAT)
}

/// Current local wall-clock time.
pub fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TaskRecord {
    path: String,
    #[serde(rename = "sheduledTo")]
    scheduled_to: String,
    delay: u32,
}

impl TaskRecord {
    pub(crate) fn from_task(task: &Task) -> Self {
        Self {
            path: task.path.to_string_lossy().into_owned(),
            scheduled_to: format_timestamp(task.next_due_at),
            delay: task.interval_hours,
        }
    }

    /// Decode the record stored under `key`. Errors are plain reasons; the
    /// store wraps them into a corruption error carrying its path.
    pub(crate) fn into_task(self, key: &str) -> Result<Task, String> {
        let id: TaskId = key
            .parse()
            .map_err(|_| format!("task key {key:?} is not a non-negative integer"))?;
        let next_due_at = parse_timestamp(&self.scheduled_to)
            .map_err(|e| format!("task {id}: bad sheduledTo {:?}: {e}", self.scheduled_to))?;
        check_interval(self.delay).map_err(|reason| format!("task {id}: bad delay: {reason}"))?;
        Ok(Task {
            id,
            path: PathBuf::from(self.path),
            interval_hours: self.delay,
            next_due_at,
        })
    }
}
