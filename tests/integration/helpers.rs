//! Shared helpers for integration tests.

use archivist::scheduler::Clock;
use archivist::test_utils::RecordingSink;
use archivist::{RecipientId, Scheduler, TaskStore};
use chrono::{NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Monday 2026/10/19 12:00:00.
pub(crate) fn noon() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 19)
        .expect("valid date")
        .and_hms_opt(12, 0, 0)
        .expect("valid time")
}

pub(crate) fn fixed_clock(at: NaiveDateTime) -> Clock {
    Arc::new(move || at)
}

/// Deterministic, poorly compressible bytes.
pub(crate) fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

pub(crate) fn write_file(path: &Path, contents: &[u8]) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, contents).expect("write fixture file");
    path.to_path_buf()
}

/// Temp dir with a store and a recording sink.
pub(crate) struct Env {
    pub dir: tempfile::TempDir,
    pub store: Arc<TaskStore>,
    pub sink: Arc<RecordingSink>,
}

impl Env {
    pub fn new(sink: RecordingSink) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = Arc::new(TaskStore::new(dir.path().join("state/tasks.json")));
        Self {
            dir,
            store,
            sink: Arc::new(sink),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Scheduler bound to this env, one recipient, clock fixed at `now`.
    pub fn scheduler(&self, now: NaiveDateTime) -> Scheduler {
        Scheduler::new(Arc::clone(&self.store), self.sink.clone())
            .with_recipients(vec![RecipientId::new("1001")])
            .with_clock(fixed_clock(now))
    }
}

/// Concatenate part payloads back into one archive.
pub(crate) fn reassemble<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
    parts.into_iter().flatten().copied().collect()
}

/// Entry names of a zip archive held in memory.
pub(crate) fn zip_entry_names(archive: &[u8]) -> Vec<String> {
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(archive)).expect("valid zip");
    (0..zip.len())
        .map(|i| zip.by_index(i).expect("entry").name().to_owned())
        .collect()
}
