//! Error types for the backup engine.

use std::path::PathBuf;

/// Top-level error type for the backup engine.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Backup target does not exist (vanished, moved, or never existed).
    #[error("path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// Backup target exists but cannot be read.
    #[error("permission denied: {}", .0.display())]
    Permission(PathBuf),

    /// Persisted task store is malformed.
    #[error("task store corrupted ({}): {reason}", path.display())]
    StoreCorruption {
        /// Store file that failed to parse.
        path: PathBuf,
        /// Parser or validation message.
        reason: String,
    },

    /// Delivery transport failure.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Unexpected failure while building an archive.
    #[error("compression error: {0}")]
    Compression(String),

    /// An I/O bound operation exceeded its deadline.
    #[error("{operation} timed out after {secs}s")]
    Timeout {
        /// What was running.
        operation: &'static str,
        /// Deadline in seconds.
        secs: u64,
    },

    /// Task fields rejected before persisting.
    #[error("invalid task: {0}")]
    InvalidTask(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// Whether this error must stop the process instead of being retried.
    ///
    /// Only store corruption is fatal; every other failure is confined to the
    /// task that raised it and retried on the next scheduler tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StoreCorruption { .. })
    }
}

impl From<zip::result::ZipError> for BackupError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => Self::Io(io),
            other => Self::Compression(other.to_string()),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BackupError>;
