//! Configuration types for the backup service.

use crate::delivery::RecipientId;
use crate::error::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Largest archive part accepted by the delivery channel, minus headroom.
pub const DEFAULT_MAX_PART_SIZE: u64 = 49 * 1024 * 1024;

/// Scheduler wake-up period: 57 minutes, shorter than the 1 hour minimum
/// task interval so scheduling drift stays under one tick.
pub const DEFAULT_TICK_SECS: u64 = 57 * 60;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchivistConfig {
    /// Task store settings.
    pub store: StoreConfig,
    /// Scheduler loop settings.
    pub scheduler: SchedulerConfig,
    /// Archive compressor settings.
    pub archive: ArchiveConfig,
    /// Delivery settings (recipient allow-list, outbox).
    pub delivery: DeliveryConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Task store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file holding the task mapping.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: crate::archivist_dirs::task_store_file(),
        }
    }
}

/// Scheduler loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between evaluation passes.
    pub tick_secs: u64,
    /// Deadline for a single compression or delivery, in seconds.
    pub operation_timeout_secs: u64,
    /// Evaluate immediately at startup instead of waiting one tick.
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: DEFAULT_TICK_SECS,
            operation_timeout_secs: 30 * 60,
            run_on_start: false,
        }
    }
}

impl SchedulerConfig {
    /// Tick interval as a [`Duration`].
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Per-operation deadline as a [`Duration`].
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Archive compressor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Maximum size of one archive part in bytes.
    pub max_part_size: u64,
    /// Deflate level, 0-9.
    pub compression_level: i64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_part_size: DEFAULT_MAX_PART_SIZE,
            compression_level: 9,
        }
    }
}

/// Delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Recipients that receive every scheduled backup.
    pub recipients: Vec<RecipientId>,
    /// Root directory of the local outbox sink.
    pub outbox_dir: PathBuf,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            outbox_dir: crate::archivist_dirs::outbox_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for a daily rolling log file. Stderr only when unset.
    pub dir: Option<PathBuf>,
}

impl ArchivistConfig {
    /// Parse and validate `path`. Missing sections and fields keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// [`BackupError::Io`] when unreadable, [`BackupError::Config`] when the
    /// TOML is invalid or [`Self::validate`] rejects it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| BackupError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML and write to `path`, creating its directory first.
    ///
    /// # Errors
    ///
    /// [`BackupError::Config`] if rendering fails, [`BackupError::Io`] if the
    /// write does.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let rendered = toml::to_string_pretty(self)
            .map_err(|e| BackupError::Config(format!("cannot render config: {e}")))?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, rendered)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    /// Returns the default config file path: `config_dir()/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::archivist_dirs::config_file()
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// [`BackupError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(BackupError::Config(msg.to_owned()));
        if self.scheduler.tick_secs == 0 {
            return fail("scheduler.tick_secs must be greater than zero");
        }
        if self.scheduler.operation_timeout_secs == 0 {
            return fail("scheduler.operation_timeout_secs must be greater than zero");
        }
        if self.archive.max_part_size == 0 {
            return fail("archive.max_part_size must be greater than zero");
        }
        if !(0..=9).contains(&self.archive.compression_level) {
            return fail("archive.compression_level must be between 0 and 9");
        }
        Ok(())
    }
}
