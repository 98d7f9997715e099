//! Where archivist keeps its files.
//!
//! Config and the task store live under the platform config directory, the
//! local outbox under the platform data directory. `ARCHIVIST_CONFIG_DIR`
//! and `ARCHIVIST_DATA_DIR` replace either root outright.

use std::path::PathBuf;

const APP_DIR: &str = "archivist";

fn resolve(env_key: &str, platform: Option<PathBuf>) -> PathBuf {
    std::env::var_os(env_key)
        .map(PathBuf::from)
        .or_else(|| platform.map(|base| base.join(APP_DIR)))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR))
}

/// Root for the local outbox.
#[must_use]
pub fn data_dir() -> PathBuf {
    resolve("ARCHIVIST_DATA_DIR", dirs::data_dir())
}

/// Root for `config.toml` and `tasks.json`.
#[must_use]
pub fn config_dir() -> PathBuf {
    resolve("ARCHIVIST_CONFIG_DIR", dirs::config_dir())
}

/// `config_dir()/config.toml`.
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// `config_dir()/tasks.json`.
#[must_use]
pub fn task_store_file() -> PathBuf {
    config_dir().join("tasks.json")
}

/// `data_dir()/outbox/`.
#[must_use]
pub fn outbox_dir() -> PathBuf {
    data_dir().join("outbox")
}
