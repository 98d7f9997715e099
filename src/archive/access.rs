//! Backup target path normalization and readability checks.

use crate::error::{BackupError, Result};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Lexically normalize a path: drop `.` components and fold `..` into its
/// parent without touching the filesystem. Relative paths stay relative.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Verify that `path` exists and that it, and for a directory everything
/// below it, can be read.
///
/// # Errors
///
/// [`BackupError::PathNotFound`] when `path` is missing and
/// [`BackupError::Permission`] naming the first unreadable entry.
pub fn check_readable(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(BackupError::PathNotFound(path.to_path_buf()));
    }

    if !path.is_dir() {
        return std::fs::File::open(path)
            .map(drop)
            .map_err(|_| BackupError::Permission(path.to_path_buf()));
    }

    for entry in WalkDir::new(path) {
        let entry = entry.map_err(|e| {
            BackupError::Permission(e.path().unwrap_or(path).to_path_buf())
        })?;
        let readable = if entry.file_type().is_dir() {
            std::fs::read_dir(entry.path()).is_ok()
        } else if entry.file_type().is_file() {
            std::fs::File::open(entry.path()).is_ok()
        } else {
            true
        };
        if !readable {
            return Err(BackupError::Permission(entry.path().to_path_buf()));
        }
    }
    Ok(())
}
