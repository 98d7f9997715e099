//! Zip archive compressor with size-bounded output parts.
//!
//! The whole target is first written into one deflate-compressed zip stream.
//! When that stream is larger than the part ceiling it is cut into
//! consecutive byte ranges; the cuts ignore entry boundaries, so a part on its
//! own is not a valid archive and only the in-order concatenation is.

pub mod access;

pub use access::{check_readable, normalize_path};

use crate::error::{BackupError, Result};
use bytes::Bytes;
use std::fs;
use std::io::{Cursor, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// One deliverable piece of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePart {
    /// File name: `<basename>.zip`, or `<basename>.zip.part<N>` when split.
    pub name: String,
    /// Raw archive bytes.
    pub data: Bytes,
}

impl ArchivePart {
    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the part carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Builds zip archives of files and directory trees.
#[derive(Debug, Clone)]
pub struct Compressor {
    level: i64,
}

impl Default for Compressor {
    fn default() -> Self {
        Self { level: 9 }
    }
}

impl Compressor {
    /// Compressor using the given deflate level (clamped to 0-9).
    pub fn new(level: i64) -> Self {
        Self {
            level: level.clamp(0, 9),
        }
    }

    /// Archive `path` and split the result into parts of at most
    /// `max_part_size` bytes.
    ///
    /// Blocking: run it on a blocking thread from async code.
    ///
    /// # Errors
    ///
    /// - [`BackupError::PathNotFound`] if `path` does not exist.
    /// - [`BackupError::Permission`] if a single-file target or the root of a
    ///   directory target cannot be read.
    /// - [`BackupError::Compression`] / [`BackupError::Io`] on unexpected
    ///   archive failures.
    pub fn compress(&self, path: &Path, max_part_size: u64) -> Result<Vec<ArchivePart>> {
        if max_part_size == 0 {
            return Err(BackupError::Compression(
                "maximum part size must be greater than zero".to_owned(),
            ));
        }

        let path = normalize_path(path);
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackupError::PathNotFound(path));
            }
            Err(e) => return Err(classify_io(e, &path)),
        };

        let archive = if meta.is_dir() {
            self.archive_directory(&path)?
        } else {
            self.archive_file(&path)?
        };

        let base_name = format!("{}.zip", archive_stem(&path));
        let parts = split_parts(&base_name, Bytes::from(archive), max_part_size);
        debug!(
            path = %path.display(),
            parts = parts.len(),
            bytes = parts.iter().map(ArchivePart::len).sum::<usize>(),
            "archive built"
        );
        Ok(parts)
    }

    fn options(&self) -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .compression_level(Some(self.level))
            .large_file(true)
    }

    fn archive_file(&self, path: &Path) -> Result<Vec<u8>> {
        let mut file = fs::File::open(path).map_err(|e| classify_io(e, path))?;
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file(archive_stem(path), self.options())?;
        std::io::copy(&mut file, &mut zip).map_err(|e| classify_io(e, path))?;
        Ok(zip.finish()?.into_inner())
    }

    fn archive_directory(&self, root: &Path) -> Result<Vec<u8>> {
        // Surface an unreadable root as a hard failure; deeper entries are skipped.
        fs::read_dir(root).map_err(|e| classify_io(e, root))?;

        let prefix = PathBuf::from(archive_stem(root));
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        // Links are archived as what they point to; walkdir reports link
        // cycles as errors, which are skipped below.
        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        path = ?e.path().map(Path::display),
                        error = %e,
                        "skipping unreadable entry during backup walk"
                    );
                    continue;
                }
            };

            let relative = match entry.path().strip_prefix(root) {
                Ok(rel) => prefix.join(rel),
                Err(_) => continue,
            };
            let name = entry_name(&relative);

            if entry.file_type().is_dir() {
                zip.add_directory(name, self.options())?;
            } else if entry.file_type().is_file() {
                self.add_file(&mut zip, entry.path(), &name)?;
            } else {
                warn!(
                    path = %entry.path().display(),
                    "skipping special file during backup walk"
                );
            }
        }

        Ok(zip.finish()?.into_inner())
    }

    /// Append one file, skipping it when it vanished or is unreadable.
    fn add_file<W: Write + Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        path: &Path,
        name: &str,
    ) -> Result<()> {
        let mut file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "file disappeared or became unreadable before backup, skipping"
                );
                return Ok(());
            }
        };

        zip.start_file(name, self.options())?;
        if let Err(e) = std::io::copy(&mut file, zip) {
            // The entry header is already written; a half-read file cannot be
            // dropped from the stream, so the whole archive fails.
            return Err(BackupError::Compression(format!(
                "reading {} failed mid-archive: {e}",
                path.display()
            )));
        }
        Ok(())
    }
}

/// Cut a finished archive into `ceil(len / max_part_size)` parts.
///
/// A stream that fits (including an empty one) becomes a single part named
/// `base_name`; otherwise parts are named `base_name.part0`, `.part1`, ...
pub fn split_parts(base_name: &str, archive: Bytes, max_part_size: u64) -> Vec<ArchivePart> {
    let max = usize::try_from(max_part_size).unwrap_or(usize::MAX).max(1);
    if archive.len() <= max {
        return vec![ArchivePart {
            name: base_name.to_owned(),
            data: archive,
        }];
    }

    let count = archive.len().div_ceil(max);
    (0..count)
        .map(|index| {
            let start = index * max;
            let end = (start + max).min(archive.len());
            ArchivePart {
                name: format!("{base_name}.part{index}"),
                data: archive.slice(start..end),
            }
        })
        .collect()
}

/// Final path component used for archive and entry names.
fn archive_stem(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backup".to_owned())
}

/// Zip entry names always use `/` separators.
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn classify_io(e: std::io::Error, path: &Path) -> BackupError {
    match e.kind() {
        std::io::ErrorKind::NotFound => BackupError::PathNotFound(path.to_path_buf()),
        std::io::ErrorKind::PermissionDenied => BackupError::Permission(path.to_path_buf()),
        _ => BackupError::Io(e),
    }
}
