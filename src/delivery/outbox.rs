//! Local filesystem outbox: a [`DeliverySink`] and [`Notifier`] that drops
//! parts into per-recipient folders.
//!
//! Layout under the outbox root:
//!
//! ```text
//! <root>/<recipient>/000012-photos.zip.part0
//! <root>/<recipient>/ledger.jsonl
//! ```
//!
//! Every send or notice appends one JSON line to the recipient's ledger, so
//! the `reply_to` chain of a split archive can be followed after the fact.

use super::{DeliverySink, MessageRef, Notifier, RecipientId};
use crate::archive::ArchivePart;
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const LEDGER_FILE: &str = "ledger.jsonl";

/// One ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEntry {
    /// An archive part written to the outbox.
    Part {
        message_id: u64,
        file: String,
        caption: String,
        reply_to: Option<u64>,
        sent_at: String,
    },
    /// A text notice.
    Notice {
        message_id: u64,
        text: String,
        sent_at: String,
    },
}

impl LedgerEntry {
    fn message_id(&self) -> u64 {
        match self {
            Self::Part { message_id, .. } | Self::Notice { message_id, .. } => *message_id,
        }
    }
}

/// Filesystem-backed delivery sink.
#[derive(Debug)]
pub struct OutboxSink {
    root: PathBuf,
    last_id: AtomicU64,
}

impl OutboxSink {
    /// Open (or create) an outbox rooted at `root`.
    ///
    /// Message ids continue after the highest id found in existing ledgers.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let last_id = highest_message_id(&root);
        debug!(root = %root.display(), last_id, "outbox opened");
        Ok(Self {
            root,
            last_id: AtomicU64::new(last_id),
        })
    }

    /// Outbox root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder receiving `recipient`'s deliveries.
    pub fn recipient_dir(&self, recipient: &RecipientId) -> PathBuf {
        self.root.join(sanitize_component(recipient.as_str()))
    }

    /// Parse a recipient's ledger.
    pub fn ledger(&self, recipient: &RecipientId) -> Result<Vec<LedgerEntry>> {
        read_ledger(&self.recipient_dir(recipient).join(LEDGER_FILE))
    }

    fn next_id(&self) -> u64 {
        self.last_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn append(&self, dir: &Path, entry: &LedgerEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)
            .map_err(|e| BackupError::Delivery(format!("cannot encode ledger entry: {e}")))?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LEDGER_FILE))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl DeliverySink for OutboxSink {
    async fn send(
        &self,
        recipient: &RecipientId,
        part: &ArchivePart,
        caption: &str,
        reply_to: Option<MessageRef>,
    ) -> Result<MessageRef> {
        let dir = self.recipient_dir(recipient);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| BackupError::Delivery(format!("cannot create {}: {e}", dir.display())))?;

        let message_id = self.next_id();
        let file = format!("{message_id:06}-{}", sanitize_component(&part.name));
        tokio::fs::write(dir.join(&file), &part.data)
            .await
            .map_err(|e| BackupError::Delivery(format!("cannot write {file}: {e}")))?;

        self.append(
            &dir,
            &LedgerEntry::Part {
                message_id,
                file,
                caption: caption.to_owned(),
                reply_to: reply_to.map(|r| r.0),
                sent_at: chrono::Local::now().to_rfc3339(),
            },
        )
        .await?;
        Ok(MessageRef(message_id))
    }
}

#[async_trait]
impl Notifier for OutboxSink {
    async fn notify(&self, recipient: &RecipientId, text: &str) -> Result<()> {
        let dir = self.recipient_dir(recipient);
        tokio::fs::create_dir_all(&dir).await?;
        let entry = LedgerEntry::Notice {
            message_id: self.next_id(),
            text: text.to_owned(),
            sent_at: chrono::Local::now().to_rfc3339(),
        };
        self.append(&dir, &entry).await
    }
}

fn read_ledger(path: &Path) -> Result<Vec<LedgerEntry>> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut entries = Vec::new();
    for line in std::io::BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(path = %path.display(), error = %e, "ignoring malformed ledger line"),
        }
    }
    Ok(entries)
}

fn highest_message_id(root: &Path) -> u64 {
    let Ok(dirs) = std::fs::read_dir(root) else {
        return 0;
    };
    dirs.filter_map(|d| d.ok())
        .filter_map(|d| read_ledger(&d.path().join(LEDGER_FILE)).ok())
        .flatten()
        .map(|entry| entry.message_id())
        .max()
        .unwrap_or(0)
}

/// Make a single, safe path component out of arbitrary text.
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "_".to_owned(),
        other => other.to_owned(),
    }
}
