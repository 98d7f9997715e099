//! Delivery seams: where archive parts and text notices leave the engine.
//!
//! The engine never talks to a transport directly. It hands parts to a
//! [`DeliverySink`] and text to a [`Notifier`]; concrete transports live
//! behind these traits.

pub mod outbox;

pub use outbox::OutboxSink;

use crate::archive::ArchivePart;
use crate::error::Result;
use crate::store::format_timestamp;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Opaque recipient address understood by the sink (chat id, user id, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(String);

impl RecipientId {
    /// Wrap a raw recipient address.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a delivered message, used to chain follow-up parts to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef(pub u64);

/// Transport for archive parts.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Send one part to `recipient` with `caption`, threaded under
    /// `reply_to` when given.
    async fn send(
        &self,
        recipient: &RecipientId,
        part: &ArchivePart,
        caption: &str,
        reply_to: Option<MessageRef>,
    ) -> Result<MessageRef>;
}

/// Transport for plain-text notices to a user.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` to `recipient`.
    async fn notify(&self, recipient: &RecipientId, text: &str) -> Result<()>;
}

/// Send every part to one recipient in order, each part replying to the one
/// before it. Stops at the first failure.
pub async fn deliver_parts(
    sink: &dyn DeliverySink,
    recipient: &RecipientId,
    parts: &[ArchivePart],
    caption: &str,
) -> Result<Vec<MessageRef>> {
    let mut refs = Vec::with_capacity(parts.len());
    let mut previous = None;
    for part in parts {
        let sent = sink.send(recipient, part, caption, previous).await?;
        debug!(%recipient, part = %part.name, message = sent.0, "archive part delivered");
        refs.push(sent);
        previous = Some(sent);
    }
    Ok(refs)
}

/// Caption attached to every part of a scheduled backup.
pub fn backup_caption(path: &Path, made_at: NaiveDateTime) -> String {
    format!(
        "Backup of {}\nMade at: {}",
        display_name(path),
        format_timestamp(made_at)
    )
}

/// Caption attached to the verification backup sent on registration.
pub fn test_caption(path: &Path) -> String {
    format!("Test backup {}", display_name(path))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// [`deliver_parts`] for each recipient in turn. Any failure fails the whole
/// delivery.
pub async fn deliver_to_all(
    sink: &dyn DeliverySink,
    recipients: &[RecipientId],
    parts: &[ArchivePart],
    caption: &str,
) -> Result<()> {
    for recipient in recipients {
        deliver_parts(sink, recipient, parts, caption).await?;
    }
    Ok(())
}
