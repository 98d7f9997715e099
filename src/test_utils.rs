//! Shared test utilities used by unit and integration tests.

use crate::archive::ArchivePart;
use crate::delivery::{DeliverySink, MessageRef, Notifier, RecipientId};
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One part captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPart {
    pub recipient: RecipientId,
    pub part_name: String,
    pub bytes: Vec<u8>,
    pub caption: String,
    pub reply_to: Option<MessageRef>,
    pub message: MessageRef,
}

/// In-memory sink and notifier that records everything it is given.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<SentPart>>,
    notices: Mutex<Vec<(RecipientId, String)>>,
    next_id: AtomicU64,
    fail_after: Option<usize>,
    delay: Option<Duration>,
}

impl RecordingSink {
    /// Sink that accepts every part.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that accepts `n` parts and fails every later send.
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    /// Sink that sleeps `delay` before each send.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Parts accepted so far, in send order.
    pub fn sent(&self) -> Vec<SentPart> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Text notices accepted so far.
    pub fn notices(&self) -> Vec<(RecipientId, String)> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn send(
        &self,
        recipient: &RecipientId,
        part: &ArchivePart,
        caption: &str,
        reply_to: Option<MessageRef>,
    ) -> Result<MessageRef> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut sent = self
            .sent
            .lock()
            .map_err(|_| BackupError::Delivery("recording sink poisoned".to_owned()))?;
        if self.fail_after.is_some_and(|n| sent.len() >= n) {
            return Err(BackupError::Delivery("simulated transport failure".to_owned()));
        }

        let message = MessageRef(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        sent.push(SentPart {
            recipient: recipient.clone(),
            part_name: part.name.clone(),
            bytes: part.data.to_vec(),
            caption: caption.to_owned(),
            reply_to,
            message,
        });
        Ok(message)
    }
}

#[async_trait]
impl Notifier for RecordingSink {
    async fn notify(&self, recipient: &RecipientId, text: &str) -> Result<()> {
        self.notices
            .lock()
            .map_err(|_| BackupError::Delivery("recording sink poisoned".to_owned()))?
            .push((recipient.clone(), text.to_owned()));
        Ok(())
    }
}
