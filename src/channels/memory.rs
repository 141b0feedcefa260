//! In-memory channel adapter for tests and local dry runs.
//!
//! Inbound messages are pushed with [`InMemoryAdapter::push`]; outbound sends
//! are recorded and can be inspected with [`InMemoryAdapter::sent`].

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use crate::channels::adapter::{ChannelAdapter, RawMessage, SendReceipt};
use crate::error::ChannelError;

/// A message sent through the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: String,
    pub text: String,
}

#[derive(Default)]
pub struct InMemoryAdapter {
    inbox: Mutex<Vec<RawMessage>>,
    outbox: Mutex<Vec<SentMessage>>,
    fail_sends: AtomicBool,
    fail_lists: AtomicBool,
    closed: AtomicBool,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an inbound message. Messages are listed in push order.
    pub fn push(&self, message: RawMessage) {
        self.inbox
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }

    /// Drop every queued inbound message.
    pub fn clear(&self) {
        self.inbox.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Everything sent so far, in send order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.outbox
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Make subsequent sends fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent listings fail.
    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelAdapter for InMemoryAdapter {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<RawMessage>, ChannelError> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(ChannelError::Unreachable {
                name: "memory".into(),
                reason: "listing disabled".into(),
            });
        }
        let inbox = self.inbox.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inbox.iter().take(limit).cloned().collect())
    }

    async fn send(&self, recipient: &str, text: &str) -> Result<SendReceipt, ChannelError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed {
                name: "memory".into(),
                reason: "sending disabled".into(),
            });
        }
        self.outbox
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage {
                recipient: recipient.to_string(),
                text: text.to_string(),
            });
        Ok(SendReceipt { sent_at: Utc::now() })
    }

    async fn close(&self) -> Result<(), ChannelError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
