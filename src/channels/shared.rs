//! Serializing façade over the single adapter session.
//!
//! The polling loop and the control-plane `/send` handler share one adapter.
//! Every session operation goes through one async mutex so two callers never
//! drive the adapter concurrently.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::channels::adapter::{ChannelAdapter, RawMessage, SendReceipt};
use crate::channels::filters::normalize_address;
use crate::error::ChannelError;

/// Cloneable handle to the shared adapter session.
#[derive(Clone)]
pub struct SharedAdapter {
    inner: Arc<dyn ChannelAdapter>,
    gate: Arc<Mutex<()>>,
}

impl SharedAdapter {
    pub fn new(inner: Arc<dyn ChannelAdapter>) -> Self {
        Self {
            inner,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn list_recent(&self, limit: usize) -> Result<Vec<RawMessage>, ChannelError> {
        let _session = self.gate.lock().await;
        self.inner.list_recent(limit).await
    }

    /// Normalize `recipient` and send `text` to it.
    pub async fn send(&self, recipient: &str, text: &str) -> Result<SendReceipt, ChannelError> {
        let recipient = normalize_address(recipient);
        let _session = self.gate.lock().await;
        debug!(channel = self.inner.name(), recipient = %recipient, "Sending outbound message");
        self.inner.send(&recipient, text).await
    }

    pub async fn close(&self) -> Result<(), ChannelError> {
        let _session = self.gate.lock().await;
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;

    /// Adapter that records the peak number of overlapping sends.
    #[derive(Default)]
    struct OverlapTracker {
        active: AtomicUsize,
        peak: AtomicUsize,
        recipients: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChannelAdapter for OverlapTracker {
        fn name(&self) -> &str {
            "tracker"
        }

        async fn list_recent(&self, _limit: usize) -> Result<Vec<RawMessage>, ChannelError> {
            Ok(Vec::new())
        }

        async fn send(&self, recipient: &str, _text: &str) -> Result<SendReceipt, ChannelError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.recipients.lock().unwrap().push(recipient.to_string());
            Ok(SendReceipt { sent_at: Utc::now() })
        }
    }

    #[tokio::test]
    async fn sends_are_serialized() {
        let tracker = Arc::new(OverlapTracker::default());
        let shared = SharedAdapter::new(tracker.clone());

        let a = shared.clone();
        let b = shared.clone();
        let (r1, r2) = tokio::join!(a.send("5551234567", "one"), b.send("5551234567", "two"));
        r1.unwrap();
        r2.unwrap();

        assert_eq!(tracker.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recipient_is_normalized() {
        let tracker = Arc::new(OverlapTracker::default());
        let shared = SharedAdapter::new(tracker.clone());
        shared.send("(555) 123-4567", "hi").await.unwrap();
        assert_eq!(tracker.recipients.lock().unwrap()[0], "+15551234567");
    }
}
