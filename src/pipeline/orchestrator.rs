//! Orchestrator — the polling loop that routes each candidate message to the
//! receipt or chat path and sends the result back on the channel.
//!
//! Messages within a batch are processed sequentially in adapter order. Every
//! per-message error is contained to that message; nothing short of a stop
//! signal ends the loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::channels::listener::MessageListener;
use crate::channels::shared::SharedAdapter;
use crate::config::DEFAULT_POLL_INTERVAL_SECS;
use crate::error::PipelineError;
use crate::pipeline::format::confirmation_for;
use crate::pipeline::types::{ImagePayload, InboundMessage, ProcessedTransaction};
use crate::processor::{ReceiptExtractor, ReplyBackend};
use crate::server::ControlPlaneServer;
use crate::store::TransactionStore;

/// Sent in place of a chat reply when the reply backend fails.
pub const FALLBACK_REPLY: &str = "Sorry, I'm having trouble connecting. Please try again.";

/// Terminal state reached by one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The store already had the message.
    AlreadyProcessed,
    /// Extraction found no receipt in the image.
    NotAReceipt,
    /// A transaction for this message was saved by an earlier attempt.
    DuplicateTransaction,
    /// Transaction saved and confirmation sent.
    ReceiptConfirmed,
    /// Inbound text matched something the agent sent.
    BotEcho,
    /// Chat reply sent.
    Replied,
    /// Reply backend failed; the apology was sent instead.
    FallbackSent,
    /// Nothing actionable.
    Ignored,
}

/// Counts for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub candidates: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// User id sent with chat requests.
    pub chat_user_id: String,
    pub poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chat_user_id: "default".to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

/// Stops a running [`Orchestrator`] from another task.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl StopHandle {
    /// Request a stop. The current batch finishes; the inter-poll sleep is cut short.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

pub struct Orchestrator {
    listener: MessageListener,
    store: Arc<dyn TransactionStore>,
    extractor: Arc<dyn ReceiptExtractor>,
    replier: Arc<dyn ReplyBackend>,
    adapter: SharedAdapter,
    config: OrchestratorConfig,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl Orchestrator {
    pub fn new(
        listener: MessageListener,
        store: Arc<dyn TransactionStore>,
        extractor: Arc<dyn ReceiptExtractor>,
        replier: Arc<dyn ReplyBackend>,
        adapter: SharedAdapter,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            listener,
            store,
            extractor,
            replier,
            adapter,
            config,
            running: Arc::new(AtomicBool::new(true)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
            wake: Arc::clone(&self.wake),
        }
    }

    pub fn listener(&self) -> &MessageListener {
        &self.listener
    }

    /// Drive one candidate message to a terminal state.
    pub async fn process_message(
        &self,
        message: &InboundMessage,
    ) -> Result<MessageOutcome, PipelineError> {
        if self.store.is_processed(&message.message_id).await? {
            return Ok(MessageOutcome::AlreadyProcessed);
        }

        if let Some(image) = &message.image {
            return self.process_receipt(message, image).await;
        }

        match message.text.as_deref() {
            Some(text) if !text.trim().is_empty() => self.process_chat(message, text).await,
            _ => Ok(MessageOutcome::Ignored),
        }
    }

    async fn process_receipt(
        &self,
        message: &InboundMessage,
        image: &ImagePayload,
    ) -> Result<MessageOutcome, PipelineError> {
        let extracted = self
            .extractor
            .extract_transaction(&image.bytes, &image.mime_type)
            .await
            .map_err(PipelineError::Extraction)?;

        let Some(receipt) = extracted else {
            info!(id = %message.message_id, "Image is not a receipt");
            return Ok(MessageOutcome::NotAReceipt);
        };

        let txn = ProcessedTransaction::from_receipt(receipt, message)
            .map_err(PipelineError::Extraction)?;

        if !self.store.save_transaction(&txn).await? {
            info!(id = %message.message_id, "Transaction already recorded, not re-confirming");
            return Ok(MessageOutcome::DuplicateTransaction);
        }

        let confirmation = confirmation_for(&txn);
        self.send_and_record(&message.sender_address, &confirmation)
            .await?;
        Ok(MessageOutcome::ReceiptConfirmed)
    }

    async fn process_chat(
        &self,
        message: &InboundMessage,
        text: &str,
    ) -> Result<MessageOutcome, PipelineError> {
        if self.store.is_bot_response(text).await? {
            debug!(id = %message.message_id, "Inbound text is an echo of our own reply");
            self.store.mark_processed(&message.message_id).await?;
            return Ok(MessageOutcome::BotEcho);
        }

        match self
            .replier
            .generate_reply(&self.config.chat_user_id, text)
            .await
        {
            Ok(reply) => {
                self.send_and_record(&message.sender_address, &reply).await?;
                self.store.mark_processed(&message.message_id).await?;
                Ok(MessageOutcome::Replied)
            }
            Err(e) => {
                warn!(id = %message.message_id, error = %e, "Reply backend failed, sending fallback");
                // Left unmarked in the store; the listener cursor keeps it
                // from being re-emitted in this process.
                self.send_and_record(&message.sender_address, FALLBACK_REPLY)
                    .await?;
                Ok(MessageOutcome::FallbackSent)
            }
        }
    }

    /// Send `text` and record its fingerprint. A fingerprint failure is only logged.
    async fn send_and_record(&self, recipient: &str, text: &str) -> Result<(), PipelineError> {
        let ack = self.adapter.send(recipient, text).await?;
        debug!(sent_at = %ack.sent_at.to_rfc3339(), "Outbound message delivered");
        if let Err(e) = self.store.mark_sent(text).await {
            warn!(error = %e, "Failed to record sent-text fingerprint");
        }
        Ok(())
    }

    /// Poll once and process every candidate.
    pub async fn run_once(&mut self) -> BatchSummary {
        let candidates = match self.listener.poll().await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "Poll failed");
                return BatchSummary::default();
            }
        };

        let mut summary = BatchSummary {
            candidates: candidates.len(),
            ..Default::default()
        };

        for message in &candidates {
            match self.process_message(message).await {
                Ok(outcome) => {
                    debug!(id = %message.message_id, ?outcome, "Message handled");
                    summary.completed += 1;
                }
                Err(e) => {
                    error!(id = %message.message_id, error = %e, "Message processing failed");
                    summary.failed += 1;
                }
            }
        }

        if summary.candidates > 0 {
            info!(
                candidates = summary.candidates,
                completed = summary.completed,
                failed = summary.failed,
                "Batch processed"
            );
        }
        summary
    }

    /// Poll until stopped.
    pub async fn run(&mut self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Orchestrator started"
        );

        while self.running.load(Ordering::SeqCst) {
            self.run_once().await;

            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = self.wake.notified() => {}
            }
        }

        info!("Orchestrator stopped");
    }

    /// Release resources: listener, then control-plane server, then store.
    pub async fn shutdown(self, server: Option<ControlPlaneServer>) {
        self.running.store(false, Ordering::SeqCst);

        if let Err(e) = self.listener.close().await {
            warn!(error = %e, "Failed to close listener");
        }
        if let Some(server) = server {
            server.stop().await;
        }
        if let Err(e) = self.store.close().await {
            warn!(error = %e, "Failed to close store");
        }
        info!("Shutdown complete");
    }
}
