//! Polling listener — pulls recent messages from the shared adapter, applies
//! admission filters, and yields normalized candidate messages.
//!
//! Filters run in order; each one that matches ends evaluation of the message:
//! 1. no identifier → dropped, not marked (cannot be deduplicated)
//! 2. received before startup → marked
//! 3. reaction / tapback → marked
//! 4. wrong sender, self-authored, or anonymous → marked
//! 5. no text and no attachments → skipped, not marked
//! 6. text only → candidate
//! 7. attachments → first readable image becomes the candidate

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::channels::adapter::RawMessage;
use crate::channels::filters::{is_image_file, is_reaction_message, mime_type_for, normalize_address};
use crate::channels::shared::SharedAdapter;
use crate::config::DEFAULT_POLL_PAGE_LIMIT;
use crate::error::ChannelError;
use crate::pipeline::types::{ImagePayload, InboundMessage};

/// Polls before a message whose image attachments never become readable is given up on.
pub const MAX_ATTACHMENT_READ_ATTEMPTS: u32 = 5;

/// In-memory cursor: startup cutoff plus ids already evaluated this process.
#[derive(Debug, Clone)]
pub struct ListenerCursor {
    pub start_time: DateTime<Utc>,
    seen: HashSet<String>,
}

impl ListenerCursor {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            seen: HashSet::new(),
        }
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.seen.contains(message_id)
    }

    pub fn insert(&mut self, message_id: impl Into<String>) {
        self.seen.insert(message_id.into());
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Counterparty to admit. `None` admits all senders.
    pub monitored_address: Option<String>,
    pub page_limit: usize,
    pub max_attachment_attempts: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            monitored_address: None,
            page_limit: DEFAULT_POLL_PAGE_LIMIT,
            max_attachment_attempts: MAX_ATTACHMENT_READ_ATTEMPTS,
        }
    }
}

pub struct MessageListener {
    adapter: SharedAdapter,
    normalized_monitored: Option<String>,
    page_limit: usize,
    max_attachment_attempts: u32,
    cursor: ListenerCursor,
    attachment_failures: HashMap<String, u32>,
}

impl MessageListener {
    /// Create a listener whose startup cutoff is now.
    pub fn new(adapter: SharedAdapter, config: ListenerConfig) -> Self {
        let start_time = Utc::now();
        info!(start_time = %start_time.to_rfc3339(), "Message listener initialized");
        Self {
            adapter,
            normalized_monitored: config.monitored_address.as_deref().map(normalize_address),
            page_limit: config.page_limit,
            max_attachment_attempts: config.max_attachment_attempts,
            cursor: ListenerCursor::new(start_time),
            attachment_failures: HashMap::new(),
        }
    }

    /// Override the startup cutoff.
    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.cursor.start_time = start_time;
        self
    }

    pub fn cursor(&self) -> &ListenerCursor {
        &self.cursor
    }

    /// Seed the cursor with ids the store already handled.
    pub fn load_processed_ids<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        let before = self.cursor.len();
        for id in ids {
            self.cursor.insert(id);
        }
        info!(
            loaded = self.cursor.len() - before,
            "Loaded previously processed message ids"
        );
    }

    pub fn mark_processed(&mut self, message_id: &str) {
        self.cursor.insert(message_id);
    }

    /// Fetch one page from the adapter and return the new candidates, in
    /// adapter order.
    pub async fn poll(&mut self) -> Result<Vec<InboundMessage>, ChannelError> {
        let raw = self.adapter.list_recent(self.page_limit).await?;
        let on_page: HashSet<String> = raw.iter().filter_map(RawMessage::message_id).collect();

        let mut candidates = Vec::new();
        for msg in raw {
            if let Some(candidate) = self.evaluate(msg).await {
                candidates.push(candidate);
            }
        }

        // A message that scrolled off the page will not be retried.
        self.attachment_failures.retain(|id, _| on_page.contains(id));
        Ok(candidates)
    }

    async fn evaluate(&mut self, msg: RawMessage) -> Option<InboundMessage> {
        let Some(id) = msg.message_id() else {
            debug!("Dropping message without identifier");
            return None;
        };
        if self.cursor.contains(&id) {
            return None;
        }

        if msg.date < self.cursor.start_time {
            self.cursor.insert(id);
            return None;
        }

        let text = msg.text.clone().filter(|t| !t.is_empty());
        if text.as_deref().is_some_and(is_reaction_message) {
            debug!(id = %id, "Skipping reaction");
            self.cursor.insert(id);
            return None;
        }

        let sender = msg.sender.clone().unwrap_or_default();
        if sender.is_empty() || msg.is_from_me || !self.is_admitted(&sender) {
            debug!(id = %id, sender = %sender, from_me = msg.is_from_me, "Sender not admitted");
            self.cursor.insert(id);
            return None;
        }

        if msg.attachments.is_empty() {
            let text = text?;
            info!(
                id = %id,
                sender = %sender,
                preview = %text.chars().take(40).collect::<String>(),
                "New text message"
            );
            self.cursor.insert(id.clone());
            return Some(InboundMessage {
                message_id: id,
                sender_address: sender,
                received_at: msg.date,
                text: Some(text),
                image: None,
            });
        }

        let mut saw_image = false;
        for attachment in &msg.attachments {
            let Some(filename) = attachment.filename.as_deref() else {
                continue;
            };
            if !is_image_file(Some(filename)) {
                continue;
            }
            saw_image = true;
            let Some(path) = attachment.path.as_ref() else {
                continue;
            };

            match tokio::fs::read(path).await {
                Ok(bytes) => {
                    info!(id = %id, sender = %sender, file = filename, "New receipt image");
                    self.attachment_failures.remove(&id);
                    self.cursor.insert(id.clone());
                    return Some(InboundMessage {
                        message_id: id,
                        sender_address: sender,
                        received_at: msg.date,
                        text,
                        image: Some(ImagePayload {
                            bytes,
                            mime_type: mime_type_for(filename).to_string(),
                            path: path.clone(),
                        }),
                    });
                }
                Err(e) => {
                    let err = ChannelError::AttachmentRead {
                        path: path.display().to_string(),
                        source: e,
                    };
                    warn!(id = %id, error = %err, "Skipping unreadable attachment");
                }
            }
        }

        if saw_image {
            let attempts = self.attachment_failures.entry(id.clone()).or_insert(0);
            *attempts += 1;
            if *attempts >= self.max_attachment_attempts {
                warn!(
                    id = %id,
                    attempts = *attempts,
                    "Giving up on message whose image attachments stay unreadable"
                );
                self.attachment_failures.remove(&id);
                self.cursor.insert(id);
            }
            return None;
        }

        // Attachments, but none of them images.
        match text {
            Some(text) => {
                self.cursor.insert(id.clone());
                Some(InboundMessage {
                    message_id: id,
                    sender_address: sender,
                    received_at: msg.date,
                    text: Some(text),
                    image: None,
                })
            }
            None => {
                debug!(id = %id, "Skipping message with no usable content");
                self.cursor.insert(id);
                None
            }
        }
    }

    fn is_admitted(&self, sender: &str) -> bool {
        match &self.normalized_monitored {
            None => true,
            Some(monitored) => normalize_address(sender) == *monitored,
        }
    }

    pub async fn close(&self) -> Result<(), ChannelError> {
        self.adapter.close().await
    }
}
