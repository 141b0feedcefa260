//! Channel adapter abstraction — the "list recent" / "send" primitives of the
//! messaging platform.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// A message as reported by the platform, before any admission filtering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// Platform-global identifier.
    #[serde(default)]
    pub guid: Option<String>,
    /// Local row id, used when the guid is absent.
    #[serde(default, alias = "id")]
    pub rowid: Option<i64>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Timestamp assigned by the channel.
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub is_from_me: bool,
    #[serde(default)]
    pub attachments: Vec<RawAttachment>,
}

impl RawMessage {
    /// Stable identifier: the guid if present, otherwise the row id.
    pub fn message_id(&self) -> Option<String> {
        match &self.guid {
            Some(guid) if !guid.trim().is_empty() => Some(guid.clone()),
            _ => self.rowid.map(|id| id.to_string()),
        }
    }
}

/// An attachment reference. The bytes live on local disk at `path`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAttachment {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Acknowledgement of an outbound send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub sent_at: DateTime<Utc>,
}

/// Messaging platform adapter.
///
/// Implementations are thin I/O wrappers; admission logic lives in the
/// listener, serialization in [`SharedAdapter`](super::SharedAdapter).
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Adapter name, used in logs and errors.
    fn name(&self) -> &str;

    /// Most recent inbound messages, at most `limit`, own messages excluded.
    async fn list_recent(&self, limit: usize) -> Result<Vec<RawMessage>, ChannelError>;

    /// Send `text` to an already-normalized `recipient`.
    async fn send(&self, recipient: &str, text: &str) -> Result<SendReceipt, ChannelError>;

    /// Release the adapter session.
    async fn close(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_prefers_guid() {
        let msg = RawMessage {
            guid: Some("p:0/ABC".into()),
            rowid: Some(42),
            ..Default::default()
        };
        assert_eq!(msg.message_id().as_deref(), Some("p:0/ABC"));
    }

    #[test]
    fn message_id_falls_back_to_rowid() {
        let msg = RawMessage {
            guid: Some("  ".into()),
            rowid: Some(42),
            ..Default::default()
        };
        assert_eq!(msg.message_id().as_deref(), Some("42"));
    }

    #[test]
    fn message_id_missing() {
        assert!(RawMessage::default().message_id().is_none());
    }

    #[test]
    fn raw_message_deserializes_bridge_shape() {
        let json = r#"{
            "guid": "g-1",
            "sender": "+15551234567",
            "text": "hi",
            "date": "2026-10-18T12:00:00Z",
            "isFromMe": false,
            "attachments": [{"filename": "r.png", "path": "/tmp/r.png"}]
        }"#;
        let msg: RawMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.guid.as_deref(), Some("g-1"));
        assert!(!msg.is_from_me);
        assert_eq!(msg.attachments.len(), 1);
        assert_eq!(msg.attachments[0].filename.as_deref(), Some("r.png"));
    }
}
