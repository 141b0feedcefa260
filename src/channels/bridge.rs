//! HTTP bridge adapter — talks to a local messaging bridge that exposes the
//! platform's "list recent" and "send" primitives over JSON.

use async_trait::async_trait;
use serde::Deserialize;

use crate::channels::adapter::{ChannelAdapter, RawMessage, SendReceipt};
use crate::error::ChannelError;

const CHANNEL_NAME: &str = "bridge";

/// Channel adapter backed by the messaging bridge's HTTP API.
pub struct HttpBridgeAdapter {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<RawMessage>,
}

impl HttpBridgeAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

#[async_trait]
impl ChannelAdapter for HttpBridgeAdapter {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<RawMessage>, ChannelError> {
        let resp = self
            .client
            .get(self.url("messages"))
            .query(&[
                ("limit", limit.to_string()),
                ("excludeOwnMessages", "true".to_string()),
            ])
            .send()
            .await
            .map_err(|e| ChannelError::Unreachable {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Unreachable {
                name: CHANNEL_NAME.into(),
                reason: format!("list messages returned {status}: {body}"),
            });
        }

        let parsed: ListResponse = resp.json().await.map_err(|e| ChannelError::InvalidResponse {
            name: CHANNEL_NAME.into(),
            reason: e.to_string(),
        })?;
        Ok(parsed.messages)
    }

    async fn send(&self, recipient: &str, text: &str) -> Result<SendReceipt, ChannelError> {
        let body = serde_json::json!({
            "to": recipient,
            "text": text,
        });

        let resp = self
            .client
            .post(self.url("send"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("send returned {status}: {err}"),
            });
        }

        resp.json::<SendReceipt>()
            .await
            .map_err(|e| ChannelError::InvalidResponse {
                name: CHANNEL_NAME.into(),
                reason: format!("send acknowledgement: {e}"),
            })
    }
}
