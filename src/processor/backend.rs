//! HTTP client for the reply / extraction backend.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::ProcessorError;
use crate::pipeline::types::ExtractedReceipt;
use crate::processor::{ReceiptExtractor, ReplyBackend};

const CHAT_PATH: &str = "/api/chat";
const EXTRACT_PATH: &str = "/api/receipts/extract";

/// reqwest-backed implementation of both processor capabilities.
pub struct BackendClient {
    base_url: String,
    api_key: Option<SecretString>,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    receipt: Option<ExtractedReceipt>,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.client.post(format!("{}{path}", self.base_url));
        match &self.api_key {
            Some(key) => req.bearer_auth(key.expose_secret()),
            None => req,
        }
    }

    /// Send a request and reject transport failures and non-2xx statuses.
    async fn execute(
        &self,
        path: &str,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ProcessorError> {
        let resp = req.send().await.map_err(|e| ProcessorError::RequestFailed {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!(endpoint = path, status = status.as_u16(), body = %body, "Backend error response");
            return Err(ProcessorError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }
}

/// Upload filename matching the image's mime type.
fn upload_filename(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "receipt.png",
        "image/heic" => "receipt.heic",
        "image/heif" => "receipt.heif",
        _ => "receipt.jpg",
    }
}

#[async_trait]
impl ReplyBackend for BackendClient {
    async fn generate_reply(&self, user_id: &str, text: &str) -> Result<String, ProcessorError> {
        let body = serde_json::json!({
            "user_id": user_id,
            "message": text,
        });
        let resp = self.execute(CHAT_PATH, self.post(CHAT_PATH).json(&body)).await?;

        let parsed: ChatResponse = resp.json().await.map_err(|e| ProcessorError::InvalidResponse {
            endpoint: CHAT_PATH.to_string(),
            reason: e.to_string(),
        })?;

        match parsed.response {
            Some(reply) if !reply.trim().is_empty() => Ok(reply),
            _ => Err(ProcessorError::EmptyReply),
        }
    }
}

#[async_trait]
impl ReceiptExtractor for BackendClient {
    async fn extract_transaction(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<Option<ExtractedReceipt>, ProcessorError> {
        let part = Part::bytes(image.to_vec())
            .file_name(upload_filename(mime_type))
            .mime_str(mime_type)
            .map_err(|e| ProcessorError::RequestFailed {
                endpoint: EXTRACT_PATH.to_string(),
                reason: format!("invalid mime type {mime_type}: {e}"),
            })?;
        let form = Form::new()
            .part("image", part)
            .text("mime_type", mime_type.to_string());

        let resp = self
            .execute(EXTRACT_PATH, self.post(EXTRACT_PATH).multipart(form))
            .await?;

        let parsed: ExtractResponse =
            resp.json().await.map_err(|e| ProcessorError::InvalidResponse {
                endpoint: EXTRACT_PATH.to_string(),
                reason: e.to_string(),
            })?;
        Ok(parsed.receipt)
    }
}

#[cfg(test)]
mod tests {
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn reply_posts_user_and_message() {
        let server = MockServer::start_async().await;
        let chat = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/chat")
                    .json_body(json!({"user_id": "default", "message": "hi"}));
                then.status(200).json_body(json!({"response": "Hello!"}));
            })
            .await;

        let client = BackendClient::new(server.base_url(), None);
        let reply = client.generate_reply("default", "hi").await.unwrap();

        chat.assert_async().await;
        assert_eq!(reply, "Hello!");
    }

    #[tokio::test]
    async fn reply_sends_bearer_token_when_configured() {
        let server = MockServer::start_async().await;
        let chat = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/chat")
                    .header("authorization", "Bearer secret-key");
                then.status(200).json_body(json!({"response": "ok"}));
            })
            .await;

        let client = BackendClient::new(
            format!("{}/", server.base_url()),
            Some(SecretString::from("secret-key")),
        );
        client.generate_reply("default", "hi").await.unwrap();
        chat.assert_async().await;
    }

    #[tokio::test]
    async fn empty_reply_is_a_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).json_body(json!({"response": "   "}));
            })
            .await;

        let client = BackendClient::new(server.base_url(), None);
        let err = client.generate_reply("default", "hi").await.unwrap_err();
        assert!(matches!(err, ProcessorError::EmptyReply));
    }

    #[tokio::test]
    async fn reply_status_error_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(502).body("bad gateway");
            })
            .await;

        let client = BackendClient::new(server.base_url(), None);
        let err = client.generate_reply("default", "hi").await.unwrap_err();
        assert!(matches!(err, ProcessorError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn extraction_parses_receipt() {
        let server = MockServer::start_async().await;
        let extract = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/receipts/extract");
                then.status(200).json_body(json!({
                    "receipt": {
                        "merchant": {"name": "Trader Joe's", "category": null},
                        "transaction": {"total": "12.50", "paymentMethod": null},
                        "items": [{"description": "Milk", "price": "3.50"}]
                    }
                }));
            })
            .await;

        let client = BackendClient::new(server.base_url(), None);
        let receipt = client
            .extract_transaction(b"\x89PNG", "image/png")
            .await
            .unwrap()
            .unwrap();

        extract.assert_async().await;
        assert_eq!(receipt.merchant.name, "Trader Joe's");
        assert_eq!(receipt.transaction.total, dec!(12.50));
        assert_eq!(receipt.items.len(), 1);
    }

    #[tokio::test]
    async fn extraction_null_means_not_a_receipt() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/receipts/extract");
                then.status(200).json_body(json!({"receipt": null}));
            })
            .await;

        let client = BackendClient::new(server.base_url(), None);
        let receipt = client
            .extract_transaction(b"jpeg", "image/jpeg")
            .await
            .unwrap();
        assert!(receipt.is_none());
    }

    #[tokio::test]
    async fn extraction_failure_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/receipts/extract");
                then.status(500);
            })
            .await;

        let client = BackendClient::new(server.base_url(), None);
        let err = client
            .extract_transaction(b"jpeg", "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Status { status: 500, .. }));
    }

    #[test]
    fn upload_filename_follows_mime() {
        assert_eq!(upload_filename("image/png"), "receipt.png");
        assert_eq!(upload_filename("image/heic"), "receipt.heic");
        assert_eq!(upload_filename("image/jpeg"), "receipt.jpg");
    }
}
