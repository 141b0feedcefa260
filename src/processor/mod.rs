//! Content processor — the two external capabilities the orchestrator
//! consumes: receipt extraction and conversational replies.

pub mod backend;

use async_trait::async_trait;

use crate::error::ProcessorError;
use crate::pipeline::types::ExtractedReceipt;

pub use backend::BackendClient;

/// Turns receipt images into structured data.
#[async_trait]
pub trait ReceiptExtractor: Send + Sync {
    /// `Ok(None)` means the image is not a recognizable receipt.
    async fn extract_transaction(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<Option<ExtractedReceipt>, ProcessorError>;
}

/// Produces a chat reply for inbound text.
#[async_trait]
pub trait ReplyBackend: Send + Sync {
    async fn generate_reply(&self, user_id: &str, text: &str) -> Result<String, ProcessorError>;
}
