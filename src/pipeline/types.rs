//! Shared types for the ingestion pipeline.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProcessorError;

// ── Inbound message ─────────────────────────────────────────────────

/// A candidate message that survived every listener filter.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Stable, channel-assigned identifier.
    pub message_id: String,
    /// Raw sender address as the channel reported it.
    pub sender_address: String,
    /// Channel timestamp (not the polling time).
    pub received_at: DateTime<Utc>,
    pub text: Option<String>,
    /// First readable image attachment, if any.
    pub image: Option<ImagePayload>,
}

/// Image bytes loaded from an attachment.
#[derive(Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub path: PathBuf,
}

impl std::fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePayload")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .field("path", &self.path)
            .finish()
    }
}

// ── Receipts and transactions ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merchant {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetails {
    pub total: Decimal,
    #[serde(default, alias = "payment_method")]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub price: Decimal,
}

/// Structured receipt returned by the extraction backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedReceipt {
    pub merchant: Merchant,
    pub transaction: TransactionDetails,
    #[serde(default)]
    pub items: Vec<LineItem>,
}

/// A transaction derived from a receipt image. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedTransaction {
    pub id: Uuid,
    pub merchant: Merchant,
    pub transaction: TransactionDetails,
    pub items: Vec<LineItem>,
    pub source_message_id: String,
    pub sender_address: String,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ProcessedTransaction {
    /// Attach provenance to an extracted receipt.
    ///
    /// Rejects receipts with a negative total or a blank merchant name.
    pub fn from_receipt(
        receipt: ExtractedReceipt,
        source: &InboundMessage,
    ) -> Result<Self, ProcessorError> {
        if receipt.transaction.total < Decimal::ZERO {
            return Err(ProcessorError::InvalidReceipt(format!(
                "negative total {}",
                receipt.transaction.total
            )));
        }
        if receipt.merchant.name.trim().is_empty() {
            return Err(ProcessorError::InvalidReceipt(
                "missing merchant name".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            merchant: receipt.merchant,
            transaction: receipt.transaction,
            items: receipt.items,
            source_message_id: source.message_id.clone(),
            sender_address: source.sender_address.clone(),
            received_at: source.received_at,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn inbound() -> InboundMessage {
        InboundMessage {
            message_id: "msg-1".into(),
            sender_address: "+15551234567".into(),
            received_at: Utc::now(),
            text: None,
            image: None,
        }
    }

    fn receipt(total: Decimal) -> ExtractedReceipt {
        ExtractedReceipt {
            merchant: Merchant {
                name: "Trader Joe's".into(),
                category: None,
            },
            transaction: TransactionDetails {
                total,
                payment_method: None,
            },
            items: vec![],
        }
    }

    #[test]
    fn from_receipt_carries_provenance() {
        let msg = inbound();
        let txn = ProcessedTransaction::from_receipt(receipt(dec!(12.5)), &msg).unwrap();
        assert_eq!(txn.source_message_id, "msg-1");
        assert_eq!(txn.sender_address, "+15551234567");
        assert_eq!(txn.received_at, msg.received_at);
        assert_eq!(txn.transaction.total, dec!(12.5));
    }

    #[test]
    fn zero_total_is_allowed() {
        assert!(ProcessedTransaction::from_receipt(receipt(dec!(0)), &inbound()).is_ok());
    }

    #[test]
    fn negative_total_is_rejected() {
        let err = ProcessedTransaction::from_receipt(receipt(dec!(-1.00)), &inbound()).unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidReceipt(_)));
    }

    #[test]
    fn extracted_receipt_accepts_numeric_json() {
        let json = r#"{
            "merchant": {"name": "Cafe", "category": "Dining"},
            "transaction": {"total": 8.25, "paymentMethod": "Visa 1234"},
            "items": [{"description": "Latte", "price": 4.75}]
        }"#;
        let parsed: ExtractedReceipt = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.transaction.total, dec!(8.25));
        assert_eq!(parsed.transaction.payment_method.as_deref(), Some("Visa 1234"));
        assert_eq!(parsed.items[0].price, dec!(4.75));
    }
}
