//! `TransactionStore` trait — the idempotency and persistence interface the
//! orchestrator depends on.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::pipeline::types::ProcessedTransaction;

/// Durable record of handled messages, saved transactions, and sent-text
/// fingerprints.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Whether a message id has been marked handled.
    async fn is_processed(&self, message_id: &str) -> Result<bool, DatabaseError>;

    /// Mark a message handled. Idempotent.
    async fn mark_processed(&self, message_id: &str) -> Result<(), DatabaseError>;

    /// Persist a transaction and mark its source message handled.
    ///
    /// Returns `false`, writing nothing, when a transaction for the same
    /// source message already exists.
    async fn save_transaction(&self, txn: &ProcessedTransaction) -> Result<bool, DatabaseError>;

    /// Whether `text` exactly matches something the agent itself sent.
    async fn is_bot_response(&self, text: &str) -> Result<bool, DatabaseError>;

    /// Record the fingerprint of a successfully sent text.
    async fn mark_sent(&self, text: &str) -> Result<(), DatabaseError>;

    /// Every handled message id. Used once at startup to seed the listener.
    async fn get_processed_message_ids(&self) -> Result<HashSet<String>, DatabaseError>;

    /// Look up the transaction derived from a source message.
    async fn get_transaction(
        &self,
        source_message_id: &str,
    ) -> Result<Option<ProcessedTransaction>, DatabaseError>;

    /// Number of persisted transactions.
    async fn transaction_count(&self) -> Result<usize, DatabaseError>;

    /// Release store resources.
    async fn close(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
