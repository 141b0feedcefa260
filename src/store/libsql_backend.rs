//! libSQL backend — async `TransactionStore` implementation.
//!
//! Supports local file and in-memory databases. Every mutation holds the
//! writer lock, so the check-then-write of an idempotent save can never race
//! another writer for the same message id.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pipeline::types::{LineItem, Merchant, ProcessedTransaction, TransactionDetails};
use crate::store::migrations;
use crate::store::traits::TransactionStore;

/// Sent-text fingerprints retained by default.
pub const DEFAULT_FINGERPRINT_LIMIT: usize = 1000;

/// libSQL store.
///
/// Holds a single connection reused for all operations.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
    fingerprint_limit: usize,
    closed: AtomicBool,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
            fingerprint_limit: DEFAULT_FINGERPRINT_LIMIT,
            closed: AtomicBool::new(false),
        })
    }

    /// Change how many sent-text fingerprints are retained.
    pub fn with_fingerprint_limit(mut self, limit: usize) -> Self {
        self.fingerprint_limit = limit.max(1);
        self
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Reject writes once the store is closed.
    fn ensure_open(&self) -> Result<(), DatabaseError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DatabaseError::Pool("store closed".to_string()));
        }
        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a libsql Row to a ProcessedTransaction.
///
/// Column order matches TRANSACTION_COLUMNS.
fn row_to_transaction(row: &libsql::Row) -> Result<ProcessedTransaction, DatabaseError> {
    let col = |e: libsql::Error| DatabaseError::Query(format!("transaction row: {e}"));

    let id_str: String = row.get(0).map_err(col)?;
    let total_str: String = row.get(6).map_err(col)?;
    let items_str: String = row.get(8).map_err(col)?;
    let received_str: String = row.get(3).map_err(col)?;
    let created_str: String = row.get(9).map_err(col)?;

    let items: Vec<LineItem> = serde_json::from_str(&items_str)
        .map_err(|e| DatabaseError::Serialization(format!("items: {e}")))?;
    let total = Decimal::from_str(&total_str)
        .map_err(|e| DatabaseError::Serialization(format!("total '{total_str}': {e}")))?;

    Ok(ProcessedTransaction {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("id '{id_str}': {e}")))?,
        source_message_id: row.get(1).map_err(col)?,
        sender_address: row.get(2).map_err(col)?,
        received_at: parse_datetime(&received_str),
        merchant: Merchant {
            name: row.get(4).map_err(col)?,
            category: row.get::<String>(5).ok(),
        },
        transaction: TransactionDetails {
            total,
            payment_method: row.get::<String>(7).ok(),
        },
        items,
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const TRANSACTION_COLUMNS: &str = "id, source_message_id, sender_address, received_at, merchant_name, merchant_category, total, payment_method, items, created_at";

#[async_trait]
impl TransactionStore for LibSqlStore {
    async fn is_processed(&self, message_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM processed_messages WHERE message_id = ?1",
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("is_processed: {e}")))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(DatabaseError::Query(format!("is_processed: {e}"))),
        }
    }

    async fn mark_processed(&self, message_id: &str) -> Result<(), DatabaseError> {
        let _writer = self.write_lock.lock().await;
        self.ensure_open()?;
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO processed_messages (message_id, processed_at) VALUES (?1, ?2)",
                params![message_id, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_processed: {e}")))?;

        debug!(message_id, "Message marked processed");
        Ok(())
    }

    async fn save_transaction(&self, txn: &ProcessedTransaction) -> Result<bool, DatabaseError> {
        let items_json = serde_json::to_string(&txn.items)
            .map_err(|e| DatabaseError::Serialization(format!("items: {e}")))?;

        let _writer = self.write_lock.lock().await;
        self.ensure_open()?;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("save_transaction begin: {e}")))?;

        let inserted = tx
            .execute(
                &format!(
                    "INSERT INTO transactions ({TRANSACTION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT(source_message_id) DO NOTHING"
                ),
                params![
                    txn.id.to_string(),
                    txn.source_message_id.as_str(),
                    txn.sender_address.as_str(),
                    txn.received_at.to_rfc3339(),
                    txn.merchant.name.as_str(),
                    opt_text(txn.merchant.category.as_deref()),
                    txn.transaction.total.to_string(),
                    opt_text(txn.transaction.payment_method.as_deref()),
                    items_json,
                    txn.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_transaction: {e}")))?;

        if inserted == 0 {
            tx.rollback()
                .await
                .map_err(|e| DatabaseError::Query(format!("save_transaction rollback: {e}")))?;
            debug!(
                source_message_id = %txn.source_message_id,
                "Transaction already saved for source message"
            );
            return Ok(false);
        }

        tx.execute(
            "INSERT OR IGNORE INTO processed_messages (message_id, processed_at) VALUES (?1, ?2)",
            params![txn.source_message_id.as_str(), Utc::now().to_rfc3339()],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("save_transaction mark: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("save_transaction commit: {e}")))?;

        info!(
            id = %txn.id,
            source_message_id = %txn.source_message_id,
            merchant = %txn.merchant.name,
            total = %txn.transaction.total,
            "Transaction saved"
        );
        Ok(true)
    }

    async fn is_bot_response(&self, text: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT 1 FROM sent_texts WHERE text = ?1", params![text])
            .await
            .map_err(|e| DatabaseError::Query(format!("is_bot_response: {e}")))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(DatabaseError::Query(format!("is_bot_response: {e}"))),
        }
    }

    async fn mark_sent(&self, text: &str) -> Result<(), DatabaseError> {
        let _writer = self.write_lock.lock().await;
        self.ensure_open()?;
        let conn = self.conn();

        // REPLACE gives the row a fresh rowid, so a re-sent text moves to the
        // front of the window.
        conn.execute(
            "INSERT OR REPLACE INTO sent_texts (text, sent_at) VALUES (?1, ?2)",
            params![text, Utc::now().to_rfc3339()],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("mark_sent: {e}")))?;

        let pruned = conn
            .execute(
                "DELETE FROM sent_texts WHERE rowid NOT IN
                    (SELECT rowid FROM sent_texts ORDER BY rowid DESC LIMIT ?1)",
                params![self.fingerprint_limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_sent prune: {e}")))?;

        if pruned > 0 {
            debug!(pruned, "Pruned old sent-text fingerprints");
        }
        Ok(())
    }

    async fn get_processed_message_ids(&self) -> Result<HashSet<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT message_id FROM processed_messages", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("get_processed_message_ids: {e}")))?;

        let mut ids = HashSet::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_processed_message_ids: {e}")))?
        {
            match row.get::<String>(0) {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(e) => tracing::warn!("Skipping processed id row: {e}"),
            }
        }
        Ok(ids)
    }

    async fn get_transaction(
        &self,
        source_message_id: &str,
    ) -> Result<Option<ProcessedTransaction>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE source_message_id = ?1"
                ),
                params![source_message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_transaction: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_transaction(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_transaction: {e}"))),
        }
    }

    async fn transaction_count(&self) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM transactions", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("transaction_count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("transaction_count: {e}")))?;
                Ok(count as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("transaction_count: {e}"))),
        }
    }

    async fn close(&self) -> Result<(), DatabaseError> {
        // Wait for any in-flight write before reporting closed.
        let _writer = self.write_lock.lock().await;
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Store closed");
        }
        Ok(())
    }
}
