//! Persistence layer — idempotency records, transactions, and sent-text
//! fingerprints.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::TransactionStore;
