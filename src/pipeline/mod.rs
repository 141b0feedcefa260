//! Ingestion pipeline.
//!
//! Candidates from the listener flow through:
//! 1. `Orchestrator::process_message()` — idempotency check, then receipt or chat path
//! 2. `ReceiptExtractor` / `ReplyBackend` — external content processing
//! 3. `TransactionStore` — persist and mark handled
//! 4. `SharedAdapter::send()` — confirmation or reply, fingerprinted after delivery

pub mod format;
pub mod orchestrator;
pub mod types;

pub use orchestrator::{BatchSummary, MessageOutcome, Orchestrator, OrchestratorConfig, StopHandle};
