//! Error types for the receipt agent.

use std::net::SocketAddr;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Failed to bind control-plane server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration-related errors. Startup collects every one of these before
/// aborting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Channel adapter errors (listing, sending, attachment reads).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} unreachable: {reason}")]
    Unreachable { name: String, reason: String },

    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid response from channel {name}: {reason}")]
    InvalidResponse { name: String, reason: String },

    #[error("Failed to read attachment {path}: {source}")]
    AttachmentRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the external content processor (receipt extraction, chat replies).
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("Backend request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("Backend {endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("Backend returned an empty reply")]
    EmptyReply,

    #[error("Extracted receipt rejected: {0}")]
    InvalidReceipt(String),
}

/// Per-message pipeline errors. Always contained to the message that raised them.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Receipt extraction failed: {0}")]
    Extraction(#[source] ProcessorError),

    #[error("Outbound send failed: {0}")]
    Send(#[from] ChannelError),

    #[error("Store operation failed: {0}")]
    Store(#[from] DatabaseError),
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn connect() -> std::result::Result<(), DatabaseError> {
        Err(DatabaseError::Pool("Failed to open libSQL database: locked".into()))
    }

    fn open_store() -> Result<()> {
        connect()?;
        Ok(())
    }

    #[test]
    fn startup_failures_convert_into_top_level_error() {
        let err = open_store().unwrap_err();
        assert!(matches!(err, Error::Database(DatabaseError::Pool(_))));
        assert_eq!(
            err.to_string(),
            "Database error: Connection pool error: Failed to open libSQL database: locked"
        );

        let err = Error::from(ConfigError::InvalidValue {
            key: "API_PORT".into(),
            message: "not a port".into(),
        });
        assert!(err.to_string().starts_with("Configuration error: "));
    }
}
