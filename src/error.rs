//! Error types for Rental Scout.

use std::time::Duration;

/// Errors raised while assembling the scraper.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised while reading from the messaging source.
///
/// Every variant aborts the fetch for the current cycle.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Connection to source failed: {reason}")]
    Connection { reason: String },

    #[error("Source rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Channel not found: {channel}")]
    ChannelNotFound { channel: String },

    #[error("Cannot access private channel: {channel}")]
    ChannelPrivate { channel: String },

    #[error("Source API error {code}: {description}")]
    Api { code: u16, description: String },

    #[error("Invalid source payload: {0}")]
    InvalidPayload(String),
}

/// Extraction service errors. Scoped to a single message.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Extraction request failed: {0}")]
    Request(String),

    #[error("Extraction request timed out")]
    Timeout,

    #[error("Extraction service rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Extraction service error: {0}")]
    Provider(String),

    #[error("Extraction service returned an empty response")]
    EmptyResponse,
}

/// A single extracted field that could not be understood.
///
/// Never fatal: the field falls back to absent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid value for {field} ({value}): {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub value: String,
    pub reason: &'static str,
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Per-record write failure.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Failed to save rental for message {source_message_id:?}: {source}")]
    Write {
        source_message_id: Option<i64>,
        #[source]
        source: DatabaseError,
    },

    #[error("Duplicate lookup failed for message {source_message_id}: {source}")]
    Lookup {
        source_message_id: i64,
        #[source]
        source: DatabaseError,
    },
}

/// Result type alias for the scraper.
pub type Result<T> = std::result::Result<T, Error>;
