//! Error types for the ingestion pipeline
//!
//! One taxonomy for the whole crate: transient network and storage
//! conditions are handled (retried) close to where they occur and only
//! reach this type once retries are exhausted or the condition is fatal.

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Comprehensive error type for the ingestion pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    /// Configuration is missing or invalid. Fatal at startup.
    #[error("Configuration error: {0}. Check your environment variables (.env is honored).")]
    Config(String),

    /// The requested endpoint name is not part of the entity registry.
    #[error("Unknown endpoint: '{0}'. Valid endpoints: stocks, incomes, sales, orders.")]
    UnknownEndpoint(String),

    /// HTTP request failed at the transport level.
    #[error("Network request failed: {0}. Check connectivity and the API base URL.")]
    Http(#[from] reqwest::Error),

    /// The remote API answered with an explicit throttling signal.
    #[error("Rate limited by the remote API")]
    RateLimited,

    /// The remote API answered with a non-success status.
    #[error("API returned status {0}")]
    Status(reqwest::StatusCode),

    /// Response body could not be decoded as the expected envelope.
    #[error("Failed to decode API response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Database operation failed (sqlx)
    #[error("Database error: {0}. Check DATABASE_URL and that migrations have run.")]
    Database(#[from] sqlx::Error),

    /// Work queue bookkeeping failed.
    #[error("Queue error: {0}")]
    Queue(String),

    /// Every chunk of a persistence job failed; the job goes back to the
    /// queue for redelivery.
    #[error("All {chunks} chunks failed for {endpoint} page {page}: {detail}")]
    AllChunksFailed {
        endpoint: &'static str,
        page: u32,
        chunks: usize,
        detail: String,
    },

    /// File system operation failed
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IngestError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a queue error
    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue(msg.into())
    }

    /// True for conditions the fetch layer should retry with backoff.
    pub fn is_retryable_fetch(&self) -> bool {
        matches!(
            self,
            IngestError::Http(_)
                | IngestError::RateLimited
                | IngestError::Status(_)
                | IngestError::Decode(_)
        )
    }
}
