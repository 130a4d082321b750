//! Error types for the catalog import pipeline

use thiserror::Error;

/// Result type alias for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Main error type for the catalog import pipeline
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Required client input is missing or malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Stream, network or store failure. Recovered by redelivery, not in-process.
    #[error("Transient I/O failure: {0}")]
    TransientIo(String),

    /// A single row or message could not be decoded.
    #[error("Record decode error: {0}")]
    RecordDecode(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CatalogError {
    /// Whether redelivering the triggering message can succeed where this attempt failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::TransientIo(_) | CatalogError::Io(_) | CatalogError::Internal(_))
    }

    /// Stable discriminator used in logs and dead-letter envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::InvalidRequest(_) => "InvalidRequest",
            CatalogError::TransientIo(_) | CatalogError::Io(_) => "TransientIOFailure",
            CatalogError::RecordDecode(_) | CatalogError::Serialization(_) => "RecordDecodeError",
            CatalogError::Internal(_) | CatalogError::Config(_) => "InternalError",
        }
    }
}
