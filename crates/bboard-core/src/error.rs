//! Error types for bboard database operations

use thiserror::Error;

/// Core error type reported by connections and drivers
#[derive(Error, Debug)]
pub enum BoardError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl BoardError {
    /// Whether the error means the session itself is unusable.
    ///
    /// Query-level failures (bad SQL, constraint violations) leave the
    /// session intact; these do not.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            BoardError::Connection(_) | BoardError::Io(_) | BoardError::Timeout(_)
        )
    }
}

/// Result type alias for bboard database operations
pub type Result<T> = std::result::Result<T, BoardError>;
