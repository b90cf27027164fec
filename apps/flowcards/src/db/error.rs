//! Error types for the local store.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt stored payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("invalid date: {0}")]
    Date(#[from] chrono::ParseError),
}
