//! Error types for countgate store clients.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store: {0}")]
    Open(String),

    /// Connection refused/dropped, or an operation timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    /// Increment/decrement hit a value that is not an integer, or would overflow.
    #[error("value at {0:?} is not an integer or out of range")]
    NotInteger(String),

    #[error("store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the store could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Open(_) | StoreError::Unavailable(_))
    }
}
