//! Store errors.

use thiserror::Error;

/// Failures reported by a [`Store`](crate::Store) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Database(#[from] rusqlite::Error),

    /// A journaled event could not be encoded or decoded.
    #[error("event codec: {0}")]
    Serialization(String),

    /// A stored row does not describe a valid record.
    #[error("corrupt record: {0}")]
    InvalidData(String),

    #[error("schema migration failed: {0}")]
    Migration(String),

    /// A lock guarding the store was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    /// A blocking task failed to complete.
    #[error("blocking task failed: {0}")]
    Task(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
