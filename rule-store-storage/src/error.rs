//! Storage error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid partition key: {0}")]
    PartitionKey(String),

    #[error("Invalid continuation token: {0}")]
    Continuation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Whether the store reported a missing database, collection or document.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}
