//! Adapter error types

use rule_store_core::CoreError;
use rule_store_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    /// Passed through from the document store unchanged
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("cannot save a filtered policy")]
    FilteredPolicy,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
