//! Document database layer for the rule store
//!
//! Defines the client contract the adapter needs from a document database.
//! Supports both in-memory (for development) and Couchbase backends.

pub mod error;
pub mod memory;
pub mod query;
pub mod traits;

#[cfg(feature = "couchbase")]
pub mod couchbase;

pub use error::StorageError;
pub use memory::InMemoryDocumentStore;
pub use query::{QueryParam, QuerySpec};
pub use traits::{
    CollectionDefinition, CollectionRef, DocumentStore, FeedOptions, Page, PartitionKeyDefinition,
    PartitionScope,
};

#[cfg(feature = "couchbase")]
pub use couchbase::{CouchbaseConfig, CouchbaseDocumentStore};

use std::sync::Arc;

/// Open a document store from a connection string.
///
/// `memory://` yields a fresh in-memory store; `couchbase://` and
/// `couchbases://` need the `couchbase` feature.
pub async fn connect(connection_string: &str) -> Result<Arc<dyn DocumentStore>, StorageError> {
    let scheme = connection_string
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .ok_or_else(|| StorageError::Connection(format!("Invalid connection string: {}", connection_string)))?;

    match scheme {
        "memory" => {
            tracing::info!("Initializing InMemory document store...");
            Ok(Arc::new(InMemoryDocumentStore::new()))
        }
        "couchbase" | "couchbases" => {
            #[cfg(feature = "couchbase")]
            {
                tracing::info!("Initializing Couchbase document store...");
                let store = CouchbaseDocumentStore::connect(connection_string).await?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "couchbase"))]
            {
                Err(StorageError::Connection(
                    "Couchbase storage requested but 'couchbase' feature not enabled".to_string(),
                ))
            }
        }
        other => Err(StorageError::Connection(format!("Unsupported scheme: {}", other))),
    }
}
