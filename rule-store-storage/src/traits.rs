//! Storage traits defining the document database client interface

use async_trait::async_trait;
use serde_json::Value;

use crate::{QuerySpec, StorageError};

/// Addresses one collection inside one database
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    pub database: String,
    pub collection: String,
}

impl CollectionRef {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl std::fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.database, self.collection)
    }
}

/// How documents are spread across partitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionKeyDefinition {
    /// JSON path of the partition key property, e.g. `/pType`
    pub paths: Vec<String>,
    pub kind: String,
}

impl PartitionKeyDefinition {
    /// Hash partitioning on a single top-level property.
    pub fn hash(path: &str) -> Self {
        Self {
            paths: vec![path.to_string()],
            kind: "Hash".to_string(),
        }
    }

    /// Property name the first path points at (`/pType` -> `pType`).
    pub fn property(&self) -> Option<&str> {
        self.paths.first().map(|p| p.trim_start_matches('/'))
    }
}

/// Definition used when creating a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDefinition {
    pub id: String,
    pub partition_key: PartitionKeyDefinition,
}

/// Which partitions a read touches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PartitionScope {
    #[default]
    CrossPartition,
    Key(String),
}

/// Options for feed reads and queries
#[derive(Debug, Clone, Default)]
pub struct FeedOptions {
    pub scope: PartitionScope,
    /// Token returned by the previous page, if any
    pub continuation: Option<String>,
}

impl FeedOptions {
    pub fn cross_partition() -> Self {
        Self::default()
    }

    pub fn partition(key: impl Into<String>) -> Self {
        Self {
            scope: PartitionScope::Key(key.into()),
            continuation: None,
        }
    }

    pub fn with_continuation(mut self, token: Option<String>) -> Self {
        self.continuation = token;
        self
    }
}

/// One page of results
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub documents: Vec<Value>,
    /// Present while more pages remain
    pub continuation: Option<String>,
}

/// Trait for document database client operations
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read database metadata; `NotFound` if it does not exist
    async fn read_database(&self, database: &str) -> Result<(), StorageError>;

    /// Create a database
    async fn create_database(&self, database: &str) -> Result<(), StorageError>;

    /// Read collection metadata; `NotFound` if it does not exist
    async fn read_collection(&self, collection: &CollectionRef) -> Result<(), StorageError>;

    /// Create a collection inside `database`
    async fn create_collection(
        &self,
        database: &str,
        definition: &CollectionDefinition,
    ) -> Result<(), StorageError>;

    /// Delete a collection and every document in it
    async fn delete_collection(&self, collection: &CollectionRef) -> Result<(), StorageError>;

    /// Insert a new document into the given partition
    async fn create_document(
        &self,
        collection: &CollectionRef,
        document: Value,
        partition_key: &str,
    ) -> Result<(), StorageError>;

    /// Read one page of all documents
    async fn read_all(
        &self,
        collection: &CollectionRef,
        options: FeedOptions,
    ) -> Result<Page, StorageError>;

    /// Run a parameterized query and return one page of matches
    async fn query(
        &self,
        collection: &CollectionRef,
        query: &QuerySpec,
        options: FeedOptions,
    ) -> Result<Page, StorageError>;

    /// Delete a document by id within its partition
    async fn delete_document(
        &self,
        collection: &CollectionRef,
        id: &str,
        partition_key: &str,
    ) -> Result<(), StorageError>;
}
