//! In-memory document store for development and testing
//!
//! Mirrors the behaviour the adapter relies on from a hosted document
//! database: partitioned collections, `NotFound` on missing resources,
//! and paged reads with continuation tokens.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::query::ParsedQuery;
use crate::{
    CollectionDefinition, CollectionRef, DocumentStore, FeedOptions, Page, PartitionScope,
    QuerySpec, StorageError,
};

/// Default number of documents returned per page
pub const DEFAULT_PAGE_SIZE: usize = 100;

struct StoredCollection {
    definition: CollectionDefinition,
    /// Keyed by `(partition key, id)`
    documents: BTreeMap<(String, String), Value>,
}

/// In-memory document store for development and testing
pub struct InMemoryDocumentStore {
    databases: RwLock<HashMap<String, HashMap<String, StoredCollection>>>,
    page_size: usize,
    writes: AtomicUsize,
    write_limit: RwLock<Option<usize>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create a store that returns at most `page_size` documents per page
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            databases: RwLock::new(HashMap::new()),
            page_size: page_size.max(1),
            writes: AtomicUsize::new(0),
            write_limit: RwLock::new(None),
        }
    }

    /// Number of successful document and collection writes so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Fail every write once `limit` writes have succeeded; `None` lifts the limit
    pub fn set_write_limit(&self, limit: Option<usize>) {
        *self.write_limit.write() = limit;
    }

    /// Number of documents currently held in `collection`
    pub fn document_count(&self, collection: &CollectionRef) -> usize {
        self.databases
            .read()
            .get(&collection.database)
            .and_then(|colls| colls.get(&collection.collection))
            .map(|c| c.documents.len())
            .unwrap_or(0)
    }

    fn begin_write(&self) -> Result<(), StorageError> {
        if let Some(limit) = *self.write_limit.read() {
            if self.writes() >= limit {
                return Err(StorageError::Internal(format!(
                    "write limit of {} reached",
                    limit
                )));
            }
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn paginate(&self, matches: Vec<Value>, continuation: Option<&str>) -> Result<Page, StorageError> {
        let offset = match continuation {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| StorageError::Continuation(token.to_string()))?,
            None => 0,
        };

        let total = matches.len();
        let end = offset.saturating_add(self.page_size).min(total);
        let documents = matches
            .into_iter()
            .skip(offset)
            .take(self.page_size)
            .collect();

        Ok(Page {
            documents,
            continuation: (end < total).then(|| end.to_string()),
        })
    }

    fn scan(
        &self,
        collection: &CollectionRef,
        scope: &PartitionScope,
        filter: Option<&ParsedQuery>,
    ) -> Result<Vec<Value>, StorageError> {
        let databases = self.databases.read();
        let stored = lookup(&databases, collection)?;

        Ok(stored
            .documents
            .iter()
            .filter(|((partition, _), _)| match scope {
                PartitionScope::CrossPartition => true,
                PartitionScope::Key(key) => partition == key,
            })
            .filter(|(_, doc)| match (filter, doc.as_object()) {
                (None, _) => true,
                (Some(query), Some(object)) => query.matches(object),
                (Some(_), None) => false,
            })
            .map(|(_, doc)| doc.clone())
            .collect())
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup<'a>(
    databases: &'a HashMap<String, HashMap<String, StoredCollection>>,
    collection: &CollectionRef,
) -> Result<&'a StoredCollection, StorageError> {
    databases
        .get(&collection.database)
        .ok_or_else(|| StorageError::NotFound(format!("database {}", collection.database)))?
        .get(&collection.collection)
        .ok_or_else(|| StorageError::NotFound(format!("collection {}", collection)))
}

fn lookup_mut<'a>(
    databases: &'a mut HashMap<String, HashMap<String, StoredCollection>>,
    collection: &CollectionRef,
) -> Result<&'a mut StoredCollection, StorageError> {
    databases
        .get_mut(&collection.database)
        .ok_or_else(|| StorageError::NotFound(format!("database {}", collection.database)))?
        .get_mut(&collection.collection)
        .ok_or_else(|| StorageError::NotFound(format!("collection {}", collection)))
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn read_database(&self, database: &str) -> Result<(), StorageError> {
        if self.databases.read().contains_key(database) {
            Ok(())
        } else {
            Err(StorageError::NotFound(format!("database {}", database)))
        }
    }

    async fn create_database(&self, database: &str) -> Result<(), StorageError> {
        self.begin_write()?;
        let mut databases = self.databases.write();
        if databases.contains_key(database) {
            return Err(StorageError::Conflict(format!("database {} already exists", database)));
        }
        databases.insert(database.to_string(), HashMap::new());
        self.record_write();
        Ok(())
    }

    async fn read_collection(&self, collection: &CollectionRef) -> Result<(), StorageError> {
        lookup(&self.databases.read(), collection).map(|_| ())
    }

    async fn create_collection(
        &self,
        database: &str,
        definition: &CollectionDefinition,
    ) -> Result<(), StorageError> {
        self.begin_write()?;
        let mut databases = self.databases.write();
        let collections = databases
            .get_mut(database)
            .ok_or_else(|| StorageError::NotFound(format!("database {}", database)))?;
        if collections.contains_key(&definition.id) {
            return Err(StorageError::Conflict(format!(
                "collection {}/{} already exists",
                database, definition.id
            )));
        }
        collections.insert(
            definition.id.clone(),
            StoredCollection {
                definition: definition.clone(),
                documents: BTreeMap::new(),
            },
        );
        self.record_write();
        Ok(())
    }

    async fn delete_collection(&self, collection: &CollectionRef) -> Result<(), StorageError> {
        self.begin_write()?;
        let mut databases = self.databases.write();
        lookup_mut(&mut databases, collection)?;
        if let Some(collections) = databases.get_mut(&collection.database) {
            collections.remove(&collection.collection);
        }
        self.record_write();
        Ok(())
    }

    async fn create_document(
        &self,
        collection: &CollectionRef,
        document: Value,
        partition_key: &str,
    ) -> Result<(), StorageError> {
        self.begin_write()?;
        let mut databases = self.databases.write();
        let stored = lookup_mut(&mut databases, collection)?;

        let object = document
            .as_object()
            .ok_or_else(|| StorageError::Internal("document must be a JSON object".to_string()))?;
        let id = object
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StorageError::Internal("document is missing an id".to_string()))?
            .to_string();

        if let Some(property) = stored.definition.partition_key.property() {
            let extracted = object.get(property).and_then(Value::as_str).unwrap_or_default();
            if extracted != partition_key {
                return Err(StorageError::PartitionKey(format!(
                    "document {} has {} = {:?} but was written to partition {:?}",
                    id, property, extracted, partition_key
                )));
            }
        }

        let key = (partition_key.to_string(), id);
        if stored.documents.contains_key(&key) {
            return Err(StorageError::Conflict(format!("document {} already exists", key.1)));
        }
        stored.documents.insert(key, document);
        self.record_write();
        Ok(())
    }

    async fn read_all(
        &self,
        collection: &CollectionRef,
        options: FeedOptions,
    ) -> Result<Page, StorageError> {
        let matches = self.scan(collection, &options.scope, None)?;
        self.paginate(matches, options.continuation.as_deref())
    }

    async fn query(
        &self,
        collection: &CollectionRef,
        query: &QuerySpec,
        options: FeedOptions,
    ) -> Result<Page, StorageError> {
        let parsed = ParsedQuery::parse(query)?;
        let matches = self.scan(collection, &options.scope, Some(&parsed))?;
        self.paginate(matches, options.continuation.as_deref())
    }

    async fn delete_document(
        &self,
        collection: &CollectionRef,
        id: &str,
        partition_key: &str,
    ) -> Result<(), StorageError> {
        self.begin_write()?;
        let mut databases = self.databases.write();
        let stored = lookup_mut(&mut databases, collection)?;
        stored
            .documents
            .remove(&(partition_key.to_string(), id.to_string()))
            .ok_or_else(|| StorageError::NotFound(format!("document {} in partition {}", id, partition_key)))?;
        self.record_write();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PartitionKeyDefinition;
    use serde_json::json;

    fn rules() -> CollectionRef {
        CollectionRef::new("casbin", "casbin_rule")
    }

    async fn provisioned(page_size: usize) -> InMemoryDocumentStore {
        let store = InMemoryDocumentStore::with_page_size(page_size);
        store.create_database("casbin").await.unwrap();
        store
            .create_collection(
                "casbin",
                &CollectionDefinition {
                    id: "casbin_rule".to_string(),
                    partition_key: PartitionKeyDefinition::hash("/pType"),
                },
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_missing_resources_are_not_found() {
        let store = InMemoryDocumentStore::new();
        assert!(store.read_database("casbin").await.unwrap_err().is_not_found());
        assert!(store.read_collection(&rules()).await.unwrap_err().is_not_found());

        store.create_database("casbin").await.unwrap();
        store.read_database("casbin").await.unwrap();
        assert!(store.read_collection(&rules()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_partition_key_must_match_document() {
        let store = provisioned(10).await;
        let err = store
            .create_document(&rules(), json!({"id": "1", "pType": "p"}), "g")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::PartitionKey(_)));

        store
            .create_document(&rules(), json!({"id": "1", "pType": "p"}), "p")
            .await
            .unwrap();
        let err = store
            .create_document(&rules(), json!({"id": "1", "pType": "p"}), "p")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_read_all_pages_through_continuations() {
        let store = provisioned(2).await;
        for i in 0..5 {
            let ptype = if i % 2 == 0 { "p" } else { "g" };
            store
                .create_document(&rules(), json!({"id": i.to_string(), "pType": ptype}), ptype)
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut token = None;
        loop {
            let page = store
                .read_all(&rules(), FeedOptions::cross_partition().with_continuation(token))
                .await
                .unwrap();
            assert!(page.documents.len() <= 2);
            seen.extend(page.documents);
            token = page.continuation;
            if token.is_none() {
                break;
            }
        }
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn test_query_respects_partition_scope() {
        let store = provisioned(10).await;
        store
            .create_document(&rules(), json!({"id": "1", "pType": "p", "v0": "alice"}), "p")
            .await
            .unwrap();
        store
            .create_document(&rules(), json!({"id": "2", "pType": "g", "v0": "alice"}), "g")
            .await
            .unwrap();

        let spec = QuerySpec::new("SELECT * FROM root WHERE root.v0 = @v0").with_parameter("@v0", "alice");
        let all = store.query(&rules(), &spec, FeedOptions::cross_partition()).await.unwrap();
        assert_eq!(all.documents.len(), 2);

        let scoped = store.query(&rules(), &spec, FeedOptions::partition("g")).await.unwrap();
        assert_eq!(scoped.documents.len(), 1);
        assert_eq!(scoped.documents[0]["id"], "2");
    }

    #[tokio::test]
    async fn test_delete_collection_drops_documents() {
        let store = provisioned(10).await;
        store
            .create_document(&rules(), json!({"id": "1", "pType": "p"}), "p")
            .await
            .unwrap();
        assert_eq!(store.document_count(&rules()), 1);

        store.delete_collection(&rules()).await.unwrap();
        assert!(store.read_collection(&rules()).await.unwrap_err().is_not_found());
        assert_eq!(store.document_count(&rules()), 0);
    }

    #[tokio::test]
    async fn test_write_limit() {
        let store = provisioned(10).await;
        store.set_write_limit(Some(store.writes()));
        let err = store
            .create_document(&rules(), json!({"id": "1", "pType": "p"}), "p")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Internal(_)));

        store.set_write_limit(None);
        store
            .create_document(&rules(), json!({"id": "1", "pType": "p"}), "p")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_bad_continuation_token() {
        let store = provisioned(10).await;
        let err = store
            .read_all(&rules(), FeedOptions::cross_partition().with_continuation(Some("x".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Continuation(_)));
    }
}
