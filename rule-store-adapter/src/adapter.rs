//! Document database adapter for policy rules
//!
//! Each rule is one document in a collection partitioned by `pType`.
//! Loads scan (or query) the collection page by page; a full save drops and
//! recreates the collection before re-inserting every rule, so readers can
//! briefly observe an empty rule set.

use async_trait::async_trait;
use rule_store_core::{PolicyModel, RuleDocument, GROUPING_SECTION, POLICY_SECTION};
use rule_store_storage::{
    CollectionDefinition, CollectionRef, DocumentStore, FeedOptions, PartitionKeyDefinition,
    QuerySpec,
};
use serde_json::Value;
use std::sync::Arc;

use crate::config::{AdapterConfig, PARTITION_KEY_PATH};
use crate::{Adapter, AdapterError, RuleQuery};

/// Persists policy rules in a document database
pub struct RuleAdapter {
    store: Arc<dyn DocumentStore>,
    collection: CollectionRef,
    filtered: bool,
}

impl RuleAdapter {
    /// Connect to the store named by `connection_string` and provision the
    /// database and collection if they do not exist yet.
    pub async fn connect(connection_string: &str, config: AdapterConfig) -> Result<Self, AdapterError> {
        let store = rule_store_storage::connect(connection_string).await?;
        Self::with_store(store, config).await
    }

    /// Like [`RuleAdapter::connect`], but starts in filtered mode: the
    /// caller is expected to load a filtered subset itself, and saving is
    /// refused until an unfiltered load.
    pub async fn connect_filtered(
        connection_string: &str,
        config: AdapterConfig,
    ) -> Result<Self, AdapterError> {
        let mut adapter = Self::connect(connection_string, config).await?;
        adapter.filtered = true;
        Ok(adapter)
    }

    /// Build on an existing client, provisioning as needed
    pub async fn with_store(
        store: Arc<dyn DocumentStore>,
        config: AdapterConfig,
    ) -> Result<Self, AdapterError> {
        let adapter = Self {
            store,
            collection: CollectionRef::new(config.database_name, config.collection_name),
            filtered: false,
        };
        adapter.create_database_if_not_exist().await?;
        adapter.create_collection_if_not_exist().await?;

        tracing::info!("Rule adapter ready on {}", adapter.collection);
        Ok(adapter)
    }

    pub async fn with_store_filtered(
        store: Arc<dyn DocumentStore>,
        config: AdapterConfig,
    ) -> Result<Self, AdapterError> {
        let mut adapter = Self::with_store(store, config).await?;
        adapter.filtered = true;
        Ok(adapter)
    }

    /// The database/collection pair rules are stored in
    pub fn collection(&self) -> &CollectionRef {
        &self.collection
    }

    fn collection_definition(&self) -> CollectionDefinition {
        CollectionDefinition {
            id: self.collection.collection.clone(),
            partition_key: PartitionKeyDefinition::hash(PARTITION_KEY_PATH),
        }
    }

    async fn create_database_if_not_exist(&self) -> Result<(), AdapterError> {
        let database = &self.collection.database;
        match self.store.read_database(database).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::info!("Creating database {}", database);
                self.store.create_database(database).await?;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Reading database {} failed: {}", database, e);
                Err(e.into())
            }
        }
    }

    async fn create_collection_if_not_exist(&self) -> Result<(), AdapterError> {
        match self.store.read_collection(&self.collection).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::info!("Creating collection {}", self.collection);
                self.store
                    .create_collection(&self.collection.database, &self.collection_definition())
                    .await?;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Reading collection {} failed: {}", self.collection, e);
                Err(e.into())
            }
        }
    }

    async fn drop_collection(&self) -> Result<(), AdapterError> {
        self.store.delete_collection(&self.collection).await?;
        self.store
            .create_collection(&self.collection.database, &self.collection_definition())
            .await?;
        Ok(())
    }

    /// Follow continuation tokens until the store reports no more pages
    async fn fetch(&self, query: Option<&QuerySpec>, options: FeedOptions) -> Result<Vec<Value>, AdapterError> {
        let mut documents = Vec::new();
        let mut continuation = None;

        loop {
            let options = options.clone().with_continuation(continuation);
            let page = match query {
                Some(spec) => self.store.query(&self.collection, spec, options).await?,
                None => self.store.read_all(&self.collection, options).await?,
            };
            documents.extend(page.documents);

            match page.continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        Ok(documents)
    }

    async fn load_documents(
        &self,
        model: &mut PolicyModel,
        query: Option<&QuerySpec>,
    ) -> Result<(), AdapterError> {
        let documents = self.fetch(query, FeedOptions::cross_partition()).await?;
        let total = documents.len();

        let mut loaded = 0;
        for document in documents {
            let line = match serde_json::from_value::<RuleDocument>(document) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Skipping malformed rule document: {}", e);
                    continue;
                }
            };
            if load_policy_line(&line, model) {
                loaded += 1;
            } else {
                tracing::warn!("Skipping rule document {} without a policy type", line.id);
            }
        }

        tracing::debug!("Loaded {} of {} rule documents from {}", loaded, total, self.collection);
        Ok(())
    }

    async fn insert(&self, line: &RuleDocument) -> Result<(), AdapterError> {
        let document = serde_json::to_value(line)?;
        self.store
            .create_document(&self.collection, document, line.partition_key())
            .await?;
        Ok(())
    }

    /// Delete every document `query` selects within the `ptype` partition
    async fn delete_matching(&self, ptype: &str, query: RuleQuery) -> Result<usize, AdapterError> {
        let spec = query.build();
        let documents = self
            .fetch(Some(&spec), FeedOptions::partition(rule_store_core::partition_key_for(ptype)))
            .await?;

        let mut removed = 0;
        for document in documents {
            let line: RuleDocument = serde_json::from_value(document)?;
            self.store
                .delete_document(&self.collection, &line.id, line.partition_key())
                .await?;
            removed += 1;
        }

        tracing::debug!("Removed {} rule documents of type {}", removed, ptype);
        Ok(removed)
    }
}

/// Append a stored rule to its section bucket. Returns false when the
/// document carries no policy type.
fn load_policy_line(line: &RuleDocument, model: &mut PolicyModel) -> bool {
    match line.section() {
        Some(sec) => {
            model.add_policy(sec, &line.ptype, line.to_rule());
            true
        }
        None => false,
    }
}

#[async_trait]
impl Adapter for RuleAdapter {
    type Filter = QuerySpec;

    async fn load_policy(&mut self, model: &mut PolicyModel) -> Result<(), AdapterError> {
        self.load_filtered_policy(model, None).await
    }

    async fn load_filtered_policy(
        &mut self,
        model: &mut PolicyModel,
        filter: Option<QuerySpec>,
    ) -> Result<(), AdapterError> {
        // set before loading: a failed filtered load still counts as filtered
        self.filtered = filter.is_some();
        self.load_documents(model, filter.as_ref()).await
    }

    fn is_filtered(&self) -> bool {
        self.filtered
    }

    async fn save_policy(&mut self, model: &PolicyModel) -> Result<(), AdapterError> {
        if self.filtered {
            return Err(AdapterError::FilteredPolicy);
        }

        let mut lines = Vec::new();
        for sec in [POLICY_SECTION, GROUPING_SECTION] {
            for (ptype, rules) in model.section(sec) {
                for rule in rules {
                    lines.push(RuleDocument::new(ptype, rule)?);
                }
            }
        }

        self.drop_collection().await?;
        for line in &lines {
            self.insert(line).await?;
        }

        tracing::info!("Saved {} rules to {}", lines.len(), self.collection);
        Ok(())
    }

    async fn add_policy(&self, _sec: &str, ptype: &str, rule: &[String]) -> Result<(), AdapterError> {
        let line = RuleDocument::new(ptype, rule)?;
        self.insert(&line).await
    }

    async fn add_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: &[Vec<String>],
    ) -> Result<(), AdapterError> {
        for rule in rules {
            self.add_policy(sec, ptype, rule).await?;
        }
        Ok(())
    }

    async fn remove_policy(&self, _sec: &str, ptype: &str, rule: &[String]) -> Result<usize, AdapterError> {
        let query = RuleQuery::for_rule(ptype, rule)?;
        self.delete_matching(ptype, query).await
    }

    async fn remove_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: &[Vec<String>],
    ) -> Result<usize, AdapterError> {
        let mut removed = 0;
        for rule in rules {
            removed += self.remove_policy(sec, ptype, rule).await?;
        }
        Ok(removed)
    }

    async fn remove_filtered_policy(
        &self,
        _sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<usize, AdapterError> {
        let query = RuleQuery::for_filter(ptype, field_index, field_values);
        self.delete_matching(ptype, query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rule_store_storage::{InMemoryDocumentStore, Page, StorageError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rule(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    /// Store whose metadata reads fail with a connection error once
    /// `healthy_reads` reads have succeeded; creates are counted, never applied.
    struct UnreachableStore {
        healthy_reads: usize,
        reads: AtomicUsize,
        creates: AtomicUsize,
    }

    impl UnreachableStore {
        fn new(healthy_reads: usize) -> Self {
            Self {
                healthy_reads,
                reads: AtomicUsize::new(0),
                creates: AtomicUsize::new(0),
            }
        }

        fn read(&self) -> Result<(), StorageError> {
            if self.reads.fetch_add(1, Ordering::SeqCst) < self.healthy_reads {
                Ok(())
            } else {
                Err(StorageError::Connection("connection refused".to_string()))
            }
        }

        fn create(&self) -> Result<(), StorageError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl DocumentStore for UnreachableStore {
        async fn read_database(&self, _database: &str) -> Result<(), StorageError> {
            self.read()
        }

        async fn create_database(&self, _database: &str) -> Result<(), StorageError> {
            self.create()
        }

        async fn read_collection(&self, _collection: &CollectionRef) -> Result<(), StorageError> {
            self.read()
        }

        async fn create_collection(
            &self,
            _database: &str,
            _definition: &CollectionDefinition,
        ) -> Result<(), StorageError> {
            self.create()
        }

        async fn delete_collection(&self, _collection: &CollectionRef) -> Result<(), StorageError> {
            Err(StorageError::Internal("unsupported".to_string()))
        }

        async fn create_document(
            &self,
            _collection: &CollectionRef,
            _document: Value,
            _partition_key: &str,
        ) -> Result<(), StorageError> {
            Err(StorageError::Internal("unsupported".to_string()))
        }

        async fn read_all(
            &self,
            _collection: &CollectionRef,
            _options: FeedOptions,
        ) -> Result<Page, StorageError> {
            Err(StorageError::Internal("unsupported".to_string()))
        }

        async fn query(
            &self,
            _collection: &CollectionRef,
            _query: &QuerySpec,
            _options: FeedOptions,
        ) -> Result<Page, StorageError> {
            Err(StorageError::Internal("unsupported".to_string()))
        }

        async fn delete_document(
            &self,
            _collection: &CollectionRef,
            _id: &str,
            _partition_key: &str,
        ) -> Result<(), StorageError> {
            Err(StorageError::Internal("unsupported".to_string()))
        }
    }

    #[test]
    fn test_load_policy_line_uses_first_character_as_section() {
        let mut model = PolicyModel::new();
        let line = RuleDocument::new("g2", &rule(&["alice", "admin"])).unwrap();
        assert!(load_policy_line(&line, &mut model));
        assert_eq!(model.get_policy("g", "g2"), &[rule(&["alice", "admin"])]);

        let untyped = RuleDocument::default();
        assert!(!load_policy_line(&untyped, &mut model));
        assert_eq!(model.len(), 1);
    }

    #[tokio::test]
    async fn test_provisioning_creates_missing_resources() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let adapter = RuleAdapter::with_store(store.clone(), AdapterConfig::default())
            .await
            .unwrap();

        store.read_database("casbin").await.unwrap();
        store.read_collection(adapter.collection()).await.unwrap();
        assert!(!adapter.is_filtered());
    }

    #[tokio::test]
    async fn test_provisioning_surfaces_other_errors() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.set_write_limit(Some(0));

        let err = RuleAdapter::with_store(store, AdapterConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AdapterError::Storage(StorageError::Internal(_))));
    }

    #[tokio::test]
    async fn test_database_read_failure_is_not_treated_as_missing() {
        let store = Arc::new(UnreachableStore::new(0));

        let err = RuleAdapter::with_store(store.clone(), AdapterConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AdapterError::Storage(StorageError::Connection(_))));
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_collection_read_failure_is_not_treated_as_missing() {
        let store = Arc::new(UnreachableStore::new(1));

        let err = RuleAdapter::with_store(store.clone(), AdapterConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AdapterError::Storage(StorageError::Connection(_))));
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delete_failure_stops_removal_midway() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let adapter = RuleAdapter::with_store(store.clone(), AdapterConfig::default())
            .await
            .unwrap();
        let line = rule(&["alice", "data1", "read"]);
        for _ in 0..3 {
            adapter.add_policy("p", "p", &line).await.unwrap();
        }
        store.set_write_limit(Some(store.writes() + 1));

        let err = adapter.remove_policy("p", "p", &line).await.err().unwrap();
        assert!(matches!(err, AdapterError::Storage(StorageError::Internal(_))));
        assert_eq!(store.document_count(adapter.collection()), 2);
    }

    #[tokio::test]
    async fn test_failed_filtered_load_still_reports_filtered() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let mut adapter = RuleAdapter::with_store(store, AdapterConfig::default())
            .await
            .unwrap();

        let mut model = PolicyModel::new();
        let filter = QuerySpec::new("DROP root");
        assert!(adapter.load_filtered_policy(&mut model, Some(filter)).await.is_err());
        assert!(adapter.is_filtered());
    }

    #[tokio::test]
    async fn test_malformed_documents_are_skipped() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let mut adapter = RuleAdapter::with_store(store.clone(), AdapterConfig::default())
            .await
            .unwrap();
        store
            .create_document(
                adapter.collection(),
                serde_json::json!({"id": "1", "pType": "p", "v0": 42}),
                "p",
            )
            .await
            .unwrap();
        adapter.add_policy("p", "p", &rule(&["alice", "data1", "read"])).await.unwrap();

        let mut model = PolicyModel::new();
        adapter.load_policy(&mut model).await.unwrap();
        assert_eq!(model.get_policy("p", "p"), &[rule(&["alice", "data1", "read"])]);
    }
}
