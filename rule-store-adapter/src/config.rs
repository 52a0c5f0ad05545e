//! Adapter configuration

/// Database used when none is configured
pub const DEFAULT_DATABASE: &str = "casbin";
/// Collection used when none is configured
pub const DEFAULT_COLLECTION: &str = "casbin_rule";
/// Rules are partitioned by their policy type
pub const PARTITION_KEY_PATH: &str = "/pType";

pub const DATABASE_ENV: &str = "RULE_STORE_DATABASE";
pub const COLLECTION_ENV: &str = "RULE_STORE_COLLECTION";

/// Where the adapter keeps its rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub database_name: String,
    pub collection_name: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            database_name: DEFAULT_DATABASE.to_string(),
            collection_name: DEFAULT_COLLECTION.to_string(),
        }
    }
}

impl AdapterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different database
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.database_name = name.into();
        self
    }

    /// Use a different collection
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection_name = name.into();
        self
    }

    /// Read `RULE_STORE_DATABASE` / `RULE_STORE_COLLECTION`, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            database_name: lookup(DATABASE_ENV)
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.database_name),
            collection_name: lookup(COLLECTION_ENV)
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.collection_name),
        }
    }
}
