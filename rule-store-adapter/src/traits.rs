//! The persistence contract an access-control engine drives

use async_trait::async_trait;
use rule_store_core::PolicyModel;

use crate::AdapterError;

/// Trait for loading and persisting policy rules
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Store-specific selector accepted by `load_filtered_policy`
    type Filter: Send + 'static;

    /// Load every stored rule into `model`
    async fn load_policy(&mut self, model: &mut PolicyModel) -> Result<(), AdapterError>;

    /// Load only the rules `filter` selects; `None` loads everything
    async fn load_filtered_policy(
        &mut self,
        model: &mut PolicyModel,
        filter: Option<Self::Filter>,
    ) -> Result<(), AdapterError>;

    /// Whether the last load returned a subset of the stored rules
    fn is_filtered(&self) -> bool;

    /// Replace the stored rules with the contents of `model`
    async fn save_policy(&mut self, model: &PolicyModel) -> Result<(), AdapterError>;

    async fn add_policy(&self, sec: &str, ptype: &str, rule: &[String]) -> Result<(), AdapterError>;

    async fn add_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: &[Vec<String>],
    ) -> Result<(), AdapterError>;

    /// Delete stored rules equal to `rule` on its leading columns; returns how many
    async fn remove_policy(&self, sec: &str, ptype: &str, rule: &[String]) -> Result<usize, AdapterError>;

    async fn remove_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: &[Vec<String>],
    ) -> Result<usize, AdapterError>;

    /// Delete stored rules whose columns from `field_index` on match the
    /// non-empty `field_values`; returns how many
    async fn remove_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<usize, AdapterError>;
}
