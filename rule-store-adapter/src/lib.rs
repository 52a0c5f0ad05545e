//! Rule store adapter
//!
//! Lets an access-control engine keep its policy rules in a document
//! database: one document per rule, partitioned by policy type.

pub mod adapter;
pub mod config;
pub mod error;
pub mod filter;
pub mod traits;

pub use adapter::RuleAdapter;
pub use config::AdapterConfig;
pub use error::AdapterError;
pub use filter::RuleQuery;
pub use traits::Adapter;

pub use rule_store_core::{PolicyModel, RuleDocument};
pub use rule_store_storage::{QueryParam, QuerySpec};
