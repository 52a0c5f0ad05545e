//! Core domain models for the rule store
//!
//! This crate contains the shared data structures used across
//! the adapter: the stored rule document and the in-memory policy model.

pub mod error;
pub mod models;

pub use error::CoreError;
pub use models::*;

/// Number of value columns a stored rule carries (`v0`..`v5`).
pub const MAX_FIELDS: usize = 6;
