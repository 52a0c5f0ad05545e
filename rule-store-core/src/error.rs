//! Error types for the core crate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Rule has {0} fields, at most {max} are supported", max = crate::MAX_FIELDS)]
    TooManyFields(usize),
}
