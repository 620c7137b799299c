//! Error types for the core crate.
//!
//! All fallible functions in `streamvault-core` return `Result<T>` aliased
//! to `Result<T, Error>` so callers can use the `?` operator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A position token or entry ID string could not be parsed.
    #[error("invalid position token: {0:?}")]
    InvalidPosition(String),

    /// A stream selector was empty or contained a malformed stream ID.
    #[error("invalid stream selector: {0}")]
    InvalidSelector(String),

    /// A wire index did not describe its blob (bad offset, wrong order).
    #[error("invalid wire index: {0}")]
    InvalidIndex(String),

    /// The wire index was not valid JSON.
    #[error("index JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
