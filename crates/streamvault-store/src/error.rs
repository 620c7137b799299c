//! Error types for the store layer.
//!
//! Adapter-level errors are converted into per-item markers wherever a call
//! is inherently multi-item (batched append, stream stats); single-item
//! calls propagate them unmodified.

use thiserror::Error;

use crate::backend::BackendError;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unknown stream on a read-side operation.
    #[error("stream not found: {0}")]
    NotFound(String),

    /// Malformed entry ID / position token or stream selector.
    #[error(transparent)]
    InvalidPosition(#[from] streamvault_core::Error),

    /// The backing log service rejected or failed an operation.
    #[error("backing store: {0}")]
    Backend(#[from] BackendError),

    /// Stream metadata was not valid JSON.
    #[error("metadata JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
