//! Error types for recording and replay.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordingError {
    /// Unknown recording ID.
    #[error("recording not found: {0}")]
    NotFound(String),

    /// A rename destination already exists.
    #[error("recording already exists: {0}")]
    AlreadyExists(String),

    /// A recording ID resolved outside the storage root. Always fatal,
    /// never clamped.
    #[error("recording ID escapes the storage root: {0:?}")]
    PathEscape(String),

    /// The backing store did not confirm the current-recording pointer.
    #[error("recording start was not confirmed by the backing store")]
    StartNotConfirmed,

    /// A replay was requested on a player that already ran; `Done` is
    /// terminal, create a new player.
    #[error("player is done")]
    PlayerDone,

    /// A chunk filename did not follow `<first>_<last>.chunk`.
    #[error("invalid chunk filename: {0:?}")]
    InvalidChunkName(String),

    /// A chunk file did not start with the expected magic bytes.
    #[error("invalid chunk magic bytes")]
    InvalidMagic,

    /// A chunk file was written by a newer format version.
    #[error("unsupported chunk version: {0}")]
    UnsupportedVersion(u16),

    /// A chunk file was truncated or its index did not describe its blob.
    #[error("corrupt chunk: {0}")]
    CorruptChunk(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] streamvault_core::Error),

    #[error(transparent)]
    Store(#[from] streamvault_store::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RecordingError>;
