//! Backing log adapter contract.
//!
//! StreamVault does not implement the append-only log service itself; it
//! consumes one through this trait. The contract mirrors the primitives the
//! service exposes:
//!
//! - **append**: one atomic pipeline of entry insertions, each optionally
//!   carrying an explicit ID and a retention bound; results are reported
//!   per-slot so one bad entry never aborts its siblings.
//! - **read**: a single consolidated tail-read across many streams, blocking
//!   up to a timeout (or returning immediately when no timeout is given).
//! - **range_rev**: a newest-first bounded scan of one stream.
//! - **trim / delete / list / info**: retention and introspection.
//! - **kv_***: a small key/value surface for out-of-band state (stream
//!   metadata blobs, the current-recording pointer, cached stats).
//!
//! Within one stream, entry IDs are strictly increasing; implementations
//! must reject explicit IDs that do not advance past the stream's last ID.
//!
//! Connection establishment (and any fixed-backoff retry on an unavailable
//! service) is an implementation concern of the concrete backend; once
//! constructed, individual operations are not retried here.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use streamvault_core::{Entry, EntryId, StreamEntries};
use thiserror::Error;

/// One entry insertion inside an atomic append pipeline.
#[derive(Debug, Clone)]
pub struct AppendOp {
    pub stream: String,
    /// Explicit entry ID, or `None` for a store-assigned wall-clock token.
    pub id: Option<EntryId>,
    pub payload: Bytes,
    /// Approximate retention bound applied right after insertion.
    pub maxlen: Option<u64>,
}

/// Backing-store statistics for one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub length: u64,
    pub first: Option<EntryId>,
    pub last: Option<EntryId>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("stream not found: {0}")]
    NotFound(String),

    /// An explicit ID did not advance past the stream's last entry.
    #[error("ID {id} is not greater than last entry {last} in stream {stream}")]
    IdNotIncreasing {
        stream: String,
        id: EntryId,
        last: EntryId,
    },

    /// The entry itself was malformed (e.g. an invalid target stream).
    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    /// The service could not be reached at connection establishment.
    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Contract over the external append-only multi-stream log service.
///
/// Shared read-write across all tasks as `Arc<dyn LogBackend>`; each batched
/// call is one atomic submission that other callers' batches cannot
/// interleave with entry-by-entry.
#[async_trait]
pub trait LogBackend: Send + Sync {
    /// Submit `batch` as one pipeline. The outer `Result` fails only when
    /// the whole submission could not be made; inner slots carry the
    /// assigned ID or the per-entry error.
    async fn append(&self, batch: Vec<AppendOp>) -> BackendResult<Vec<BackendResult<EntryId>>>;

    /// Consolidated tail-read: for each `(stream, after)` pair, return up to
    /// `count` entries with IDs strictly greater than `after`. When every
    /// stream is empty and `block` is set, wait up to that long for new data
    /// before returning (possibly still empty). `block = None` returns
    /// immediately.
    async fn read(
        &self,
        positions: &[(String, EntryId)],
        count: usize,
        block: Option<Duration>,
    ) -> BackendResult<Vec<StreamEntries>>;

    /// The most recent `count` entries of one stream, newest first.
    /// Unknown streams yield an empty scan, matching the tail-read path.
    async fn range_rev(&self, stream: &str, count: usize) -> BackendResult<Vec<Entry>>;

    /// Trim a stream down to `maxlen` entries. Approximate trimming may
    /// retain more than requested (by a bounded granularity) for
    /// efficiency; exact trimming removes precisely to the bound.
    async fn trim(&self, stream: &str, maxlen: u64, approximate: bool) -> BackendResult<u64>;

    /// Delete streams as one unit. Absent streams are ignored.
    async fn delete_streams(&self, streams: &[String]) -> BackendResult<()>;

    async fn list_streams(&self) -> BackendResult<Vec<String>>;

    async fn stream_info(&self, stream: &str) -> BackendResult<BackendInfo>;

    async fn kv_get(&self, key: &str) -> BackendResult<Option<Bytes>>;

    /// Returns `true` when the write was confirmed by the service.
    async fn kv_set(&self, key: &str, value: Bytes) -> BackendResult<bool>;

    async fn kv_del(&self, key: &str) -> BackendResult<bool>;
}
