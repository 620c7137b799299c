//! Stream storage layer for StreamVault.
//!
//! This crate provides the three pieces that sit between producers/consumers
//! and an append-only multi-stream log service:
//!
//! - [`LogBackend`]: the adapter contract over the external log service
//!   (append with optional explicit ID, bounded trim, reverse scan, blocking
//!   tail-read, plus a small KV surface for out-of-band metadata). The
//!   service itself is an external collaborator; [`MemoryBackend`] is the
//!   in-process implementation used by tests and embedded deployments.
//! - [`StreamStore`]: stream-level operations: batched atomic appends with
//!   per-slot error reporting, catch-up/latest reads, stream listing and
//!   stats, JSON metadata, trim and delete.
//! - [`MultiStreamCursor`]: a per-consumer position map polled across an
//!   arbitrary stream set, with tailing vs catch-up semantics and optional
//!   cross-stream time synchronization.
//!
//! The store is constructed explicitly and passed by `Arc` into every
//! component; there is no process-wide singleton, so tests substitute
//! [`MemoryBackend`] for the real service.

pub mod backend;
pub mod config;
pub mod cursor;
pub mod error;
pub mod memory;
pub mod store;

pub use backend::{AppendOp, BackendError, BackendInfo, LogBackend};
pub use config::StoreConfig;
pub use cursor::{CursorConfig, CursorMode, MultiStreamCursor};
pub use error::{Result, StoreError};
pub use memory::{MemoryBackend, MemoryBackendConfig};
pub use store::{NewEntry, StreamStats, StreamStore};
