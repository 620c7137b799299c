//! Core types shared by every StreamVault crate.
//!
//! This crate is deliberately small and synchronous: it defines the entry ID
//! / position token grammar, the entry data structures, the multi-stream
//! selector parser, and the wire codec that frames heterogeneous payloads
//! from many streams into a single index + blob pair.
//!
//! Everything that touches a backing store, the filesystem, or a clock other
//! than "what time is it right now" lives in `streamvault-store` and
//! `streamvault-recording`.

pub mod codec;
pub mod entry;
pub mod error;
pub mod selector;

pub use codec::{pack, unpack, PackedEntry};
pub use entry::{Entry, EntryId, Position, StreamEntries};
pub use error::{Error, Result};
pub use selector::parse_selector;
