//! Recording and replay for StreamVault.
//!
//! Live streams are archived into immutable chunk files and replayed back
//! into the live stream space later, at original or accelerated timing:
//!
//! - [`chunk`]: the on-disk chunk file format and the
//!   `<first>_<last>.chunk` naming convention that makes time-range lookups
//!   a directory listing instead of a file read.
//! - [`RecordingWriter`]: per-stream buffering with count/size rotation,
//!   fed by a catch-up cursor over the live store.
//! - [`RecordingCatalog`]: recording lifecycle: start/stop with lifecycle
//!   events, enumeration, aggregate stats with a staleness-gated cache,
//!   rename/delete with strict path containment.
//! - [`RecordingPlayer`]: reads chunks back in order and re-injects them
//!   through the ordinary append path, paced to the original inter-arrival
//!   deltas, with periodic progress snapshots and cooperative cancellation.

pub mod archiver;
pub mod catalog;
pub mod chunk;
pub mod config;
pub mod error;
pub mod player;
pub mod signal;

pub use archiver::{record_streams, RecordingWriter};
pub use catalog::{RecordingCatalog, RecordingInfo, RecordingStreamInfo};
pub use config::{ChunkConfig, PlayerConfig, RecordingConfig};
pub use error::{RecordingError, Result};
pub use player::{Disconnected, PlayerState, ProgressSink, ProgressSnapshot, RecordingPlayer};
pub use signal::StopSignal;
