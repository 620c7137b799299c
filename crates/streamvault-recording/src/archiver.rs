//! Recording writer: per-stream buffering with chunk rotation.
//!
//! During an active recording each stream accumulates entries in memory;
//! when the buffered entry count or cumulative payload size crosses its
//! threshold, the buffer is flushed as one chunk file under
//! `<recording_dir>/<stream_id>/` and cleared. Stopping a recording
//! force-flushes every non-empty buffer regardless of thresholds, so no
//! observed entry is left un-persisted.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use streamvault_core::{Entry, Position, StreamEntries};
use streamvault_store::{CursorConfig, CursorMode, MultiStreamCursor, StreamStore};
use tracing::{debug, info};

use crate::chunk;
use crate::config::ChunkConfig;
use crate::error::Result;
use crate::signal::StopSignal;

#[derive(Default)]
struct ChunkBuffer {
    entries: Vec<Entry>,
    bytes: usize,
}

/// Buffers one recording's streams and rotates chunk files.
pub struct RecordingWriter {
    dir: PathBuf,
    config: ChunkConfig,
    buffers: HashMap<String, ChunkBuffer>,
}

impl RecordingWriter {
    /// `dir` is the recording's raw directory (`<raw_root>/<recording_id>`).
    pub fn new(dir: PathBuf, config: ChunkConfig) -> Self {
        Self {
            dir,
            config,
            buffers: HashMap::new(),
        }
    }

    /// Buffer one entry, flushing the stream's chunk if a threshold is hit.
    /// Returns the path of the chunk written, if any.
    pub async fn accept(&mut self, stream: &str, entry: Entry) -> Result<Option<PathBuf>> {
        let buffer = self.buffers.entry(stream.to_string()).or_default();
        buffer.bytes += entry.payload.len();
        buffer.entries.push(entry);

        if buffer.entries.len() >= self.config.max_chunk_len
            || buffer.bytes >= self.config.max_chunk_bytes
        {
            return self.flush_stream(stream).await;
        }
        Ok(None)
    }

    /// Flush one stream's buffer as a chunk, if it holds anything.
    pub async fn flush_stream(&mut self, stream: &str) -> Result<Option<PathBuf>> {
        let Some(buffer) = self.buffers.get_mut(stream) else {
            return Ok(None);
        };
        if buffer.entries.is_empty() {
            return Ok(None);
        }
        let entries = std::mem::take(&mut buffer.entries);
        buffer.bytes = 0;

        let path = chunk::write_chunk(&self.dir.join(stream), &entries).await?;
        debug!(stream, chunk = %path.display(), "rotated chunk");
        Ok(Some(path))
    }

    /// Force-flush every non-empty buffer (recording stop).
    pub async fn finish(&mut self) -> Result<Vec<PathBuf>> {
        let streams: Vec<String> = self.buffers.keys().cloned().collect();
        let mut written = Vec::new();
        for stream in streams {
            if let Some(path) = self.flush_stream(&stream).await? {
                written.push(path);
            }
        }
        Ok(written)
    }

    /// Entries currently buffered for one stream.
    pub fn buffered(&self, stream: &str) -> usize {
        self.buffers.get(stream).map_or(0, |b| b.entries.len())
    }
}

/// Drive a recording: tail the given streams from "now" with a catch-up
/// cursor (never skipping buffered history) and feed the writer until the
/// stop signal is observed, then force-flush.
///
/// The cursor's bounded block timeout is the cancellation checkpoint: the
/// signal is re-checked between polls.
pub async fn record_streams(
    store: Arc<StreamStore>,
    writer: &mut RecordingWriter,
    streams: Vec<String>,
    stop: StopSignal,
) -> Result<Vec<PathBuf>> {
    let selector = streams
        .iter()
        .map(|sid| (sid.clone(), Position::Now))
        .collect();
    let mut cursor = MultiStreamCursor::new(
        store,
        selector,
        CursorConfig {
            mode: CursorMode::CatchUp,
            count: 256,
            block: Duration::from_secs(10),
            time_sync: None,
        },
    );

    info!(streams = ?streams, "recording started");
    while !stop.is_set() {
        for StreamEntries { stream, entries } in cursor.next().await? {
            for entry in entries {
                writer.accept(&stream, entry).await?;
            }
        }
    }
    let written = writer.finish().await?;
    info!(chunks = written.len(), "recording stopped");
    Ok(written)
}
