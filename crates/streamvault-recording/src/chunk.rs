//! Chunk file format.
//!
//! A chunk is one immutable archive file covering a contiguous range of one
//! stream's entries. The filename is derived from the covered range
//! (`<first_entry_id>_<last_entry_id>.chunk`), so retrieval can range-scan a
//! directory listing without opening any file.
//!
//! ## File layout
//!
//! The body reuses the wire codec's index-plus-blob framing, length-prefixed
//! so the two parts can live in one file:
//!
//! ```text
//! ┌───────┬─────────┬───────────┬────────────────┬──────────┐
//! │ Magic │ Version │ Index Len │ JSON Index     │ Blob     │
//! │ SVCK  │ u16 LE  │ u32 LE    │ [[id,off],...] │ payloads │
//! └───────┴─────────┴───────────┴────────────────┴──────────┘
//! ```
//!
//! The index is an ordered array of `[entry_id, byte_offset]` pairs; each
//! payload ends where the next begins (or at end of blob). Payloads are
//! stored uncompressed; they are typically already-encoded media frames.

use std::path::{Path, PathBuf};
use streamvault_core::{Entry, EntryId};
use tracing::debug;

use crate::error::{RecordingError, Result};

pub const CHUNK_EXT: &str = "chunk";

const MAGIC: &[u8; 4] = b"SVCK";
const VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4;

/// Deterministic filename for a chunk covering `first..=last`.
pub fn chunk_file_name(first: EntryId, last: EntryId) -> String {
    format!("{first}_{last}.{CHUNK_EXT}")
}

/// Recover the covered entry ID range from a chunk's filename.
pub fn parse_chunk_name(path: &Path) -> Result<(EntryId, EntryId)> {
    let bad = || RecordingError::InvalidChunkName(path.display().to_string());
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(bad)?;
    let (first, last) = stem.split_once('_').ok_or_else(bad)?;
    Ok((
        first.parse().map_err(|_| bad())?,
        last.parse().map_err(|_| bad())?,
    ))
}

/// Serialize entries into the chunk body. Entries must be non-empty and in
/// increasing ID order (the archiver's buffers already are).
pub fn encode_chunk(entries: &[Entry]) -> Result<Vec<u8>> {
    let mut index: Vec<(String, usize)> = Vec::with_capacity(entries.len());
    let mut offset = 0;
    for entry in entries {
        index.push((entry.id.to_string(), offset));
        offset += entry.payload.len();
    }
    let index = serde_json::to_vec(&index)?;

    let mut out = Vec::with_capacity(HEADER_LEN + index.len() + offset);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(index.len() as u32).to_le_bytes());
    out.extend_from_slice(&index);
    for entry in entries {
        out.extend_from_slice(&entry.payload);
    }
    Ok(out)
}

/// Parse a chunk body back into entries, ascending by ID.
pub fn decode_chunk(data: &[u8]) -> Result<Vec<Entry>> {
    if data.len() < HEADER_LEN || &data[..4] != MAGIC {
        return Err(RecordingError::InvalidMagic);
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != VERSION {
        return Err(RecordingError::UnsupportedVersion(version));
    }
    let index_len = u32::from_le_bytes([data[6], data[7], data[8], data[9]]) as usize;
    let blob_start = HEADER_LEN + index_len;
    if data.len() < blob_start {
        return Err(RecordingError::CorruptChunk("truncated index".into()));
    }
    let index: Vec<(String, usize)> = serde_json::from_slice(&data[HEADER_LEN..blob_start])?;
    let blob = &data[blob_start..];

    let mut entries = Vec::with_capacity(index.len());
    for (i, (id, start)) in index.iter().enumerate() {
        let end = match index.get(i + 1) {
            Some((_, next)) => *next,
            None => blob.len(),
        };
        if *start > end || end > blob.len() {
            return Err(RecordingError::CorruptChunk(format!(
                "offset {start}..{end} outside blob of {} bytes",
                blob.len()
            )));
        }
        entries.push(Entry::new(
            id.parse::<EntryId>()?,
            blob[*start..end].to_vec(),
        ));
    }
    entries.sort_by_key(|e| e.id);
    Ok(entries)
}

/// Write one chunk under `dir`, named from its first/last entry IDs.
pub async fn write_chunk(dir: &Path, entries: &[Entry]) -> Result<PathBuf> {
    let (first, last) = match (entries.first(), entries.last()) {
        (Some(first), Some(last)) => (first.id, last.id),
        _ => {
            return Err(RecordingError::CorruptChunk(
                "refusing to write an empty chunk".into(),
            ))
        }
    };
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(chunk_file_name(first, last));
    tokio::fs::write(&path, encode_chunk(entries)?).await?;
    debug!(path = %path.display(), entries = entries.len(), "wrote chunk");
    Ok(path)
}

/// Read one chunk file.
pub async fn read_chunk(path: &Path) -> Result<Vec<Entry>> {
    decode_chunk(&tokio::fs::read(path).await?)
}

/// Chunk files under one stream directory, in time (filename) order.
/// A missing directory is an empty recording, not an error.
pub async fn list_chunks(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut files = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(CHUNK_EXT) {
            // Order by the covered range, not the raw filename: a shorter
            // ms token sorts after a longer one lexicographically.
            let (first, _) = parse_chunk_name(&path)?;
            files.push((first, path));
        }
    }
    files.sort_by_key(|(first, _)| *first);
    Ok(files.into_iter().map(|(_, path)| path).collect())
}
