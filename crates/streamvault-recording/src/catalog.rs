//! Recording catalog: lifecycle and aggregate statistics.
//!
//! A recording is a directory of per-stream chunk files under the raw root,
//! optionally mirrored by a post-processed derivatives directory. The
//! catalog owns the whole-recording operations:
//!
//! - **start/stop**: set/clear the current-recording pointer in the
//!   backing KV and emit a lifecycle entry on the events stream so
//!   observers react without polling.
//! - **list / stats**: aggregate duration, size, and per-stream chunk
//!   counts, derived entirely from chunk filenames (no file is opened).
//!   Stats may be cached as a per-recording JSON blob; a freshly computed
//!   result is written back only once the recording has been inactive
//!   longer than the staleness threshold, since an active recording's
//!   stats are still changing. The cache is TTL-style and benign-racy:
//!   concurrent recomputation wastes work, never corrupts.
//! - **rename / delete**: whole-directory operations. Rename moves the
//!   raw directory and then the post directory; a crash between the two
//!   leaves a recognized inconsistency (raw renamed, post not) rather than
//!   a hidden one. Delete is idempotent.
//!
//! Every user-supplied recording ID is resolved against the configured root
//! and refused outright if it would escape it (see
//! [`crate::config::RecordingConfig::resolve_raw`]).

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use streamvault_core::EntryId;
use streamvault_store::{NewEntry, StreamStore};
use tracing::{debug, info, warn};

use crate::chunk;
use crate::config::RecordingConfig;
use crate::error::{RecordingError, Result};

/// Chunk statistics for one stream of a recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingStreamInfo {
    pub chunk_count: usize,
    pub size_bytes: u64,
    pub first: Option<String>,
    pub last: Option<String>,
}

/// Aggregate statistics for one recording. Derived, not stored; may be
/// cached once the recording is inactive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingInfo {
    pub name: String,
    pub streams: BTreeMap<String, RecordingStreamInfo>,
    pub size_bytes: u64,
    /// `H:MM:SS.mmm` over non-calibration streams.
    pub duration: Option<String>,
    pub first: Option<String>,
    pub last: Option<String>,
    pub first_time: Option<String>,
    pub last_time: Option<String>,
}

/// Lifecycle and statistics over the recordings directory tree.
pub struct RecordingCatalog {
    store: Arc<StreamStore>,
    config: RecordingConfig,
}

impl RecordingCatalog {
    pub fn new(store: Arc<StreamStore>, config: RecordingConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Start a recording. Generates a sortable date-time ID when none is
    /// given. Fails with [`RecordingError::StartNotConfirmed`] if the
    /// backing store does not confirm the pointer write — a fatal start
    /// failure, not silently retried.
    pub async fn start(&self, id: Option<String>) -> Result<String> {
        let id = id.unwrap_or_else(default_recording_id);
        let dir = self.config.resolve_raw(&id)?;

        let confirmed = self
            .store
            .backend()
            .kv_set(&self.config.pointer_key, Bytes::from(id.clone()))
            .await
            .map_err(streamvault_store::StoreError::from)?;
        if !confirmed {
            return Err(RecordingError::StartNotConfirmed);
        }
        // A previous recording under the same ID may have cached stats;
        // they are about to go stale.
        self.drop_cache(&id).await;
        tokio::fs::create_dir_all(&dir).await?;

        self.emit_lifecycle(id.clone().into_bytes()).await?;
        info!(recording = %id, "recording started");
        Ok(id)
    }

    /// Stop the active recording, if any, returning its ID.
    pub async fn stop(&self) -> Result<Option<String>> {
        let current = self.current().await?;
        if current.is_none() {
            return Ok(None);
        }
        self.store
            .backend()
            .kv_del(&self.config.pointer_key)
            .await
            .map_err(streamvault_store::StoreError::from)?;
        self.emit_lifecycle(Vec::new()).await?;
        info!(recording = ?current, "recording stopped");
        Ok(current)
    }

    /// The active recording's ID, if one is running.
    pub async fn current(&self) -> Result<Option<String>> {
        let raw = self
            .store
            .backend()
            .kv_get(&self.config.pointer_key)
            .await
            .map_err(streamvault_store::StoreError::from)?;
        Ok(raw.map(|b| String::from_utf8_lossy(&b).into_owned()))
    }

    /// Existing recording IDs, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut read_dir = match tokio::fs::read_dir(self.config.raw_root()).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Aggregate stats for one recording, computed from chunk filenames.
    pub async fn recording_info(&self, id: &str) -> Result<RecordingInfo> {
        let dir = self.config.resolve_raw(id)?;
        if !dir.is_dir() {
            return Err(RecordingError::NotFound(id.to_string()));
        }

        let mut streams = BTreeMap::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                let sid = entry.file_name().to_string_lossy().into_owned();
                let info = stream_chunk_info(&entry.path()).await?;
                streams.insert(sid, info);
            }
        }

        // Aggregate range over non-calibration streams only.
        let mut first: Option<EntryId> = None;
        let mut last: Option<EntryId> = None;
        for (sid, info) in &streams {
            if sid.ends_with(&self.config.calibration_suffix) {
                continue;
            }
            if let Some(f) = info.first.as_deref().and_then(|s| s.parse().ok()) {
                first = Some(first.map_or(f, |cur: EntryId| cur.min(f)));
            }
            if let Some(l) = info.last.as_deref().and_then(|s| s.parse().ok()) {
                last = Some(last.map_or(l, |cur: EntryId| cur.max(l)));
            }
        }

        Ok(RecordingInfo {
            name: id.to_string(),
            size_bytes: streams.values().map(|s| s.size_bytes).sum(),
            duration: match (first, last) {
                (Some(f), Some(l)) => Some(format_duration_ms(l.millis_since(&f))),
                _ => None,
            },
            first: first.map(|id| id.to_string()),
            last: last.map(|id| id.to_string()),
            first_time: first.map(|id| id.to_iso()),
            last_time: last.map(|id| id.to_iso()),
            streams,
        })
    }

    /// Stats for every recording. With `cache`, a per-recording cached blob
    /// is consulted first and fresh results are written back only once the
    /// recording is inactive past the staleness threshold. Recordings whose
    /// stats cannot be computed are skipped with a warning rather than
    /// failing the listing.
    pub async fn list_info(&self, cache: bool) -> Result<Vec<RecordingInfo>> {
        let current = self.current().await?;
        let mut infos = Vec::new();
        for id in self.list().await? {
            let is_current = current.as_deref() == Some(id.as_str());
            // The active recording's stats are still changing; never serve
            // it from the cache, even if a blob survives from an earlier
            // life of the same ID.
            if cache && !is_current {
                if let Some(info) = self.cached_info(&id).await {
                    infos.push(info);
                    continue;
                }
            }
            let info = match self.recording_info(&id).await {
                Ok(info) => info,
                Err(e) => {
                    warn!(recording = %id, error = %e, "skipping unreadable recording");
                    continue;
                }
            };
            if cache && !is_current && self.cacheable(&info) {
                self.write_cache(&id, &info).await;
            }
            infos.push(info);
        }
        Ok(infos)
    }

    /// Rename a recording's raw and post directories.
    ///
    /// Collisions fail loudly before anything moves. The two renames are
    /// not atomic as a pair; a crash between them leaves the post directory
    /// under the old name (a documented inconsistency window).
    pub async fn rename(&self, old: &str, new: &str) -> Result<()> {
        let old_raw = self.config.resolve_raw(old)?;
        let new_raw = self.config.resolve_raw(new)?;
        let old_post = self.config.resolve_post(old)?;
        let new_post = self.config.resolve_post(new)?;

        if !old_raw.is_dir() {
            return Err(RecordingError::NotFound(old.to_string()));
        }
        if new_raw.exists() || new_post.exists() {
            return Err(RecordingError::AlreadyExists(new.to_string()));
        }

        tokio::fs::rename(&old_raw, &new_raw).await?;
        if old_post.is_dir() {
            tokio::fs::rename(&old_post, &new_post).await?;
        }
        self.drop_cache(old).await;
        debug!(old, new, "renamed recording");
        Ok(())
    }

    /// Remove a recording's raw and post directories. Absent directories
    /// count as already deleted.
    pub async fn delete(&self, id: &str) -> Result<()> {
        for dir in [self.config.resolve_raw(id)?, self.config.resolve_post(id)?] {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.drop_cache(id).await;
        debug!(recording = %id, "deleted recording");
        Ok(())
    }

    async fn emit_lifecycle(&self, payload: Vec<u8>) -> Result<()> {
        let results = self
            .store
            .append(vec![NewEntry::auto(&*self.config.events_stream, payload)])
            .await?;
        if let Some(result) = results.into_iter().next() {
            result?;
        }
        Ok(())
    }

    async fn cached_info(&self, id: &str) -> Option<RecordingInfo> {
        let raw = self
            .store
            .backend()
            .kv_get(&self.config.cache_key(id))
            .await
            .ok()??;
        serde_json::from_slice(&raw).ok()
    }

    /// Inactive long enough that its stats are unlikely to change.
    fn cacheable(&self, info: &RecordingInfo) -> bool {
        let Some(last) = info.last.as_deref().and_then(|s| s.parse::<EntryId>().ok()) else {
            return false;
        };
        EntryId::now().millis_since(&last) >= self.config.cache_staleness.as_millis() as u64
    }

    async fn write_cache(&self, id: &str, info: &RecordingInfo) {
        // Last-writer-wins; a lost race only wastes a recomputation.
        let Ok(blob) = serde_json::to_vec(info) else { return };
        if let Err(e) = self
            .store
            .backend()
            .kv_set(&self.config.cache_key(id), Bytes::from(blob))
            .await
        {
            warn!(recording = %id, error = %e, "failed to cache recording info");
        }
    }

    async fn drop_cache(&self, id: &str) {
        let _ = self
            .store
            .backend()
            .kv_del(&self.config.cache_key(id))
            .await;
    }
}

/// Per-stream stats from a directory's chunk filenames alone.
async fn stream_chunk_info(dir: &Path) -> Result<RecordingStreamInfo> {
    let files = chunk::list_chunks(dir).await?;
    let mut info = RecordingStreamInfo {
        chunk_count: files.len(),
        ..Default::default()
    };
    for path in &files {
        info.size_bytes += tokio::fs::metadata(path).await?.len();
    }
    if let Some(path) = files.first() {
        info.first = Some(chunk::parse_chunk_name(path)?.0.to_string());
    }
    if let Some(path) = files.last() {
        info.last = Some(chunk::parse_chunk_name(path)?.1.to_string());
    }
    Ok(info)
}

/// Sortable, human-readable recording ID: `2023.01.05-10.30.00`.
fn default_recording_id() -> String {
    chrono::Local::now().format("%Y.%m.%d-%H.%M.%S").to_string()
}

/// Render milliseconds as `H:MM:SS.mmm`.
fn format_duration_ms(ms: u64) -> String {
    let (s, ms) = (ms / 1000, ms % 1000);
    let (m, s) = (s / 60, s % 60);
    let (h, m) = (m / 60, m % 60);
    format!("{h}:{m:02}:{s:02}.{ms:03}")
}
