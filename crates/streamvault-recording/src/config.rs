//! Recording configuration.
//!
//! All thresholds that were magic constants in earlier iterations of this
//! system (chunk rotation bounds, cache staleness) are explicit fields here
//! with documented defaults, resolved once at load time.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::error::{RecordingError, Result};

/// Chunk rotation thresholds for [`crate::RecordingWriter`].
///
/// Rotation bounds both per-file size (I/O and memory predictability) and
/// recovery granularity: a crash loses at most one in-flight chunk's
/// buffered entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Flush a stream's buffer once it holds this many entries.
    #[serde(default = "default_max_chunk_len")]
    pub max_chunk_len: usize,

    /// Flush a stream's buffer once its payloads total this many bytes.
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
}

fn default_max_chunk_len() -> usize {
    1000
}

fn default_max_chunk_bytes() -> usize {
    9_500_000
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chunk_len: default_max_chunk_len(),
            max_chunk_bytes: default_max_chunk_bytes(),
        }
    }
}

/// Configuration for the recording subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Root directory holding `raw/` chunks and `post/` derived products.
    pub root: PathBuf,

    /// Stream receiving a lifecycle entry on every start (payload = the new
    /// recording ID) and stop (empty payload).
    #[serde(default = "default_events_stream")]
    pub events_stream: String,

    /// KV key holding the current-recording pointer.
    #[serde(default = "default_pointer_key")]
    pub pointer_key: String,

    /// KV key namespace for cached recording stats.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Stats are only cached once a recording's last entry is at least this
    /// old; an active recording's stats are still changing.
    #[serde(default = "default_cache_staleness", with = "duration_secs")]
    pub cache_staleness: Duration,

    /// Streams with this suffix are calibration data and excluded from
    /// aggregate duration stats.
    #[serde(default = "default_calibration_suffix")]
    pub calibration_suffix: String,

    #[serde(default)]
    pub chunk: ChunkConfig,
}

fn default_events_stream() -> String {
    "recording:events".to_string()
}

fn default_pointer_key() -> String {
    "recording:id".to_string()
}

fn default_cache_prefix() -> String {
    "recording:info".to_string()
}

fn default_cache_staleness() -> Duration {
    Duration::from_secs(300)
}

fn default_calibration_suffix() -> String {
    "Cal".to_string()
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl RecordingConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            events_stream: default_events_stream(),
            pointer_key: default_pointer_key(),
            cache_prefix: default_cache_prefix(),
            cache_staleness: default_cache_staleness(),
            calibration_suffix: default_calibration_suffix(),
            chunk: ChunkConfig::default(),
        }
    }

    /// Root of raw chunk directories, one subdirectory per recording.
    pub fn raw_root(&self) -> PathBuf {
        self.root.join("raw")
    }

    /// Root of post-processed derivative directories, mirroring raw IDs.
    pub fn post_root(&self) -> PathBuf {
        self.root.join("post")
    }

    /// Resolve a recording ID under the raw root, refusing path escape.
    pub fn resolve_raw(&self, id: &str) -> Result<PathBuf> {
        Ok(self.raw_root().join(contained(id)?))
    }

    /// Resolve a recording ID under the post root, refusing path escape.
    pub fn resolve_post(&self, id: &str) -> Result<PathBuf> {
        Ok(self.post_root().join(contained(id)?))
    }

    /// KV key for one recording's cached stats blob.
    pub fn cache_key(&self, id: &str) -> String {
        format!("{}:{}", self.cache_prefix, id)
    }
}

/// Reject any recording ID whose resolved path would leave the root:
/// absolute paths, `..`, drive prefixes, or an empty ID. The check is
/// lexical and happens before any filesystem access.
fn contained(id: &str) -> Result<&str> {
    let escape = || RecordingError::PathEscape(id.to_string());
    if id.is_empty() {
        return Err(escape());
    }
    for component in Path::new(id).components() {
        match component {
            Component::Normal(_) => {}
            _ => return Err(escape()),
        }
    }
    Ok(id)
}

/// Configuration for [`crate::RecordingPlayer`].
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Skip pacing sleeps and inject as fast as the disk can be read.
    pub fullspeed: bool,
    /// Interval between progress snapshots.
    pub update_interval: Duration,
    /// Prefix prepended to each stream ID on re-injection, so replayed data
    /// lands in a distinguishable stream space.
    pub stream_prefix: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            fullspeed: false,
            update_interval: Duration::from_secs(1),
            stream_prefix: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_ids_are_refused() {
        let cfg = RecordingConfig::new("/data/recordings");
        for bad in ["../../etc", "/abs", "a/../../b", "..", ""] {
            assert!(
                matches!(cfg.resolve_raw(bad), Err(RecordingError::PathEscape(_))),
                "{bad:?} was not refused"
            );
        }
    }

    #[test]
    fn nested_ids_stay_contained() {
        let cfg = RecordingConfig::new("/data/recordings");
        let p = cfg.resolve_raw("2023.01.05-10.30.00").unwrap();
        assert!(p.starts_with("/data/recordings/raw"));
    }
}
