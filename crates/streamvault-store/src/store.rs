//! Stream-level operations over a backing log adapter.
//!
//! `StreamStore` is the single write/read path for live producers and
//! consumers, for the recorder, and for replay re-injection. It owns no
//! state of its own beyond its configuration; all durable state lives
//! behind the [`LogBackend`].
//!
//! ## Batched operations and partial failure
//!
//! Appends and stats are inherently multi-item, so adapter errors for one
//! stream never abort siblings in the same request: each result slot
//! independently carries a value or an error marker. Single-item calls
//! (trim, metadata) propagate errors to the caller unmodified.
//!
//! ## Read semantics
//!
//! A read request mixes two kinds of positions. Streams addressed with `*`
//! are served by a reverse scan ("the newest `count` entries", re-ordered
//! ascending); all other streams are served by one consolidated tail-read
//! with an optional block timeout. The two halves are issued concurrently
//! and merged back into the caller's stream order. Streams with nothing new
//! are dropped from the result.

use bytes::Bytes;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use streamvault_core::{selector::validate_stream_id, Entry, EntryId, Position, StreamEntries};
use tracing::debug;

use crate::backend::{AppendOp, BackendError, LogBackend};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

/// One entry to append: a target stream, an optional explicit ID (`None`
/// means store-assigned), and an opaque payload.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub stream: String,
    pub id: Option<EntryId>,
    pub payload: Bytes,
}

impl NewEntry {
    /// An entry with a store-assigned wall-clock ID.
    pub fn auto(stream: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            stream: stream.into(),
            id: None,
            payload: payload.into(),
        }
    }

    pub fn with_id(stream: impl Into<String>, id: EntryId, payload: impl Into<Bytes>) -> Self {
        Self {
            stream: stream.into(),
            id: Some(id),
            payload: payload.into(),
        }
    }
}

/// Stats for one stream, with any per-stream failure carried in `error`
/// rather than failing the whole stats call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamStats {
    pub stream: String,
    pub length: u64,
    pub first: Option<String>,
    pub last: Option<String>,
    pub first_time: Option<String>,
    pub last_time: Option<String>,
    pub meta: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Stream create/read/trim/delete plus metadata, over `Arc<dyn LogBackend>`.
///
/// Constructed explicitly at startup and shared by `Arc`; tests substitute
/// [`crate::MemoryBackend`] for the real service.
pub struct StreamStore {
    backend: Arc<dyn LogBackend>,
    config: StoreConfig,
}

impl StreamStore {
    pub fn new(backend: Arc<dyn LogBackend>, config: StoreConfig) -> Self {
        Self { backend, config }
    }

    /// The underlying adapter, for collaborators that need its KV surface
    /// (recording pointer, stats cache).
    pub fn backend(&self) -> &Arc<dyn LogBackend> {
        &self.backend
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Append all `entries` as one atomic batch.
    ///
    /// The outer `Result` fails only if the batch could not be submitted at
    /// all; each inner slot carries the assigned ID or that entry's error.
    /// Streams are created implicitly by their first append, and each is
    /// trimmed (approximately) to the configured default bound.
    pub async fn append(&self, entries: Vec<NewEntry>) -> Result<Vec<Result<EntryId>>> {
        let mut slots: Vec<Option<StoreError>> = Vec::with_capacity(entries.len());
        let mut ops = Vec::new();
        for entry in &entries {
            match validate_stream_id(&entry.stream) {
                Ok(()) => {
                    slots.push(None);
                    ops.push(AppendOp {
                        stream: entry.stream.clone(),
                        id: entry.id,
                        payload: entry.payload.clone(),
                        maxlen: self.config.default_maxlen,
                    });
                }
                Err(e) => slots.push(Some(e.into())),
            }
        }

        let mut appended = self.backend.append(ops).await?.into_iter();
        let mut results = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                Some(err) => results.push(Err(err)),
                None => {
                    let res = appended.next().ok_or_else(|| {
                        StoreError::Backend(BackendError::Other(
                            "backend returned fewer slots than submitted".into(),
                        ))
                    })?;
                    results.push(res.map_err(StoreError::from));
                }
            }
        }
        Ok(results)
    }

    /// Read across a stream set, preserving caller stream order. See the
    /// module docs for the `*` vs tail-read split; `block = None` returns
    /// immediately with whatever is available.
    pub async fn read(
        &self,
        selector: &[(String, Position)],
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<StreamEntries>> {
        let mut latest: Vec<&str> = Vec::new();
        let mut tail: Vec<(String, EntryId)> = Vec::new();
        for (sid, pos) in selector {
            match pos {
                Position::Latest => latest.push(sid),
                other => tail.push((sid.clone(), resolve_read_position(other))),
            }
        }

        // The reverse scans and the consolidated tail-read are two distinct
        // store operations, issued concurrently.
        let latest_fut = join_all(
            latest
                .iter()
                .map(|sid| self.backend.range_rev(sid, count)),
        );
        let tail_fut = async {
            if tail.is_empty() {
                Ok(Vec::new())
            } else {
                self.backend.read(&tail, count, block).await
            }
        };
        let (latest_res, tail_res) = tokio::join!(latest_fut, tail_fut);
        let tail_res = tail_res?;

        let mut by_stream: std::collections::HashMap<String, Vec<Entry>> =
            std::collections::HashMap::new();
        for (sid, res) in latest.iter().zip(latest_res) {
            let mut entries = res?;
            entries.reverse(); // newest-first scan back to ascending order
            by_stream.insert(sid.to_string(), entries);
        }
        for batch in tail_res {
            by_stream.insert(batch.stream, batch.entries);
        }

        Ok(selector
            .iter()
            .filter_map(|(sid, _)| {
                by_stream
                    .remove(sid)
                    .filter(|entries| !entries.is_empty())
                    .map(|entries| StreamEntries::new(sid.clone(), entries))
            })
            .collect())
    }

    pub async fn list_streams(&self) -> Result<Vec<String>> {
        Ok(self.backend.list_streams().await?)
    }

    /// Stats for `streams` (or every stream when `None`). Per-stream
    /// failures land in each slot's `error` field.
    pub async fn list_stream_info(&self, streams: Option<Vec<String>>) -> Result<Vec<StreamStats>> {
        let streams = match streams {
            Some(s) => s,
            None => self.list_streams().await?,
        };
        let lookups = streams.iter().map(|sid| async {
            let info = self.backend.stream_info(sid).await;
            let meta = self.backend.kv_get(&self.config.meta_key(sid)).await;
            (info, meta)
        });
        let results = join_all(lookups).await;

        Ok(streams
            .into_iter()
            .zip(results)
            .map(|(stream, (info, meta))| {
                let mut stats = StreamStats {
                    stream,
                    ..Default::default()
                };
                match info {
                    Ok(info) => {
                        stats.length = info.length;
                        stats.first = info.first.map(|id| id.to_string());
                        stats.last = info.last.map(|id| id.to_string());
                        stats.first_time = info.first.map(|id| id.to_iso());
                        stats.last_time = info.last.map(|id| id.to_iso());
                    }
                    Err(e) => stats.error = Some(e.to_string()),
                }
                match meta {
                    Ok(Some(raw)) => match serde_json::from_slice(&raw) {
                        Ok(value) => stats.meta = Some(value),
                        Err(e) => {
                            stats.error.get_or_insert_with(|| format!("bad metadata: {e}"));
                        }
                    },
                    Ok(None) => {}
                    Err(e) => {
                        stats.error.get_or_insert_with(|| e.to_string());
                    }
                }
                stats
            })
            .collect())
    }

    pub async fn stream_stats(&self, stream: &str) -> Result<StreamStats> {
        let mut info = self.list_stream_info(Some(vec![stream.to_string()])).await?;
        Ok(info.remove(0))
    }

    /// Attach a JSON metadata blob to a stream. With `update`, the new
    /// object is merged over the previous one; otherwise it replaces it.
    pub async fn set_metadata(
        &self,
        stream: &str,
        meta: serde_json::Value,
        update: bool,
    ) -> Result<()> {
        let key = self.config.meta_key(stream);
        let merged = if update {
            match self.backend.kv_get(&key).await? {
                Some(prev) => {
                    let mut prev: serde_json::Value = serde_json::from_slice(&prev)?;
                    merge_json(&mut prev, meta);
                    prev
                }
                None => meta,
            }
        } else {
            meta
        };
        self.backend
            .kv_set(&key, Bytes::from(serde_json::to_vec(&merged)?))
            .await?;
        Ok(())
    }

    pub async fn get_metadata(&self, stream: &str) -> Result<Option<serde_json::Value>> {
        match self.backend.kv_get(&self.config.meta_key(stream)).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn trim(&self, stream: &str, maxlen: u64, approximate: bool) -> Result<u64> {
        match self.backend.trim(stream, maxlen, approximate).await {
            Ok(n) => Ok(n),
            Err(BackendError::NotFound(s)) => Err(StoreError::NotFound(s)),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a `+`-joined set of streams as one unit, purging each
    /// stream's metadata with it.
    pub async fn delete(&self, selector: &str) -> Result<()> {
        let streams: Vec<String> = selector.split('+').map(str::to_string).collect();
        for sid in &streams {
            validate_stream_id(sid)?;
        }
        self.backend.delete_streams(&streams).await?;
        for sid in &streams {
            self.backend.kv_del(&self.config.meta_key(sid)).await?;
        }
        debug!(streams = ?streams, "deleted streams");
        Ok(())
    }
}

/// Map a non-`*` read position to the exclusive-start ID the adapter takes.
fn resolve_read_position(pos: &Position) -> EntryId {
    match pos {
        Position::At(id) => *id,
        Position::Now => EntryId::now(),
        Position::Min => EntryId::new(0, 0),
        Position::Max => EntryId::new(u64::MAX, u64::MAX),
        Position::Latest => unreachable!("latest positions use the reverse-scan path"),
    }
}

/// Shallow key merge: `over`'s keys win; non-object values replace wholesale.
fn merge_json(base: &mut serde_json::Value, over: serde_json::Value) {
    match (base, over) {
        (serde_json::Value::Object(base), serde_json::Value::Object(over)) => {
            for (k, v) in over {
                base.insert(k, v);
            }
        }
        (base, over) => *base = over,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use serde_json::json;

    fn store() -> StreamStore {
        StreamStore::new(Arc::new(MemoryBackend::default()), StoreConfig::default())
    }

    #[tokio::test]
    async fn metadata_merge_vs_replace() {
        let store = store();
        store
            .set_metadata("cam", json!({"fps": 30, "codec": "nv12"}), false)
            .await
            .unwrap();
        store
            .set_metadata("cam", json!({"fps": 60}), true)
            .await
            .unwrap();
        assert_eq!(
            store.get_metadata("cam").await.unwrap().unwrap(),
            json!({"fps": 60, "codec": "nv12"})
        );

        store
            .set_metadata("cam", json!({"only": 1}), false)
            .await
            .unwrap();
        assert_eq!(
            store.get_metadata("cam").await.unwrap().unwrap(),
            json!({"only": 1})
        );
    }

    #[tokio::test]
    async fn delete_purges_metadata() {
        let store = store();
        store
            .append(vec![NewEntry::auto("a", "1"), NewEntry::auto("b", "2")])
            .await
            .unwrap();
        store.set_metadata("a", json!({"k": 1}), false).await.unwrap();

        store.delete("a+b").await.unwrap();
        assert!(store.list_streams().await.unwrap().is_empty());
        assert!(store.get_metadata("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stats_report_per_stream_errors() {
        let store = store();
        store.append(vec![NewEntry::auto("ok", "x")]).await.unwrap();
        let stats = store
            .list_stream_info(Some(vec!["ok".into(), "missing".into()]))
            .await
            .unwrap();
        assert!(stats[0].error.is_none());
        assert_eq!(stats[0].length, 1);
        assert!(stats[0].last_time.is_some());
        assert!(stats[1].error.is_some());
    }

    #[tokio::test]
    async fn latest_read_returns_ascending_tail() {
        let store = store();
        let batch: Vec<_> = (0..5)
            .map(|i| NewEntry::with_id("s", EntryId::new(100 + i, 0), format!("p{i}")))
            .collect();
        store.append(batch).await.unwrap();

        let result = store
            .read(&[("s".into(), Position::Latest)], 3, None)
            .await
            .unwrap();
        let ids: Vec<u64> = result[0].entries.iter().map(|e| e.id.ms).collect();
        assert_eq!(ids, [102, 103, 104]);
    }
}
