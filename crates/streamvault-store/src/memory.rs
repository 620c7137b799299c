//! In-memory backing log.
//!
//! Implements the full [`LogBackend`] contract in-process: a map of ordered
//! entry queues plus a KV map, with a [`Notify`] to wake blocked tail-reads
//! when an append lands. Used by tests as the substitute backing adapter and
//! usable as-is for embedded single-process deployments.
//!
//! ## Approximate trimming
//!
//! Like the real log service, approximate trimming only evicts in blocks:
//! a stream is trimmed down to its bound only once it exceeds the bound by
//! [`MemoryBackendConfig::trim_granularity`] entries. A length query right
//! after appending therefore returns a count `>= maxlen` and
//! `<= maxlen + trim_granularity`. The granularity is configuration, not a
//! hard-coded constant.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use streamvault_core::{Entry, EntryId, StreamEntries};
use tokio::sync::Notify;
use tracing::debug;

use crate::backend::{AppendOp, BackendError, BackendInfo, BackendResult, LogBackend};

/// Configuration for [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct MemoryBackendConfig {
    /// Block size for approximate trims; streams may retain up to this many
    /// entries beyond their bound.
    pub trim_granularity: u64,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self {
            trim_granularity: 64,
        }
    }
}

#[derive(Default)]
struct Inner {
    streams: HashMap<String, VecDeque<Entry>>,
    kv: HashMap<String, Bytes>,
}

/// In-process [`LogBackend`] implementation.
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    notify: Notify,
    config: MemoryBackendConfig,
}

impl MemoryBackend {
    pub fn new(config: MemoryBackendConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            config,
        }
    }

    /// Gather entries strictly after each position, in caller stream order.
    /// Streams with nothing new contribute an empty batch.
    fn collect(inner: &Inner, positions: &[(String, EntryId)], count: usize) -> Vec<StreamEntries> {
        positions
            .iter()
            .map(|(sid, after)| {
                let entries = inner
                    .streams
                    .get(sid)
                    .map(|q| {
                        q.iter()
                            .filter(|e| e.id > *after)
                            .take(count)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                StreamEntries::new(sid.clone(), entries)
            })
            .collect()
    }

    fn insert(
        inner: &mut Inner,
        op: &AppendOp,
        trim_granularity: u64,
    ) -> BackendResult<EntryId> {
        if op.stream.is_empty() {
            return Err(BackendError::InvalidEntry("empty stream ID".into()));
        }
        let queue = inner.streams.entry(op.stream.clone()).or_default();
        let last = queue.back().map(|e| e.id);

        let id = match op.id {
            Some(id) => {
                if let Some(last) = last {
                    if id <= last {
                        return Err(BackendError::IdNotIncreasing {
                            stream: op.stream.clone(),
                            id,
                            last,
                        });
                    }
                }
                id
            }
            None => {
                // Wall-clock token, bumped past the last ID when the clock
                // has not advanced since the previous append.
                let mut id = EntryId::now();
                if let Some(last) = last {
                    if id <= last {
                        id = last.next();
                    }
                }
                id
            }
        };

        queue.push_back(Entry::new(id, op.payload.clone()));

        if let Some(maxlen) = op.maxlen {
            Self::trim_queue(queue, maxlen, true, trim_granularity);
        }
        Ok(id)
    }

    fn trim_queue(
        queue: &mut VecDeque<Entry>,
        maxlen: u64,
        approximate: bool,
        granularity: u64,
    ) -> u64 {
        let len = queue.len() as u64;
        let threshold = if approximate {
            maxlen.saturating_add(granularity)
        } else {
            maxlen
        };
        if len <= threshold {
            return 0;
        }
        let remove = len - maxlen;
        queue.drain(..remove as usize);
        remove
    }
}

#[async_trait]
impl LogBackend for MemoryBackend {
    async fn append(&self, batch: Vec<AppendOp>) -> BackendResult<Vec<BackendResult<EntryId>>> {
        let results = {
            let mut inner = self.inner.lock().unwrap();
            batch
                .iter()
                .map(|op| Self::insert(&mut inner, op, self.config.trim_granularity))
                .collect::<Vec<_>>()
        };
        // Wake every blocked tail-read; each re-checks its own positions.
        self.notify.notify_waiters();
        Ok(results)
    }

    async fn read(
        &self,
        positions: &[(String, EntryId)],
        count: usize,
        block: Option<Duration>,
    ) -> BackendResult<Vec<StreamEntries>> {
        let deadline = block.map(|d| tokio::time::Instant::now() + d);
        loop {
            // Register interest before inspecting state so an append between
            // the check and the wait is not missed.
            let notified = self.notify.notified();
            let result = {
                let inner = self.inner.lock().unwrap();
                Self::collect(&inner, positions, count)
            };
            if result.iter().any(|b| !b.entries.is_empty()) {
                return Ok(result);
            }
            let Some(deadline) = deadline else {
                return Ok(result);
            };
            if tokio::time::Instant::now() >= deadline {
                return Ok(result);
            }
            let _ = tokio::time::timeout_at(deadline, notified).await;
        }
    }

    async fn range_rev(&self, stream: &str, count: usize) -> BackendResult<Vec<Entry>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .streams
            .get(stream)
            .map(|q| q.iter().rev().take(count).cloned().collect())
            .unwrap_or_default())
    }

    async fn trim(&self, stream: &str, maxlen: u64, approximate: bool) -> BackendResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let queue = inner
            .streams
            .get_mut(stream)
            .ok_or_else(|| BackendError::NotFound(stream.to_string()))?;
        let removed = Self::trim_queue(queue, maxlen, approximate, self.config.trim_granularity);
        debug!(stream, maxlen, removed, "trimmed stream");
        Ok(removed)
    }

    async fn delete_streams(&self, streams: &[String]) -> BackendResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for sid in streams {
            inner.streams.remove(sid);
        }
        Ok(())
    }

    async fn list_streams(&self) -> BackendResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let mut streams: Vec<String> = inner.streams.keys().cloned().collect();
        streams.sort();
        Ok(streams)
    }

    async fn stream_info(&self, stream: &str) -> BackendResult<BackendInfo> {
        let inner = self.inner.lock().unwrap();
        let queue = inner
            .streams
            .get(stream)
            .ok_or_else(|| BackendError::NotFound(stream.to_string()))?;
        Ok(BackendInfo {
            length: queue.len() as u64,
            first: queue.front().map(|e| e.id),
            last: queue.back().map(|e| e.id),
        })
    }

    async fn kv_get(&self, key: &str) -> BackendResult<Option<Bytes>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.kv.get(key).cloned())
    }

    async fn kv_set(&self, key: &str, value: Bytes) -> BackendResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        inner.kv.insert(key.to_string(), value);
        Ok(true)
    }

    async fn kv_del(&self, key: &str) -> BackendResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.kv.remove(key).is_some())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(MemoryBackendConfig::default())
    }
}
