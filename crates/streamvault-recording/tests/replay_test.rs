//! Replay integration tests
//!
//! Pacing fidelity, full-speed mode, progress reporting, observer
//! disconnect, and cooperative cancellation. Pacing is asserted against the
//! tokio clock through a backend wrapper that timestamps every append, so
//! the paced tests run under `start_paused` instead of real wall time.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use streamvault_core::{Entry, EntryId, StreamEntries};
use streamvault_recording::{
    chunk, Disconnected, PlayerConfig, PlayerState, ProgressSink, ProgressSnapshot,
    RecordingConfig, RecordingError, RecordingPlayer,
};
use streamvault_store::backend::BackendResult;
use streamvault_store::{
    AppendOp, BackendInfo, LogBackend, MemoryBackend, MemoryBackendConfig, StoreConfig,
    StreamStore,
};
use tokio::time::Instant;

/// Delegates to [`MemoryBackend`], timestamping every appended entry with
/// the tokio clock.
struct TimedBackend {
    inner: MemoryBackend,
    appends: Mutex<Vec<(String, Instant)>>,
}

impl TimedBackend {
    fn new() -> Self {
        Self {
            inner: MemoryBackend::new(MemoryBackendConfig::default()),
            appends: Mutex::new(Vec::new()),
        }
    }

    fn times_for(&self, stream: &str) -> Vec<Instant> {
        self.appends
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == stream)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl LogBackend for TimedBackend {
    async fn append(&self, batch: Vec<AppendOp>) -> BackendResult<Vec<BackendResult<EntryId>>> {
        {
            let now = Instant::now();
            let mut appends = self.appends.lock().unwrap();
            for op in &batch {
                appends.push((op.stream.clone(), now));
            }
        }
        self.inner.append(batch).await
    }

    async fn read(
        &self,
        positions: &[(String, EntryId)],
        count: usize,
        block: Option<Duration>,
    ) -> BackendResult<Vec<StreamEntries>> {
        self.inner.read(positions, count, block).await
    }

    async fn range_rev(&self, stream: &str, count: usize) -> BackendResult<Vec<Entry>> {
        self.inner.range_rev(stream, count).await
    }

    async fn trim(&self, stream: &str, maxlen: u64, approximate: bool) -> BackendResult<u64> {
        self.inner.trim(stream, maxlen, approximate).await
    }

    async fn delete_streams(&self, streams: &[String]) -> BackendResult<()> {
        self.inner.delete_streams(streams).await
    }

    async fn list_streams(&self) -> BackendResult<Vec<String>> {
        self.inner.list_streams().await
    }

    async fn stream_info(&self, stream: &str) -> BackendResult<BackendInfo> {
        self.inner.stream_info(stream).await
    }

    async fn kv_get(&self, key: &str) -> BackendResult<Option<Bytes>> {
        self.inner.kv_get(key).await
    }

    async fn kv_set(&self, key: &str, value: Bytes) -> BackendResult<bool> {
        self.inner.kv_set(key, value).await
    }

    async fn kv_del(&self, key: &str) -> BackendResult<bool> {
        self.inner.kv_del(key).await
    }
}

/// Collects every snapshot it is sent.
#[derive(Default)]
struct CollectingSink {
    snapshots: Mutex<Vec<ProgressSnapshot>>,
}

#[async_trait]
impl ProgressSink for CollectingSink {
    async fn send(&self, snapshot: ProgressSnapshot) -> Result<(), Disconnected> {
        self.snapshots.lock().unwrap().push(snapshot);
        Ok(())
    }
}

/// Pretends the observer has already gone away.
struct GoneSink;

#[async_trait]
impl ProgressSink for GoneSink {
    async fn send(&self, _snapshot: ProgressSnapshot) -> Result<(), Disconnected> {
        Err(Disconnected)
    }
}

async fn write_recording(root: &std::path::Path, stream: &str, at_ms: &[u64]) {
    let entries: Vec<Entry> = at_ms
        .iter()
        .map(|ms| Entry::new(EntryId::new(*ms, 0), format!("frame-{ms}").into_bytes()))
        .collect();
    chunk::write_chunk(&root.join("raw/rec").join(stream), &entries)
        .await
        .unwrap();
}

fn opts(fullspeed: bool, update_interval: Duration) -> PlayerConfig {
    PlayerConfig {
        fullspeed,
        update_interval,
        stream_prefix: "replay:".to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn paced_replay_preserves_inter_arrival_gaps() {
    let root = tempfile::tempdir().unwrap();
    write_recording(root.path(), "cam", &[1000, 1100, 1350]).await;

    let backend = Arc::new(TimedBackend::new());
    let store = Arc::new(StreamStore::new(backend.clone(), StoreConfig::default()));
    let sink = Arc::new(CollectingSink::default());
    let player = RecordingPlayer::new();

    player
        .replay(
            store,
            &RecordingConfig::new(root.path()),
            "rec",
            vec!["cam".to_string()],
            opts(false, Duration::from_secs(1)),
            sink.clone(),
        )
        .await
        .unwrap();

    let times = backend.times_for("replay:cam");
    assert_eq!(times.len(), 3);
    assert!(times[1] - times[0] >= Duration::from_millis(100));
    assert!(times[2] - times[1] >= Duration::from_millis(250));

    let snapshots = sink.snapshots.lock().unwrap();
    let last = snapshots.last().unwrap();
    assert!(last.active.is_empty());
    assert_eq!(last.offsets_ms["cam"], 350);
    assert_eq!(last.durations_ms["cam"], 350);
    let injected: u64 = snapshots
        .iter()
        .flat_map(|s| &s.updates)
        .filter(|(s, _)| s == "cam")
        .map(|(_, n)| n)
        .sum();
    assert_eq!(injected, 3);
    assert_eq!(player.state(), PlayerState::Done);
}

#[tokio::test]
async fn fullspeed_skips_pacing() {
    let root = tempfile::tempdir().unwrap();
    // A minute of recorded time; full speed must not take anywhere near it.
    write_recording(root.path(), "cam", &[1000, 31_000, 61_000]).await;

    let backend = Arc::new(TimedBackend::new());
    let store = Arc::new(StreamStore::new(backend.clone(), StoreConfig::default()));
    let player = RecordingPlayer::new();

    tokio::time::timeout(
        Duration::from_secs(10),
        player.replay(
            store.clone(),
            &RecordingConfig::new(root.path()),
            "rec",
            vec!["cam".to_string()],
            opts(true, Duration::from_millis(50)),
            Arc::new(CollectingSink::default()),
        ),
    )
    .await
    .expect("fullspeed replay stalled")
    .unwrap();

    assert_eq!(store.stream_stats("replay:cam").await.unwrap().length, 3);
}

#[tokio::test]
async fn observer_disconnect_ends_the_replay() {
    let root = tempfile::tempdir().unwrap();
    write_recording(root.path(), "cam", &[1000, 61_000]).await;

    let backend = Arc::new(TimedBackend::new());
    let store = Arc::new(StreamStore::new(backend.clone(), StoreConfig::default()));
    let player = RecordingPlayer::new();

    // Normal-speed pacing would take a minute; the disconnect at the first
    // progress tick must cut it short.
    tokio::time::timeout(
        Duration::from_secs(10),
        player.replay(
            store.clone(),
            &RecordingConfig::new(root.path()),
            "rec",
            vec!["cam".to_string()],
            opts(false, Duration::from_millis(10)),
            Arc::new(GoneSink),
        ),
    )
    .await
    .expect("disconnect did not stop the replay")
    .unwrap();

    assert_eq!(store.stream_stats("replay:cam").await.unwrap().length, 1);
    assert_eq!(player.state(), PlayerState::Done);
}

#[tokio::test(start_paused = true)]
async fn stop_signal_cancels_between_entries() {
    let root = tempfile::tempdir().unwrap();
    write_recording(root.path(), "cam", &[1000, 61_000]).await;

    let backend = Arc::new(TimedBackend::new());
    let store = Arc::new(StreamStore::new(backend.clone(), StoreConfig::default()));
    let player = Arc::new(RecordingPlayer::new());
    let stop = player.stop_signal();

    let task = {
        let player = player.clone();
        let store = store.clone();
        let root = root.path().to_path_buf();
        tokio::spawn(async move {
            player
                .replay(
                    store,
                    &RecordingConfig::new(root),
                    "rec",
                    vec!["cam".to_string()],
                    opts(false, Duration::from_secs(1)),
                    Arc::new(CollectingSink::default()),
                )
                .await
        })
    };

    // Wait for the first entry to land, then cancel mid-pacing-sleep.
    while store.stream_stats("replay:cam").await.unwrap().length == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    stop.set();
    task.await.unwrap().unwrap();

    assert_eq!(store.stream_stats("replay:cam").await.unwrap().length, 1);
    assert_eq!(player.state(), PlayerState::Done);
}

#[tokio::test]
async fn unknown_recording_is_refused() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(StreamStore::new(
        Arc::new(MemoryBackend::new(MemoryBackendConfig::default())),
        StoreConfig::default(),
    ));
    let player = RecordingPlayer::new();
    let result = player
        .replay(
            store,
            &RecordingConfig::new(root.path()),
            "missing",
            vec!["cam".to_string()],
            opts(true, Duration::from_millis(10)),
            Arc::new(CollectingSink::default()),
        )
        .await;
    assert!(matches!(result, Err(RecordingError::NotFound(_))));
    assert_eq!(player.state(), PlayerState::Done);
}

#[tokio::test]
async fn a_player_replays_once() {
    let root = tempfile::tempdir().unwrap();
    write_recording(root.path(), "cam", &[1000]).await;

    let store = Arc::new(StreamStore::new(
        Arc::new(MemoryBackend::new(MemoryBackendConfig::default())),
        StoreConfig::default(),
    ));
    let player = RecordingPlayer::new();
    let config = RecordingConfig::new(root.path());
    let opts = opts(true, Duration::from_millis(10));

    player
        .replay(
            store.clone(),
            &config,
            "rec",
            vec!["cam".to_string()],
            opts.clone(),
            Arc::new(CollectingSink::default()),
        )
        .await
        .unwrap();
    let again = player
        .replay(
            store,
            &config,
            "rec",
            vec!["cam".to_string()],
            opts,
            Arc::new(CollectingSink::default()),
        )
        .await;
    assert!(matches!(again, Err(RecordingError::PlayerDone)));
}
