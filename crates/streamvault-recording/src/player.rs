//! Recording player: paced replay back into the live stream space.
//!
//! Replay reads each selected stream's chunks in time order and re-injects
//! the entries through the ordinary append path with store-assigned IDs, so
//! replayed data never collides with live data occupying the historical ID
//! range. One task runs per replayed stream plus one progress task; all of
//! them share a single [`StopSignal`].
//!
//! ## Pacing
//!
//! Unless full speed is requested, the player compares the original
//! inter-arrival delta of consecutive entries against the wall time already
//! spent and sleeps the (clamped-to-nonnegative) difference before each
//! injection, reconstructing the original cadence regardless of disk speed.
//! The sleep is a done-interruptible wait, so cancellation is observed
//! between entries and after each wait — never mid-sleep for longer than
//! the signal takes to arrive.
//!
//! ## Progress and termination
//!
//! Every `update_interval` the progress task emits a snapshot (per-stream
//! update counts since the last snapshot, the active stream set, per-stream
//! total durations and current playback offsets) through a [`ProgressSink`]
//! and resets the counters; one final snapshot is emitted at termination.
//! An observer disconnect is a normal terminating condition, not an error:
//! it raises the stop signal so sibling stream tasks stop promptly instead
//! of replaying data nobody observes. A failed chunk read or append aborts
//! only that stream's task; siblings continue.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use streamvault_core::EntryId;
use streamvault_store::{NewEntry, StreamStore};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::chunk;
use crate::config::{PlayerConfig, RecordingConfig};
use crate::error::{RecordingError, Result};
use crate::signal::StopSignal;

/// The progress observer went away.
#[derive(Debug, Error)]
#[error("progress observer disconnected")]
pub struct Disconnected;

/// One progress report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// Per-stream entries injected since the previous snapshot.
    pub updates: Vec<(String, u64)>,
    /// Streams still replaying.
    pub active: Vec<String>,
    /// Per-stream total recorded duration, milliseconds.
    pub durations_ms: HashMap<String, u64>,
    /// Per-stream current playback offset from recording start, milliseconds.
    pub offsets_ms: HashMap<String, u64>,
}

/// Observer for replay progress (a WebSocket, a log, a test collector).
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn send(&self, snapshot: ProgressSnapshot) -> std::result::Result<(), Disconnected>;
}

/// Replay lifecycle: `Idle → Active → Done`; `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Active,
    Done,
}

struct Shared {
    stop: StopSignal,
    active: Mutex<HashSet<String>>,
    counters: Mutex<HashMap<String, u64>>,
    offsets: Mutex<HashMap<String, u64>>,
    durations: HashMap<String, u64>,
}

impl Shared {
    fn record_update(&self, stream: &str, offset_ms: u64) {
        *self
            .counters
            .lock()
            .unwrap()
            .entry(stream.to_string())
            .or_default() += 1;
        self.offsets
            .lock()
            .unwrap()
            .insert(stream.to_string(), offset_ms);
    }

    fn set_inactive(&self, stream: &str) {
        self.active.lock().unwrap().remove(stream);
    }

    fn active_is_empty(&self) -> bool {
        self.active.lock().unwrap().is_empty()
    }

    /// Build a snapshot and reset the update counters.
    fn take_snapshot(&self) -> ProgressSnapshot {
        let mut counters = self.counters.lock().unwrap();
        let mut updates: Vec<(String, u64)> = counters.drain().collect();
        updates.sort();
        let mut active: Vec<String> = self.active.lock().unwrap().iter().cloned().collect();
        active.sort();
        ProgressSnapshot {
            updates,
            active,
            durations_ms: self.durations.clone(),
            offsets_ms: self.offsets.lock().unwrap().clone(),
        }
    }
}

/// Replays one recording; single use (`Done` is terminal).
pub struct RecordingPlayer {
    stop: StopSignal,
    state: Mutex<PlayerState>,
}

impl RecordingPlayer {
    pub fn new() -> Self {
        Self {
            stop: StopSignal::new(),
            state: Mutex::new(PlayerState::Idle),
        }
    }

    /// The shared done signal; external disconnect handlers raise it to end
    /// the replay early.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn state(&self) -> PlayerState {
        *self.state.lock().unwrap()
    }

    /// Replay `streams` of `recording` against the live store, reporting
    /// progress through `sink`. Resolves when every stream finishes or the
    /// stop signal is raised.
    pub async fn replay(
        &self,
        store: Arc<StreamStore>,
        config: &RecordingConfig,
        recording: &str,
        streams: Vec<String>,
        opts: PlayerConfig,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != PlayerState::Idle {
                return Err(RecordingError::PlayerDone);
            }
            *state = PlayerState::Active;
        }

        let dir = config.resolve_raw(recording)?;
        if !dir.is_dir() {
            *self.state.lock().unwrap() = PlayerState::Done;
            return Err(RecordingError::NotFound(recording.to_string()));
        }

        let mut durations = HashMap::new();
        for sid in &streams {
            durations.insert(sid.clone(), stream_duration_ms(&dir.join(sid)).await?);
        }

        let shared = Arc::new(Shared {
            stop: self.stop.clone(),
            active: Mutex::new(streams.iter().cloned().collect()),
            counters: Mutex::new(HashMap::new()),
            offsets: Mutex::new(HashMap::new()),
            durations,
        });

        info!(recording, streams = ?streams, fullspeed = opts.fullspeed, "replay started");

        let mut tasks = Vec::new();
        for sid in &streams {
            let shared = shared.clone();
            let store = store.clone();
            let stream_dir = dir.join(sid);
            let sid = sid.clone();
            let target = format!("{}{}", opts.stream_prefix, sid);
            let fullspeed = opts.fullspeed;
            tasks.push(tokio::spawn(async move {
                if let Err(e) =
                    replay_stream(store, stream_dir, &sid, &target, fullspeed, &shared).await
                {
                    // Abort only this stream; siblings keep replaying.
                    warn!(stream = %sid, error = %e, "stream replay aborted");
                }
                shared.set_inactive(&sid);
            }));
        }
        tasks.push(tokio::spawn(progress_loop(
            shared.clone(),
            sink,
            opts.update_interval,
        )));

        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "replay task panicked");
            }
        }

        *self.state.lock().unwrap() = PlayerState::Done;
        info!(recording, "replay finished");
        Ok(())
    }
}

impl Default for RecordingPlayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Replay one stream's chunks in order, pacing each entry against the
/// original inter-arrival delta.
async fn replay_stream(
    store: Arc<StreamStore>,
    dir: PathBuf,
    stream: &str,
    target: &str,
    fullspeed: bool,
    shared: &Shared,
) -> Result<()> {
    let files = chunk::list_chunks(&dir).await?;
    let start = match files.first() {
        Some(path) => chunk::parse_chunk_name(path)?.0,
        None => return Ok(()),
    };

    // (original ID, wall instant) of the previously injected entry.
    let mut last: Option<(EntryId, Instant)> = None;
    for path in files {
        for entry in chunk::read_chunk(&path).await? {
            let wait = match (&last, fullspeed) {
                (Some((orig, at)), false) => {
                    Duration::from_millis(entry.id.millis_since(orig)).saturating_sub(at.elapsed())
                }
                _ => Duration::ZERO,
            };
            if shared.stop.wait_timeout(wait).await {
                debug!(stream, "replay cancelled");
                return Ok(());
            }
            last = Some((entry.id, Instant::now()));

            let offset_ms = entry.id.millis_since(&start);
            let results = store
                .append(vec![NewEntry::auto(target, entry.payload)])
                .await?;
            if let Some(result) = results.into_iter().next() {
                result?;
            }
            shared.record_update(stream, offset_ms);
        }
    }
    Ok(())
}

/// Emit a snapshot every `interval` until the replay ends or the observer
/// disconnects, then one final snapshot.
async fn progress_loop(shared: Arc<Shared>, sink: Arc<dyn ProgressSink>, interval: Duration) {
    loop {
        if shared.stop.wait_timeout(interval).await {
            break;
        }
        if sink.send(shared.take_snapshot()).await.is_err() {
            // Observer went away: normal termination, stop the siblings.
            debug!("progress observer disconnected");
            break;
        }
        if shared.active_is_empty() {
            break;
        }
    }
    let _ = sink.send(shared.take_snapshot()).await;
    shared.stop.set();
}

/// Total recorded duration of one stream, from its chunk filenames.
async fn stream_duration_ms(dir: &Path) -> Result<u64> {
    let files = chunk::list_chunks(dir).await?;
    match (files.first(), files.last()) {
        (Some(first), Some(last)) => {
            let (start, _) = chunk::parse_chunk_name(first)?;
            let (_, end) = chunk::parse_chunk_name(last)?;
            Ok(end.millis_since(&start))
        }
        _ => Ok(0),
    }
}
