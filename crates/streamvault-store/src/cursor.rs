//! Multi-stream consumption cursor.
//!
//! A `MultiStreamCursor` owns one position per tracked stream and polls the
//! [`StreamStore`] for new data across the whole set. Two consumers reading
//! "the same" streams hold independent cursors; they never contend except
//! through the store's side-effect-free read path.
//!
//! ## Modes
//!
//! - **Tailing** prefers the newest data: each poll first tries a
//!   non-blocking reverse scan across all streams, keeping only entries
//!   newer than each position; when that yields nothing anywhere, it falls
//!   back to one blocking consolidated read. A slow consumer skips ahead
//!   instead of drowning in backlog.
//! - **CatchUp** never skips: every poll is the blocking consolidated
//!   read, returning the next consecutive unseen entries. This is the mode
//!   the recorder and replay ingestion use.
//!
//! ## Time synchronization
//!
//! With `time_sync` set to a reference stream, every tracked position is
//! forced to the position the reference reached after each poll, producing
//! a virtual single timeline: auxiliary sensor streams are throttled or
//! fast-forwarded to match a primary stream instead of drifting apart.
//! When the reference yields nothing in a poll, all positions are left
//! unchanged: there is no fresh reference point to align to. (That also
//! means a permanently stalled reference stalls the whole cursor; see
//! DESIGN.md.)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use streamvault_core::{EntryId, Position, StreamEntries};
use tracing::trace;

use crate::error::Result;
use crate::store::StreamStore;

/// Consumption policy for [`MultiStreamCursor::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    /// Prefer the newest available data, blocking only when nothing newer
    /// exists.
    Tailing,
    /// Always return the next consecutive unseen data.
    CatchUp,
}

/// Configuration for a cursor.
#[derive(Debug, Clone)]
pub struct CursorConfig {
    pub mode: CursorMode,
    /// Max entries returned per stream per poll.
    pub count: usize,
    /// Timeout for the blocking consolidated read. A bounded timeout keeps
    /// polls returning control so callers can observe cancellation between
    /// them.
    pub block: Duration,
    /// Reference stream for cross-stream time synchronization.
    pub time_sync: Option<String>,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            mode: CursorMode::Tailing,
            count: 16,
            block: Duration::from_secs(10),
            time_sync: None,
        }
    }
}

/// Per-consumer position map over an arbitrary stream set.
pub struct MultiStreamCursor {
    store: Arc<StreamStore>,
    /// Tracked streams in caller order.
    order: Vec<String>,
    positions: HashMap<String, Position>,
    config: CursorConfig,
}

impl MultiStreamCursor {
    /// Create a cursor from a parsed selector.
    ///
    /// `$` tokens are resolved to the current wall-clock token here, once:
    /// "start from now" is fixed at the moment the cursor is created, not
    /// re-evaluated per poll.
    pub fn new(
        store: Arc<StreamStore>,
        selector: Vec<(String, Position)>,
        config: CursorConfig,
    ) -> Self {
        let now = EntryId::now();
        let mut order = Vec::with_capacity(selector.len());
        let mut positions = HashMap::with_capacity(selector.len());
        for (sid, pos) in selector {
            let pos = match pos {
                Position::Now => Position::At(now),
                other => other,
            };
            order.push(sid.clone());
            positions.insert(sid, pos);
        }
        Self {
            store,
            order,
            positions,
            config,
        }
    }

    /// Current position of one tracked stream.
    pub fn position(&self, stream: &str) -> Option<Position> {
        self.positions.get(stream).copied()
    }

    /// Poll for new entries across the tracked set. Returns only streams
    /// that produced data; an empty result means the blocking read timed
    /// out, giving the caller a checkpoint for cancellation/backpressure.
    pub async fn next(&mut self) -> Result<Vec<StreamEntries>> {
        let batches = match self.config.mode {
            CursorMode::Tailing => {
                let newest = self.poll_latest().await?;
                if newest.is_empty() {
                    self.poll_blocking().await?
                } else {
                    newest
                }
            }
            CursorMode::CatchUp => self.poll_blocking().await?,
        };
        self.advance(&batches);
        Ok(batches)
    }

    /// Non-blocking "newest first" pass: reverse-scan every stream and keep
    /// entries newer than its position.
    async fn poll_latest(&self) -> Result<Vec<StreamEntries>> {
        let selector: Vec<(String, Position)> = self
            .order
            .iter()
            .map(|sid| (sid.clone(), Position::Latest))
            .collect();
        let batches = self.store.read(&selector, self.config.count, None).await?;

        Ok(batches
            .into_iter()
            .filter_map(|mut batch| {
                if let Some(Position::At(after)) = self.positions.get(&batch.stream) {
                    batch.entries.retain(|e| e.id > *after);
                }
                (!batch.entries.is_empty()).then_some(batch)
            })
            .collect())
    }

    /// Blocking consolidated read from the exact per-stream positions.
    async fn poll_blocking(&self) -> Result<Vec<StreamEntries>> {
        let selector: Vec<(String, Position)> = self
            .order
            .iter()
            .map(|sid| {
                let pos = match self.positions.get(sid) {
                    // A stream still at `*` has never produced data for this
                    // cursor; read it from the beginning.
                    Some(Position::Latest) | None => Position::Min,
                    Some(pos) => *pos,
                };
                (sid.clone(), pos)
            })
            .collect();
        self.store
            .read(&selector, self.config.count, Some(self.config.block))
            .await
    }

    /// Advance positions after a poll. Positions only ever move forward,
    /// except under time sync where every stream snaps to the reference
    /// stream's position.
    fn advance(&mut self, batches: &[StreamEntries]) {
        if let Some(reference) = self.config.time_sync.clone() {
            let reference_pos = batches
                .iter()
                .find(|b| b.stream == reference)
                .and_then(|b| b.last_id());
            match reference_pos {
                Some(t) => {
                    trace!(reference = %reference, position = %t, "time-sync snap");
                    for sid in &self.order {
                        self.positions.insert(sid.clone(), Position::At(t));
                    }
                }
                // No fresh reference point: leave every position unchanged.
                None => {}
            }
            return;
        }

        for batch in batches {
            let Some(last) = batch.last_id() else { continue };
            let pos = self.positions.entry(batch.stream.clone()).or_insert(Position::Min);
            let advanced = match pos {
                Position::At(cur) => *cur < last,
                _ => true,
            };
            if advanced {
                *pos = Position::At(last);
            }
        }
    }
}
