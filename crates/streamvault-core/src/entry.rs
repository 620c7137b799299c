//! Entry IDs, position tokens, and entry data structures.
//!
//! ## Entry IDs
//!
//! Every entry in a stream is addressed by an ASCII token of the form
//! `<milliseconds-since-epoch>-<sequence>`, e.g. `1700000000000-3`. The pair
//! `(ms, seq)` is totally ordered and the backing store guarantees IDs are
//! strictly increasing within one stream, so the token doubles as a
//! timestamp and as a cursor position.
//!
//! ## Position tokens
//!
//! Reads and writes also accept a handful of sentinels:
//!
//! - `*`: on read, "the most recent entries" (reverse scan); on write,
//!   "assign the next wall-clock-derived ID".
//! - `$`: "only entries arriving after now".
//! - `-` / `+`: open lower/upper range bounds.
//! - a bare number is shorthand for `<ms>-0`.
//!
//! All core logic operates on the canonical [`EntryId`] / [`Position`]
//! types; raw strings are parsed exactly once at the adapter boundary.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Canonical entry ID: `<ms>-<seq>`.
///
/// Ordering is lexicographic on `(ms, seq)`, which matches the numeric
/// ordering of the textual token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryId {
    /// Milliseconds since the Unix epoch.
    pub ms: u64,
    /// Disambiguates entries created in the same millisecond.
    pub seq: u64,
}

impl EntryId {
    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// Derive an ID from the current wall clock, sequence 0.
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self { ms, seq: 0 }
    }

    /// The smallest ID strictly greater than `self`.
    pub fn next(&self) -> Self {
        Self {
            ms: self.ms,
            seq: self.seq + 1,
        }
    }

    /// Milliseconds elapsed from `earlier` to `self` (zero if reversed).
    pub fn millis_since(&self, earlier: &EntryId) -> u64 {
        self.ms.saturating_sub(earlier.ms)
    }

    /// Render the timestamp half as an ISO 8601 string (space-separated),
    /// matching what stream stats report alongside the raw token.
    pub fn to_iso(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.ms as i64)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            .unwrap_or_else(|| self.to_string())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::InvalidPosition(s.to_string());
        match s.split_once('-') {
            Some((ms, seq)) => Ok(Self {
                ms: ms.parse().map_err(|_| bad())?,
                seq: seq.parse().map_err(|_| bad())?,
            }),
            // Bare numeric prefix: `1700000000000` == `1700000000000-0`.
            None => Ok(Self {
                ms: s.parse().map_err(|_| bad())?,
                seq: 0,
            }),
        }
    }
}

impl TryFrom<String> for EntryId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<EntryId> for String {
    fn from(id: EntryId) -> Self {
        id.to_string()
    }
}

/// A read/write position within a stream: a concrete ID or a sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    /// `*`: newest entries on read, store-assigned ID on write.
    Latest,
    /// `$`: only entries arriving after the moment this token is resolved.
    Now,
    /// `-`: the open lower bound.
    Min,
    /// `+`: the open upper bound.
    Max,
    /// A concrete entry ID.
    At(EntryId),
}

impl Position {
    /// The concrete ID, if this position is one.
    pub fn entry_id(&self) -> Option<EntryId> {
        match self {
            Position::At(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Latest => write!(f, "*"),
            Position::Now => write!(f, "$"),
            Position::Min => write!(f, "-"),
            Position::Max => write!(f, "+"),
            Position::At(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for Position {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "*" => Ok(Position::Latest),
            "$" => Ok(Position::Now),
            "-" => Ok(Position::Min),
            "+" => Ok(Position::Max),
            _ => Ok(Position::At(s.parse()?)),
        }
    }
}

impl From<EntryId> for Position {
    fn from(id: EntryId) -> Self {
        Position::At(id)
    }
}

/// One `(entry_id, payload)` pair within a stream.
///
/// Payloads are opaque `Bytes`; the store never inspects them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub payload: Bytes,
}

impl Entry {
    pub fn new(id: EntryId, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

/// All entries returned for one stream in a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntries {
    pub stream: String,
    pub entries: Vec<Entry>,
}

impl StreamEntries {
    pub fn new(stream: impl Into<String>, entries: Vec<Entry>) -> Self {
        Self {
            stream: stream.into(),
            entries,
        }
    }

    /// The largest entry ID in this batch, if any.
    pub fn last_id(&self) -> Option<EntryId> {
        self.entries.last().map(|e| e.id)
    }
}
