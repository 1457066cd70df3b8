//! Core types and the command contract every backing store implements.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::error::Error;

/// Activity time in unix seconds. Used as the applause score.
pub type Timestamp = i64;

/// Store-assigned identifier of a stream entry.
///
/// Ordered by milliseconds first, then by sequence number, the way Redis
/// stream IDs are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntryId {
    pub ms: u64,
    pub seq: u64,
}

impl EntryId {
    /// The smallest possible ID. Reading after it yields the first entry.
    pub const ZERO: EntryId = EntryId { ms: 0, seq: 0 };

    #[must_use]
    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::Protocol(format!("invalid stream entry id: {s:?}"));

        let (ms, seq) = s.split_once('-').ok_or_else(invalid)?;
        Ok(Self {
            ms: ms.parse().map_err(|_| invalid())?,
            seq: seq.parse().map_err(|_| invalid())?,
        })
    }
}

/// One entry read from the notification stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: EntryId,
    pub payload: Vec<u8>,
}

/// Commands the notification and applause protocol needs from its store.
///
/// Implementations are shared behind an `Arc` by every component. Each call
/// acquires whatever connection it needs and releases it before returning,
/// except for blocking reads, which run on a connection owned by the reader.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Connection dedicated to one reader's blocking reads.
    type Blocking: Send + 'static;

    /// Lightweight liveness probe.
    async fn ping(&self) -> crate::Result<()>;

    /// Append a payload to a stream and return the assigned ID.
    async fn append(&self, stream: &str, payload: &[u8]) -> crate::Result<EntryId>;

    /// ID of the newest entry in a stream, or `None` if the stream is empty.
    async fn last_entry_id(&self, stream: &str) -> crate::Result<Option<EntryId>>;

    /// Open a connection for blocking reads that is not shared with anyone.
    async fn blocking_connection(&self) -> crate::Result<Self::Blocking>;

    /// Block without timeout until an entry newer than `after` exists and
    /// return exactly that one entry.
    async fn read_next(
        &self,
        conn: &mut Self::Blocking,
        stream: &str,
        after: EntryId,
    ) -> crate::Result<StreamEntry>;

    /// Insert a member into a scored set or overwrite its score.
    async fn upsert_scored(&self, set: &str, score: Timestamp, member: &str) -> crate::Result<()>;

    /// Members with `score >= min`.
    async fn range_by_score(&self, set: &str, min: Timestamp) -> crate::Result<Vec<String>>;

    /// Remove members with `score <= max` and return how many were removed.
    async fn remove_range_by_score(&self, set: &str, max: Timestamp) -> crate::Result<u64>;
}
