//! In-memory Store implementation for testing.
//!
//! Keeps streams and scored sets in process memory with the same semantics
//! the Redis store provides. Useful for tests and development without a
//! running Redis.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, watch};

use crate::error::{Error, Result};
use crate::traits::{EntryId, Store, StreamEntry, Timestamp};

#[derive(Default)]
struct Stream {
    entries: Vec<StreamEntry>,
}

impl Stream {
    fn first_after(&self, after: EntryId) -> Option<&StreamEntry> {
        let idx = self.entries.partition_point(|e| e.id <= after);
        self.entries.get(idx)
    }
}

/// In-memory implementation of [`Store`].
pub struct InMemoryStore {
    /// Streams by key.
    streams: RwLock<HashMap<String, Stream>>,
    /// Scored sets by key, member to score.
    sets: RwLock<HashMap<String, HashMap<String, Timestamp>>>,
    /// Bumped on every append to wake blocking readers.
    appended: watch::Sender<u64>,
    /// When false every command fails with a connection error.
    reachable: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            sets: RwLock::new(HashMap::new()),
            appended: watch::Sender::new(0),
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate the store going away or coming back.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of entries in a stream.
    pub async fn stream_len(&self, stream: &str) -> usize {
        self.streams
            .read()
            .await
            .get(stream)
            .map_or(0, |s| s.entries.len())
    }

    /// Score of a member, if present.
    pub async fn score(&self, set: &str, member: &str) -> Option<Timestamp> {
        self.sets.read().await.get(set)?.get(member).copied()
    }

    /// Number of members in a scored set.
    pub async fn set_len(&self, set: &str) -> usize {
        self.sets.read().await.get(set).map_or(0, HashMap::len)
    }

    /// Readers currently parked in a blocking read.
    #[must_use]
    pub fn blocked_readers(&self) -> usize {
        self.appended.receiver_count()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Connection("in-memory store is unreachable".to_string()))
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Next Redis-style ID: the wall clock in milliseconds, or the previous ID
/// with a bumped sequence if the clock has not moved past it.
fn next_id(last: Option<EntryId>) -> EntryId {
    let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
    match last {
        Some(last) if last.ms >= now => EntryId::new(last.ms, last.seq + 1),
        _ => EntryId::new(now, 0),
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Blocking = ();

    async fn ping(&self) -> Result<()> {
        self.check_reachable()
    }

    async fn append(&self, stream: &str, payload: &[u8]) -> Result<EntryId> {
        self.check_reachable()?;

        let id = {
            let mut streams = self.streams.write().await;
            let stream = streams.entry(stream.to_string()).or_default();
            let id = next_id(stream.entries.last().map(|e| e.id));
            stream.entries.push(StreamEntry {
                id,
                payload: payload.to_vec(),
            });
            id
        };

        self.appended.send_modify(|n| *n += 1);
        Ok(id)
    }

    async fn last_entry_id(&self, stream: &str) -> Result<Option<EntryId>> {
        self.check_reachable()?;
        Ok(self
            .streams
            .read()
            .await
            .get(stream)
            .and_then(|s| s.entries.last())
            .map(|e| e.id))
    }

    async fn blocking_connection(&self) -> Result<()> {
        self.check_reachable()
    }

    async fn read_next(
        &self,
        _conn: &mut (),
        stream: &str,
        after: EntryId,
    ) -> Result<StreamEntry> {
        // Subscribe before looking so an append in between still wakes us.
        let mut appended = self.appended.subscribe();

        loop {
            self.check_reachable()?;

            if let Some(entry) = self
                .streams
                .read()
                .await
                .get(stream)
                .and_then(|s| s.first_after(after))
            {
                return Ok(entry.clone());
            }

            appended
                .changed()
                .await
                .map_err(|_| Error::Connection("in-memory store was dropped".to_string()))?;
        }
    }

    async fn upsert_scored(&self, set: &str, score: Timestamp, member: &str) -> Result<()> {
        self.check_reachable()?;
        self.sets
            .write()
            .await
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn range_by_score(&self, set: &str, min: Timestamp) -> Result<Vec<String>> {
        self.check_reachable()?;

        let sets = self.sets.read().await;
        let Some(members) = sets.get(set) else {
            return Ok(Vec::new());
        };

        let mut matching: Vec<(&String, Timestamp)> = members
            .iter()
            .filter(|(_, score)| **score >= min)
            .map(|(member, score)| (member, *score))
            .collect();
        matching.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));

        Ok(matching.into_iter().map(|(m, _)| m.clone()).collect())
    }

    async fn remove_range_by_score(&self, set: &str, max: Timestamp) -> Result<u64> {
        self.check_reachable()?;

        let mut sets = self.sets.write().await;
        let Some(members) = sets.get_mut(set) else {
            return Ok(0);
        };

        let before = members.len();
        members.retain(|_, score| *score > max);
        Ok((before - members.len()) as u64)
    }
}
