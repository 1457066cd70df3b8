//! Redis-backed implementation of [`Store`].
//!
//! Notifications live in a Redis stream, one field per entry holding the raw
//! payload. Applause lives in a sorted set whose members are the encoded
//! `parent-member` keys and whose scores are unix seconds.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamRangeReply, StreamReadReply};
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::pool::ConnectionManager;
use crate::traits::{EntryId, Store, StreamEntry, Timestamp};

/// Stream field that carries the payload.
const PAYLOAD_FIELD: &str = "content";

/// Redis implementation of the store contract.
#[derive(Clone)]
pub struct RedisStore {
    connections: ConnectionManager,
}

impl RedisStore {
    /// Create a store on top of a fresh connection pool.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        Ok(Self {
            connections: ConnectionManager::new(config)?,
        })
    }

    /// The underlying connection pool.
    #[must_use]
    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }
}

fn parse_entry(stream: &str, entry: StreamId) -> Result<StreamEntry> {
    let id: EntryId = entry.id.parse()?;
    let payload: Vec<u8> = entry.get(PAYLOAD_FIELD).ok_or_else(|| {
        Error::Protocol(format!(
            "entry {id} in stream {stream} has no {PAYLOAD_FIELD:?} field"
        ))
    })?;
    Ok(StreamEntry { id, payload })
}

#[async_trait]
impl Store for RedisStore {
    type Blocking = MultiplexedConnection;

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connections.acquire().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }

    async fn append(&self, stream: &str, payload: &[u8]) -> Result<EntryId> {
        let mut conn = self.connections.acquire().await?;
        let id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async(&mut *conn)
            .await?;
        id.parse()
    }

    async fn last_entry_id(&self, stream: &str) -> Result<Option<EntryId>> {
        let mut conn = self.connections.acquire().await?;
        let reply: StreamRangeReply = redis::cmd("XREVRANGE")
            .arg(stream)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut *conn)
            .await?;

        reply
            .ids
            .first()
            .map(|entry| entry.id.parse())
            .transpose()
    }

    async fn blocking_connection(&self) -> Result<MultiplexedConnection> {
        self.connections.dedicated().await
    }

    async fn read_next(
        &self,
        conn: &mut MultiplexedConnection,
        stream: &str,
        after: EntryId,
    ) -> Result<StreamEntry> {
        let reply: Option<StreamReadReply> = redis::cmd("XREAD")
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(0)
            .arg("STREAMS")
            .arg(stream)
            .arg(after.to_string())
            .query_async(conn)
            .await?;

        let entry = reply
            .and_then(|reply| reply.keys.into_iter().next())
            .and_then(|key| key.ids.into_iter().next())
            .ok_or_else(|| {
                Error::Protocol(format!("blocking read on {stream} returned no entry"))
            })?;

        parse_entry(stream, entry)
    }

    async fn upsert_scored(&self, set: &str, score: Timestamp, member: &str) -> Result<()> {
        let mut conn = self.connections.acquire().await?;
        let _: i64 = redis::cmd("ZADD")
            .arg(set)
            .arg(score)
            .arg(member)
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn range_by_score(&self, set: &str, min: Timestamp) -> Result<Vec<String>> {
        let mut conn = self.connections.acquire().await?;
        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(set)
            .arg(min)
            .arg("+inf")
            .query_async(&mut *conn)
            .await?;
        Ok(members)
    }

    async fn remove_range_by_score(&self, set: &str, max: Timestamp) -> Result<u64> {
        let mut conn = self.connections.acquire().await?;
        let removed: u64 = redis::cmd("ZREMRANGEBYSCORE")
            .arg(set)
            .arg("-inf")
            .arg(max)
            .query_async(&mut *conn)
            .await?;
        debug!(set, max, removed, "Removed scored members");
        Ok(removed)
    }
}
