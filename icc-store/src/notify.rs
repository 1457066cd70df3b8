//! Notification stream: many publishers, one cursor-tracking reader.
//!
//! # Cancellation
//!
//! A blocking stream read has no native cancellation, so [`NotifyReader::receive`]
//! runs it on a spawned task and races that task against the caller's
//! [`CancellationToken`]:
//!
//! ```text
//!   receive(token) ──spawn──► read_next(conn, after = cursor)
//!        │                          │
//!        ├── token.cancelled() ─────┤  abort task, drop its connection,
//!        │                          │  keep cursor, Err(Cancelled)
//!        └── task finished ─────────┘  keep connection, cursor = entry.id
//! ```
//!
//! Only the winning branch touches the cursor. An aborted read takes its
//! dedicated connection down with it, so no orphaned read outlives the call.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::traits::{EntryId, Store};

/// Appends notifications to the stream.
pub struct Publisher<S> {
    store: Arc<S>,
    stream: String,
}

impl<S> Clone for Publisher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            stream: self.stream.clone(),
        }
    }
}

impl<S: Store> Publisher<S> {
    /// Publisher appending to `stream`.
    pub fn new(store: Arc<S>, stream: impl Into<String>) -> Self {
        Self {
            store,
            stream: stream.into(),
        }
    }

    /// Append one opaque payload.
    ///
    /// Not retried: a repeated append would create a duplicate entry.
    pub async fn publish(&self, payload: &[u8]) -> Result<()> {
        let id = self.store.append(&self.stream, payload).await?;
        debug!(stream = %self.stream, %id, bytes = payload.len(), "Published notification");
        Ok(())
    }
}

/// Reads the stream one entry per call, in order, from its creation onwards.
///
/// `receive` takes `&mut self`, so a reader can only ever have one call in
/// flight. Share it behind a `tokio::sync::Mutex` if several tasks need it.
pub struct NotifyReader<S: Store> {
    store: Arc<S>,
    stream: String,
    /// Last entry delivered, or the stream tail when the reader was created.
    cursor: EntryId,
    /// Dedicated connection kept between successful reads.
    conn: Option<S::Blocking>,
}

impl<S: Store> NotifyReader<S> {
    /// Create a reader that only sees entries appended from now on.
    ///
    /// The cursor is pinned to the current tail of the stream, so entries
    /// published between construction and the first `receive` are delivered.
    pub async fn new(store: Arc<S>, stream: impl Into<String>) -> Result<Self> {
        let stream = stream.into();
        let cursor = store
            .last_entry_id(&stream)
            .await?
            .unwrap_or(EntryId::ZERO);

        debug!(stream = %stream, %cursor, "Created notification reader");

        Ok(Self {
            store,
            stream,
            cursor,
            conn: None,
        })
    }

    /// ID of the last entry this reader delivered (or its starting point).
    #[must_use]
    pub fn cursor(&self) -> EntryId {
        self.cursor
    }

    /// Wait for the next entry and return its payload.
    ///
    /// Blocks until an entry newer than the cursor exists or `cancel` fires.
    /// On cancellation the cursor is left unchanged and `Error::Cancelled`
    /// is returned.
    pub async fn receive(&mut self, cancel: &CancellationToken) -> Result<Vec<u8>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                conn = self.store.blocking_connection() => conn?,
            },
        };

        let after = self.cursor;
        let mut read = {
            let store = Arc::clone(&self.store);
            let stream = self.stream.clone();
            tokio::spawn(async move {
                let mut conn = conn;
                let result = store.read_next(&mut conn, &stream, after).await;
                (conn, result)
            })
        };

        let (conn, result) = tokio::select! {
            joined = &mut read => joined
                .map_err(|e| Error::Connection(format!("blocking read task failed: {e}")))?,
            _ = cancel.cancelled() => {
                read.abort();
                warn!(
                    stream = %self.stream,
                    cursor = %after,
                    "Receive cancelled, abandoned blocking read"
                );
                return Err(Error::Cancelled);
            }
        };

        // A failed read may leave the connection mid-reply; let it go.
        let entry = result?;
        self.conn = Some(conn);

        if entry.id <= after {
            return Err(Error::Protocol(format!(
                "stream {} returned entry {} at or before cursor {after}",
                self.stream, entry.id
            )));
        }

        self.cursor = entry.id;
        debug!(stream = %self.stream, cursor = %self.cursor, "Received notification");
        Ok(entry.payload)
    }
}
