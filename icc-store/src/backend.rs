//! The operation surface callers use.
//!
//! [`Backend`] ties one store, shared by all components, to the stream and
//! applause keys from [`StoreConfig`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::applause::Applause;
use crate::config::StoreConfig;
use crate::error::Result;
use crate::memory::InMemoryStore;
use crate::notify::{NotifyReader, Publisher};
use crate::pool;
use crate::redis_store::RedisStore;
use crate::traits::{Store, Timestamp};

/// Notification and applause operations over one shared store.
pub struct Backend<S> {
    store: Arc<S>,
    config: StoreConfig,
    publisher: Publisher<S>,
    applause: Applause<S>,
}

impl Backend<RedisStore> {
    /// Build a Redis backend. Does not contact Redis yet.
    pub fn connect(config: StoreConfig) -> Result<Self> {
        let store = RedisStore::new(&config)?;
        Ok(Self::new(Arc::new(store), config))
    }
}

impl Backend<InMemoryStore> {
    /// Backend on a fresh in-memory store with default keys.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()), StoreConfig::default())
    }
}

impl<S: Store> Backend<S> {
    /// Wrap an existing store.
    pub fn new(store: Arc<S>, config: StoreConfig) -> Self {
        let publisher = Publisher::new(Arc::clone(&store), config.notify_stream.clone());
        let applause = Applause::new(Arc::clone(&store), config.applause_set.clone());
        Self {
            store,
            config,
            publisher,
            applause,
        }
    }

    /// The shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The configuration this backend was built with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Block until the store answers a probe. Returns `false` if cancelled.
    pub async fn wait_until_reachable(&self, cancel: &CancellationToken) -> bool {
        info!("Waiting for store to become reachable");
        pool::wait_until_reachable(
            self.store.as_ref(),
            cancel,
            self.config.reachability_interval,
        )
        .await
    }

    /// A cloneable publisher handle.
    #[must_use]
    pub fn publisher(&self) -> Publisher<S> {
        self.publisher.clone()
    }

    /// Append a notification.
    pub async fn publish(&self, payload: &[u8]) -> Result<()> {
        self.publisher.publish(payload).await
    }

    /// Create the reader that delivers notifications published from now on.
    pub async fn reader(&self) -> Result<NotifyReader<S>> {
        NotifyReader::new(Arc::clone(&self.store), self.config.notify_stream.clone()).await
    }

    /// Record applause of `member_id` in `parent_id` at `at`.
    pub async fn record_applause(
        &self,
        parent_id: u64,
        member_id: u64,
        at: Timestamp,
    ) -> Result<()> {
        self.applause.record(parent_id, member_id, at).await
    }

    /// Distinct applauding members per parent since `since`, inclusive.
    pub async fn applause_since(&self, since: Timestamp) -> Result<HashMap<u64, usize>> {
        self.applause.count_since(since).await
    }

    /// Remove applause older than `horizon`. Returns how many were removed.
    pub async fn cleanup_applause_before(&self, horizon: Timestamp) -> Result<u64> {
        self.applause.cleanup_before(horizon).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn backend_uses_configured_keys() {
        let store = Arc::new(InMemoryStore::new());
        let config = StoreConfig::default().with_keys("n", "a");
        let backend = Backend::new(Arc::clone(&store), config);

        backend.publish(b"x").await.unwrap();
        backend.record_applause(1, 2, 10).await.unwrap();

        assert_eq!(store.stream_len("n").await, 1);
        assert_eq!(store.score("a", "1-2").await, Some(10));
    }

    #[tokio::test]
    async fn redis_backend_builds_offline() {
        let backend = Backend::connect(StoreConfig::default().with_address("127.0.0.1:1"));
        assert!(backend.is_ok());
    }

    #[tokio::test]
    async fn wait_gives_up_when_cancelled() {
        let config = StoreConfig::default()
            .with_reachability_interval(std::time::Duration::from_millis(5));
        let backend = Backend::new(Arc::new(InMemoryStore::new()), config);
        backend.store().set_reachable(false);

        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
                cancel.cancel();
            })
        };

        assert!(!backend.wait_until_reachable(&cancel).await);
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_backend_is_reachable() {
        let backend = Backend::in_memory();
        assert!(backend.wait_until_reachable(&CancellationToken::new()).await);
    }
}
