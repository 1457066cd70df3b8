//! Bounded, reusable connections to Redis and the startup reachability wait.

use std::time::Duration;

use bb8::{ErrorSink, Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use redis::RedisError;
use redis::aio::MultiplexedConnection;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::traits::Store;

/// A pooled connection. Returned to the pool when dropped.
pub type Connection<'a> = PooledConnection<'a, RedisConnectionManager>;

/// Receives the connection errors bb8 hits outside any caller's future.
///
/// Every error is logged and published to the callers parked in
/// [`ConnectionManager::acquire`].
#[derive(Debug, Clone)]
struct ConnectFailures {
    latest: watch::Sender<Option<String>>,
}

impl ConnectFailures {
    fn new() -> Self {
        Self {
            latest: watch::Sender::new(None),
        }
    }
}

impl ErrorSink<RedisError> for ConnectFailures {
    fn sink(&self, error: RedisError) {
        warn!(error = %error, "Redis connection attempt failed");
        self.latest.send_replace(Some(error.to_string()));
    }

    fn boxed_clone(&self) -> Box<dyn ErrorSink<RedisError>> {
        Box::new(self.clone())
    }
}

/// Hands out connections from a bounded pool.
///
/// `acquire` waits while all `max_connections` are checked out. Up to
/// `min_idle` connections are kept warm and idle ones are closed after
/// `idle_timeout`. Building the manager never touches the network, so an
/// unreachable Redis is only reported by the calls that need it: a connect
/// attempt that fails while `acquire` waits fails that `acquire` with the
/// connect error.
#[derive(Clone)]
pub struct ConnectionManager {
    pool: Pool<RedisConnectionManager>,
    failures: ConnectFailures,
}

impl ConnectionManager {
    /// Build the pool from configuration.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let manager = RedisConnectionManager::new(config.url.as_str())
            .map_err(|e| Error::Config(format!("invalid redis url {:?}: {e}", config.url)))?;

        let failures = ConnectFailures::new();
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_idle))
            .idle_timeout(Some(config.idle_timeout))
            .connection_timeout(config.acquire_timeout)
            .retry_connection(false)
            .error_sink(failures.boxed_clone())
            .build_unchecked(manager);

        info!(
            url = %config.url,
            max_connections = config.max_connections,
            min_idle = config.min_idle,
            "Created redis connection pool"
        );

        Ok(Self { pool, failures })
    }

    /// Check out a connection, waiting while the pool is saturated.
    ///
    /// Gives up after `acquire_timeout`, or as soon as a connect attempt
    /// fails while waiting.
    pub async fn acquire(&self) -> Result<Connection<'_>> {
        let mut failures = self.failures.latest.subscribe();

        tokio::select! {
            conn = self.pool.get() => Ok(conn?),
            Ok(()) = failures.changed() => {
                let cause = failures.borrow_and_update().clone().unwrap_or_default();
                Err(Error::Connection(format!("failed to connect to redis: {cause}")))
            }
        }
    }

    /// Open a connection that is not managed by the pool.
    ///
    /// Blocking reads use these so a parked `XREAD` never occupies a pooled
    /// slot. Dropping the connection closes its socket.
    pub async fn dedicated(&self) -> Result<MultiplexedConnection> {
        Ok(self.pool.dedicated_connection().await?)
    }

    /// Connections currently open, idle ones included.
    #[must_use]
    pub fn open_connections(&self) -> u32 {
        self.pool.state().connections
    }
}

/// Probe the store every `interval` until it answers or `cancel` fires.
///
/// Returns `true` once the store is reachable and `false` if cancelled
/// first. A probe that has not answered within `interval` counts as failed.
/// Failed probes are logged and retried, never returned.
pub async fn wait_until_reachable<S: Store + ?Sized>(
    store: &S,
    cancel: &CancellationToken,
    interval: Duration,
) -> bool {
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let deadline = Instant::now() + interval;

        let probe = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            probe = tokio::time::timeout_at(deadline, store.ping()) => probe,
        };

        match probe {
            Ok(Ok(())) => {
                debug!(attempts, "Store is reachable");
                return true;
            }
            Ok(Err(e)) => info!(error = %e, "Waiting for store"),
            Err(_) => info!(timeout = ?interval, "Waiting for store, probe timed out"),
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => {
                trace!(attempt = attempts, "Retrying store probe");
            }
        }
    }

    debug!(attempts, "Stopped waiting for store");
    false
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::memory::InMemoryStore;
    use crate::traits::{EntryId, StreamEntry, Timestamp};

    /// A store whose probes never answer, like a host that drops packets.
    #[derive(Default)]
    struct StalledProbe {
        inner: InMemoryStore,
        pings: AtomicU32,
    }

    impl StalledProbe {
        fn pings(&self) -> u32 {
            self.pings.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Store for StalledProbe {
        type Blocking = ();

        async fn ping(&self) -> Result<()> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }

        async fn append(&self, stream: &str, payload: &[u8]) -> Result<EntryId> {
            self.inner.append(stream, payload).await
        }

        async fn last_entry_id(&self, stream: &str) -> Result<Option<EntryId>> {
            self.inner.last_entry_id(stream).await
        }

        async fn blocking_connection(&self) -> Result<()> {
            self.inner.blocking_connection().await
        }

        async fn read_next(
            &self,
            conn: &mut (),
            stream: &str,
            after: EntryId,
        ) -> Result<StreamEntry> {
            self.inner.read_next(conn, stream, after).await
        }

        async fn upsert_scored(&self, set: &str, score: Timestamp, member: &str) -> Result<()> {
            self.inner.upsert_scored(set, score, member).await
        }

        async fn range_by_score(&self, set: &str, min: Timestamp) -> Result<Vec<String>> {
            self.inner.range_by_score(set, min).await
        }

        async fn remove_range_by_score(&self, set: &str, max: Timestamp) -> Result<u64> {
            self.inner.remove_range_by_score(set, max).await
        }
    }

    #[tokio::test]
    async fn manager_builds_without_reachable_redis() {
        let config = StoreConfig::default().with_address("127.0.0.1:1");
        let manager = ConnectionManager::new(&config);
        assert!(manager.is_ok());
    }

    #[tokio::test]
    async fn manager_rejects_invalid_url() {
        let config = StoreConfig::default().with_url("not a url");
        assert!(matches!(
            ConnectionManager::new(&config),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn manager_rejects_invalid_pool_bounds() {
        let config = StoreConfig::default().with_pool_size(1, 2);
        assert!(ConnectionManager::new(&config).is_err());
    }

    #[tokio::test]
    async fn acquire_reports_refused_connection_without_waiting() {
        let config = StoreConfig::default().with_address("127.0.0.1:1");
        let manager = ConnectionManager::new(&config).unwrap();

        let acquired = tokio::time::timeout(Duration::from_secs(5), manager.acquire())
            .await
            .expect("a refused connect should fail before acquire_timeout");
        let Err(err) = acquired else {
            panic!("connecting to a closed port should fail");
        };

        assert!(err.is_connectivity());
        assert!(err.to_string().contains("failed to connect"), "{err}");
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_reachable() {
        let store = InMemoryStore::new();
        let cancel = CancellationToken::new();

        assert!(wait_until_reachable(&store, &cancel, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn wait_retries_until_reachable() {
        let store = Arc::new(InMemoryStore::new());
        store.set_reachable(false);
        let cancel = CancellationToken::new();

        let flipper = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                store.set_reachable(true);
            })
        };

        let reached = tokio::time::timeout(
            Duration::from_secs(2),
            wait_until_reachable(store.as_ref(), &cancel, Duration::from_millis(10)),
        )
        .await
        .expect("should reach the store before the timeout");

        assert!(reached);
        flipper.await.unwrap();
    }

    #[tokio::test]
    async fn wait_stops_when_cancelled() {
        let store = InMemoryStore::new();
        store.set_reachable(false);
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                cancel.cancel();
            })
        };

        let reached = tokio::time::timeout(
            Duration::from_secs(2),
            wait_until_reachable(&store, &cancel, Duration::from_secs(60)),
        )
        .await
        .expect("cancellation should interrupt the probe interval");

        assert!(!reached);
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn wait_stops_when_cancelled_during_probe() {
        let store = StalledProbe::default();
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };

        let started = std::time::Instant::now();
        let reached = tokio::time::timeout(
            Duration::from_secs(2),
            wait_until_reachable(&store, &cancel, Duration::from_secs(60)),
        )
        .await
        .expect("cancellation should interrupt an unanswered probe");

        assert!(!reached);
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(store.pings(), 1);
        canceller.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_probes_are_retried_every_interval() {
        let store = StalledProbe::default();
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(1050)).await;
                cancel.cancel();
            })
        };

        let reached = wait_until_reachable(&store, &cancel, Duration::from_millis(100)).await;

        assert!(!reached);
        // Probes start at 0ms, 100ms, ..., 1000ms.
        assert!((10..=11).contains(&store.pings()), "pings: {}", store.pings());
        canceller.await.unwrap();
    }
}
