//! Configuration for the Redis connection pool and the backing keys.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for connecting to the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection string (`redis://host:port/db`).
    #[serde(default = "default_url")]
    pub url: String,

    /// Maximum number of pooled connections handed out at once.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Idle connections the pool keeps warm.
    #[serde(default = "default_min_idle")]
    pub min_idle: u32,

    /// Idle connections are recycled after this long.
    #[serde(default = "default_idle_timeout", with = "humantime_serde")]
    pub idle_timeout: Duration,

    /// How long `acquire` waits on a saturated pool before giving up.
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,

    /// Interval between liveness probes while waiting for the store.
    #[serde(default = "default_reachability_interval", with = "humantime_serde")]
    pub reachability_interval: Duration,

    /// Key of the notification stream.
    #[serde(default = "default_notify_stream")]
    pub notify_stream: String,

    /// Key of the applause sorted set.
    #[serde(default = "default_applause_set")]
    pub applause_set: String,
}

fn default_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_max_connections() -> u32 {
    100
}

fn default_min_idle() -> u32 {
    10
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(240)
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_reachability_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_notify_stream() -> String {
    "icc-notify".to_string()
}

fn default_applause_set() -> String {
    "applause".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_connections: default_max_connections(),
            min_idle: default_min_idle(),
            idle_timeout: default_idle_timeout(),
            acquire_timeout: default_acquire_timeout(),
            reachability_interval: default_reachability_interval(),
            notify_stream: default_notify_stream(),
            applause_set: default_applause_set(),
        }
    }
}

impl StoreConfig {
    /// Point the config at a plain `host:port` address.
    #[must_use]
    pub fn with_address(mut self, address: &str) -> Self {
        self.url = format!("redis://{address}");
        self
    }

    /// Use a full connection string.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the pool bounds.
    #[must_use]
    pub fn with_pool_size(mut self, max_connections: u32, min_idle: u32) -> Self {
        self.max_connections = max_connections;
        self.min_idle = min_idle;
        self
    }

    /// Set the interval between liveness probes.
    #[must_use]
    pub fn with_reachability_interval(mut self, interval: Duration) -> Self {
        self.reachability_interval = interval;
        self
    }

    /// Use different keys for the stream and the applause set.
    ///
    /// Mostly useful to isolate test runs sharing one Redis.
    #[must_use]
    pub fn with_keys(
        mut self,
        notify_stream: impl Into<String>,
        applause_set: impl Into<String>,
    ) -> Self {
        self.notify_stream = notify_stream.into();
        self.applause_set = applause_set.into();
        self
    }

    /// Reject configurations the pool cannot be built from.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config("max_connections must be at least 1".into()));
        }
        if self.min_idle > self.max_connections {
            return Err(Error::Config(format!(
                "min_idle ({}) exceeds max_connections ({})",
                self.min_idle, self.max_connections
            )));
        }
        if self.acquire_timeout.is_zero() {
            return Err(Error::Config("acquire_timeout must be positive".into()));
        }
        if self.notify_stream.is_empty() || self.applause_set.is_empty() {
            return Err(Error::Config("store keys must not be empty".into()));
        }
        Ok(())
    }
}
