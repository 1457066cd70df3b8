//! Persistence and delivery backend for icc.
//!
//! Two real-time primitives on top of Redis:
//!
//! - a notification stream that many publishers append to and a single
//!   reader drains with blocking, cancellable reads;
//! - an applause counter that records per-member activity times and answers
//!   "how many distinct members were active since T" per parent.
//!
//! # Key Types
//!
//! - [`Backend`] - The operation surface: publish, receive, applause
//! - [`Store`] - Command contract of the backing store
//! - [`RedisStore`] - Redis implementation on a bounded connection pool
//! - [`InMemoryStore`] - In-process implementation for tests
//! - [`NotifyReader`] - Cursor-tracking, cancellable stream reader

pub mod applause;
pub mod backend;
pub mod config;
pub mod error;
pub mod memory;
pub mod notify;
pub mod pool;
pub mod redis_store;
pub mod traits;

// Re-exports
pub use applause::{Applause, ApplauseKey};
pub use backend::Backend;
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use memory::InMemoryStore;
pub use notify::{NotifyReader, Publisher};
pub use pool::{ConnectionManager, wait_until_reachable};
pub use redis_store::RedisStore;
pub use traits::{EntryId, Store, StreamEntry, Timestamp};
pub use tokio_util::sync::CancellationToken;
