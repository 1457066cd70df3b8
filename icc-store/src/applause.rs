//! Time-windowed applause counting.
//!
//! Every applause is a member of one scored set keyed `"<parent>-<member>"`
//! with the activity time as score. Re-recording the same pair overwrites the
//! score, so counts are distinct members, not events.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::{Store, Timestamp};

/// Identity of one applause entry.
///
/// Both IDs are unsigned. A stored key with a negative ID (`"-3-4"`) does not
/// parse, and one such key fails the whole `count_since` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApplauseKey {
    pub parent_id: u64,
    pub member_id: u64,
}

impl ApplauseKey {
    #[must_use]
    pub fn new(parent_id: u64, member_id: u64) -> Self {
        Self {
            parent_id,
            member_id,
        }
    }
}

impl fmt::Display for ApplauseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.parent_id, self.member_id)
    }
}

impl FromStr for ApplauseKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Protocol(format!("invalid applause key in store: {s:?}"));

        let (parent, member) = s.split_once('-').ok_or_else(invalid)?;
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !digits(parent) || !digits(member) {
            return Err(invalid());
        }

        Ok(Self {
            parent_id: parent.parse().map_err(|_| invalid())?,
            member_id: member.parse().map_err(|_| invalid())?,
        })
    }
}

/// Records and aggregates applause in a scored set.
pub struct Applause<S> {
    store: Arc<S>,
    set: String,
}

impl<S: Store> Applause<S> {
    /// Applause backed by the scored set `set`.
    pub fn new(store: Arc<S>, set: impl Into<String>) -> Self {
        Self {
            store,
            set: set.into(),
        }
    }

    /// Record that `member_id` applauded in `parent_id` at `at`.
    ///
    /// Replaces any earlier time for the same pair.
    pub async fn record(&self, parent_id: u64, member_id: u64, at: Timestamp) -> Result<()> {
        let key = ApplauseKey::new(parent_id, member_id);
        self.store
            .upsert_scored(&self.set, at, &key.to_string())
            .await?;
        debug!(%key, at, "Recorded applause");
        Ok(())
    }

    /// Count distinct members per parent with applause at or after `since`.
    ///
    /// Any malformed key aborts the whole query.
    pub async fn count_since(&self, since: Timestamp) -> Result<HashMap<u64, usize>> {
        let members = self.store.range_by_score(&self.set, since).await?;

        let mut counts = HashMap::new();
        for member in &members {
            let key: ApplauseKey = member.parse()?;
            *counts.entry(key.parent_id).or_insert(0) += 1;
        }

        debug!(since, entries = members.len(), parents = counts.len(), "Counted applause");
        Ok(counts)
    }

    /// Remove every applause strictly older than `horizon`.
    ///
    /// Entries at exactly `horizon` survive. Returns how many were removed.
    pub async fn cleanup_before(&self, horizon: Timestamp) -> Result<u64> {
        let removed = self
            .store
            .remove_range_by_score(&self.set, horizon.saturating_sub(1))
            .await?;
        debug!(horizon, removed, "Cleaned up old applause");
        Ok(removed)
    }
}
