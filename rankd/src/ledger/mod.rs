//! History ledger: append-only, time-ordered score events per (user, game).
//!
//! Records are stored JSON-encoded and decoded on read. A record that no
//! longer decodes is skipped and logged; the rest of the read still succeeds.
//!
//! ## Retention
//!
//! Unbounded history would make period reports scan ever-growing logs, so
//! every ledger enforces a [`RetentionPolicy`] on append: by default the
//! newest 1000 events per (user, game) are kept.

mod memory;

#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryLedger;

#[cfg(feature = "redis")]
pub use self::redis::RedisLedger;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::event::ScoreEvent;

/// Append-only score history.
#[async_trait]
pub trait HistoryLedger: Send + Sync {
    /// Record one event. Never overwrites an earlier one.
    async fn append(&self, event: &ScoreEvent) -> Result<()>;

    /// Newest first, at most `limit` events.
    async fn recent(&self, user_id: &str, game_id: &str, limit: usize) -> Result<Vec<ScoreEvent>>;

    /// Events with `start <= timestamp <= end`, in no particular order.
    async fn in_range(
        &self,
        user_id: &str,
        game_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScoreEvent>>;
}

/// How much history each (user, game) keeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Keep at most this many newest events per (user, game). `None` = unbounded.
    pub max_events_per_key: Option<usize>,
    /// Drop events older than this relative to the newest append. `None` = forever.
    #[serde(with = "opt_secs")]
    pub max_age: Option<Duration>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_events_per_key: Some(1000),
            max_age: None,
        }
    }
}

impl RetentionPolicy {
    pub fn unbounded() -> Self {
        Self {
            max_events_per_key: None,
            max_age: None,
        }
    }

    pub fn with_max_events(mut self, max: usize) -> Self {
        self.max_events_per_key = Some(max);
        self
    }

    pub fn with_max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age);
        self
    }

    /// Events stamped before this instant are expired.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let age = chrono::Duration::from_std(self.max_age?).ok()?;
        now.checked_sub_signed(age)
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

pub(crate) fn encode(event: &ScoreEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

/// Decode a stored record, skipping (and logging) anything malformed.
pub(crate) fn decode(raw: &str, user_id: &str, game_id: &str) -> Option<ScoreEvent> {
    match serde_json::from_str(raw) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(user_id, game_id, error = %e, "skipping malformed history record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_caps_events() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.max_events_per_key, Some(1000));
        assert!(policy.cutoff(Utc::now()).is_none());
    }

    #[test]
    fn test_cutoff() {
        let now = Utc::now();
        let policy = RetentionPolicy::unbounded().with_max_age(Duration::from_secs(3600));
        assert_eq!(policy.cutoff(now), Some(now - chrono::Duration::hours(1)));
    }

    #[test]
    fn test_policy_json() {
        let policy: RetentionPolicy =
            serde_json::from_str(r#"{"max_events_per_key": 50, "max_age": 86400}"#).unwrap();
        assert_eq!(policy.max_events_per_key, Some(50));
        assert_eq!(policy.max_age, Some(Duration::from_secs(86400)));

        let policy: RetentionPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, RetentionPolicy::default());
    }

    #[test]
    fn test_decode_skips_garbage() {
        assert!(decode("{not json", "alice", "g1").is_none());
        let event = ScoreEvent::new("alice", "g1", 5.0);
        let raw = encode(&event).unwrap();
        assert_eq!(decode(&raw, "alice", "g1"), Some(event));
    }
}
