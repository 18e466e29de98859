//! Ranking indices: ordered member -> score containers.
//!
//! Provides ranking storage with multiple backends:
//! - In-memory (default, order-statistic tree per index)
//! - Redis sorted sets (enable with `redis` feature)
//!
//! ## Ordering
//!
//! Highest score first. Equal scores are ordered by member identifier,
//! descending, which is exactly what a sorted-set store returns for reverse
//! ranges; both backends therefore agree on every rank.
//!
//! ## Ephemeral indices
//!
//! Period reports build a throwaway index per call. [`EphemeralIndex`] owns
//! a uniquely named key and discards it when dropped, so cleanup happens on
//! every exit path including cancellation.

mod memory;
pub(crate) mod tree;

#[cfg(feature = "redis")]
mod redis;

pub use memory::{MemoryIndex, MemoryRankingStore};

#[cfg(feature = "redis")]
pub use self::redis::{RedisIndex, RedisRankingStore};

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

/// A member and its score as returned by range queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMember {
    pub member: String,
    pub score: f64,
}

impl RankedMember {
    pub fn new(member: impl Into<String>, score: f64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

/// Ordered member -> score container.
///
/// Absent members are reported as `None`, never as errors; errors mean the
/// backing store could not answer.
#[async_trait]
pub trait RankingIndex: Send + Sync {
    /// Set member's score to exactly `score`.
    async fn upsert(&self, member: &str, score: f64) -> Result<()>;

    /// Add `delta` to member's score (0 if absent). Returns the new score.
    async fn increment_by(&self, member: &str, delta: f64) -> Result<f64>;

    async fn score_of(&self, member: &str) -> Result<Option<f64>>;

    /// 0-based descending rank.
    async fn rank_of(&self, member: &str) -> Result<Option<u64>>;

    /// Members at ranks `start..=end`. Empty if `start` is past the end.
    async fn range_desc(&self, start: u64, end: u64) -> Result<Vec<RankedMember>>;

    async fn remove(&self, member: &str) -> Result<bool>;

    async fn size(&self) -> Result<u64>;
}

/// Names an index within a [`RankingStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    /// Per-game leaderboard.
    Game(String),
    /// Cross-game aggregate.
    Global,
    /// Throwaway index for one period report.
    Period { game_id: String, token: Uuid },
}

impl IndexKey {
    pub fn game(game_id: impl Into<String>) -> Self {
        Self::Game(game_id.into())
    }

    /// A period key nobody else can hold.
    pub fn period(game_id: impl Into<String>) -> Self {
        Self::Period {
            game_id: game_id.into(),
            token: Uuid::new_v4(),
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Period { .. })
    }

    /// Full store key under `prefix`.
    pub fn render(&self, prefix: &str) -> String {
        format!("{prefix}{self}")
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Game(id) => write!(f, "leaderboard:game:{id}"),
            Self::Global => f.write_str("leaderboard:global"),
            Self::Period { game_id, token } => {
                write!(f, "leaderboard:period:{game_id}:{}", token.simple())
            }
        }
    }
}

/// Hands out index handles by key.
#[async_trait]
pub trait RankingStore: Send + Sync {
    /// Handle to the index named `key`. Creating a handle performs no I/O.
    fn index(&self, key: &IndexKey) -> Arc<dyn RankingIndex>;

    /// Drop every member of `key`. Best effort and infallible; must not block.
    fn discard(&self, key: &IndexKey);

    /// Health check.
    async fn ping(&self) -> Result<()>;
}

/// Scoped period index. Discarded from its store when dropped.
pub struct EphemeralIndex {
    key: IndexKey,
    index: Arc<dyn RankingIndex>,
    store: Arc<dyn RankingStore>,
}

impl EphemeralIndex {
    pub fn acquire(store: Arc<dyn RankingStore>, game_id: &str) -> Self {
        let key = IndexKey::period(game_id);
        let index = store.index(&key);
        debug!(key = %key, "period index acquired");
        Self { key, index, store }
    }

    pub fn key(&self) -> &IndexKey {
        &self.key
    }
}

impl Deref for EphemeralIndex {
    type Target = dyn RankingIndex;

    fn deref(&self) -> &Self::Target {
        self.index.as_ref()
    }
}

impl Drop for EphemeralIndex {
    fn drop(&mut self) {
        self.store.discard(&self.key);
        debug!(key = %self.key, "period index discarded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_rendering() {
        assert_eq!(IndexKey::game("g1").render(""), "leaderboard:game:g1");
        assert_eq!(IndexKey::Global.render("rankd:"), "rankd:leaderboard:global");
        // A game called "global" stays out of the global index's way.
        assert_ne!(
            IndexKey::game("global").render(""),
            IndexKey::Global.render("")
        );

        let key = IndexKey::period("g1");
        assert!(key.is_ephemeral());
        assert!(key.to_string().starts_with("leaderboard:period:g1:"));
    }

    #[test]
    fn test_period_keys_are_unique() {
        assert_ne!(IndexKey::period("g1"), IndexKey::period("g1"));
    }

    #[tokio::test]
    async fn test_ephemeral_index_discarded_on_drop() {
        let store = Arc::new(MemoryRankingStore::new());
        let shared: Arc<dyn RankingStore> = store.clone();

        {
            let period = EphemeralIndex::acquire(shared.clone(), "g1");
            period.upsert("alice", 80.0).await.unwrap();
            assert!(store.contains(period.key()));
            assert_eq!(store.len(), 1);
        }

        assert_eq!(store.len(), 0);
    }
}
