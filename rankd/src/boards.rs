//! The two leaderboard kinds.
//!
//! A game board holds each player's *latest* score for that game; the
//! global board holds each player's *lifetime total* across all games.
//! They wrap the same index type but expose only their own write path, so
//! the overwrite and sum policies cannot be mixed up at a call site.

use std::sync::Arc;

use crate::error::Result;
use crate::index::{IndexKey, RankingIndex, RankingStore};

/// Per-game leaderboard: overwrite semantics.
#[derive(Clone)]
pub struct GameBoard {
    game_id: String,
    index: Arc<dyn RankingIndex>,
}

impl GameBoard {
    pub fn open(store: &dyn RankingStore, game_id: &str) -> Self {
        Self {
            game_id: game_id.to_string(),
            index: store.index(&IndexKey::game(game_id)),
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Replace the player's standing with `score`.
    pub async fn record(&self, user_id: &str, score: f64) -> Result<()> {
        self.index.upsert(user_id, score).await
    }

    pub fn index(&self) -> &dyn RankingIndex {
        self.index.as_ref()
    }
}

/// Cross-game leaderboard: increment semantics.
#[derive(Clone)]
pub struct GlobalBoard {
    index: Arc<dyn RankingIndex>,
}

impl GlobalBoard {
    pub fn open(store: &dyn RankingStore) -> Self {
        Self {
            index: store.index(&IndexKey::Global),
        }
    }

    /// Add `score` to the player's lifetime total. Returns the new total.
    pub async fn accumulate(&self, user_id: &str, score: f64) -> Result<f64> {
        self.index.increment_by(user_id, score).await
    }

    pub fn index(&self) -> &dyn RankingIndex {
        self.index.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryRankingStore;

    #[tokio::test]
    async fn test_policies_differ() {
        let store = MemoryRankingStore::new();
        let game = GameBoard::open(&store, "g1");
        let global = GlobalBoard::open(&store);

        for score in [100.0, 120.0] {
            game.record("alice", score).await.unwrap();
            global.accumulate("alice", score).await.unwrap();
        }

        assert_eq!(game.index().score_of("alice").await.unwrap(), Some(120.0));
        assert_eq!(global.index().score_of("alice").await.unwrap(), Some(220.0));
    }
}
