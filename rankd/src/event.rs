//! Score events and leaderboard rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One accepted score submission. Immutable once appended to history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEvent {
    /// Unique per submission so identical payloads never collapse in history.
    pub id: Uuid,
    pub user_id: String,
    pub game_id: String,
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}

impl ScoreEvent {
    /// Stamp a new event with the current time.
    pub fn new(user_id: &str, game_id: &str, score: f64) -> Self {
        Self::at(user_id, game_id, score, Utc::now())
    }

    pub fn at(user_id: &str, game_id: &str, score: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            game_id: game_id.to_string(),
            score,
            timestamp,
        }
    }
}

/// Where a row's rank came from.
///
/// Period report rows are always `Indexed`: their rank is the row's position
/// in a private index built for that report, which is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankSource {
    /// Answered by the index's own rank query.
    #[default]
    Indexed,
    /// Rank query unavailable; derived from the row's offset in the fetched range.
    Positional,
}

impl RankSource {
    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::Indexed)
    }
}

/// A leaderboard row. Derived on read, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Rank (1-indexed).
    pub rank: u64,
    pub user_id: String,
    /// Username (resolved at read time).
    pub username: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "RankSource::is_indexed")]
    pub rank_source: RankSource,
}

impl LeaderboardEntry {
    pub fn is_degraded(&self) -> bool {
        !self.rank_source.is_indexed()
    }
}
