//! Time-windowed "top players" reports.
//!
//! A report is computed per call from history and never stored: every
//! member on the game's board has their in-window history scanned, their best
//! in-window score goes into a private [`EphemeralIndex`], and the top of that
//! index is read once. Cost is O(members * history per member), so this is
//! not a substitute for the live leaderboard.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::engine::{require_id, ScoreEngine};
use crate::error::{RankdError, Result};
use crate::event::{LeaderboardEntry, RankSource};
use crate::index::EphemeralIndex;

/// Named report windows ending now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPeriod {
    Day,
    Week,
    Month,
    Year,
}

impl ReportPeriod {
    /// `[now - period, now]`. Months and years are calendar months.
    pub fn window(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = match self {
            Self::Day => now.checked_sub_signed(Duration::days(1)),
            Self::Week => now.checked_sub_signed(Duration::weeks(1)),
            Self::Month => now.checked_sub_months(Months::new(1)),
            Self::Year => now.checked_sub_months(Months::new(12)),
        };
        (start.unwrap_or(DateTime::<Utc>::MIN_UTC), now)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportPeriod {
    type Err = RankdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            other => Err(RankdError::invalid_argument(format!(
                "unknown report period {other:?}"
            ))),
        }
    }
}

impl ScoreEngine {
    /// Best in-window score per player, top `limit` rows.
    ///
    /// Players with no events in `[start, end]` are left out even if they
    /// rank highly on the live board. Ranks are positions in the report.
    #[instrument(level = "debug", skip(self))]
    pub async fn top_players_by_period(
        &self,
        game_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<LeaderboardEntry>> {
        require_id("game_id", game_id)?;
        if end < start {
            return Err(RankdError::invalid_range(format!(
                "period end {end} precedes start {start}"
            )));
        }
        if limit == 0 {
            return Err(RankdError::invalid_range("report limit must be positive"));
        }

        let board = self.game_board(game_id);
        let population = self
            .guarded("range", board.index().range_desc(0, u64::MAX))
            .await?;

        // Discarded on every exit from here on, `?` and cancellation included.
        let period = EphemeralIndex::acquire(self.shared_store(), game_id);

        let mut active = 0usize;
        for ranked in &population {
            let events = self
                .guarded(
                    "in_range",
                    self.ledger().in_range(&ranked.member, game_id, start, end),
                )
                .await?;
            let Some(best) = events.iter().map(|e| e.score).max_by(f64::total_cmp) else {
                continue;
            };
            self.guarded("upsert", period.upsert(&ranked.member, best))
                .await?;
            active += 1;
        }

        let top = self
            .guarded("range", period.range_desc(0, limit - 1))
            .await?;

        let mut entries = Vec::with_capacity(top.len());
        for (offset, ranked) in top.into_iter().enumerate() {
            let Some(identity) = self.resolve(&ranked.member).await else {
                continue;
            };
            entries.push(LeaderboardEntry {
                rank: offset as u64 + 1,
                user_id: ranked.member,
                username: identity.username,
                score: ranked.score,
                rank_source: RankSource::Indexed,
            });
        }

        debug!(
            game_id,
            scanned = population.len(),
            active,
            returned = entries.len(),
            "period report built"
        );
        Ok(entries)
    }

    /// [`Self::top_players_by_period`] over a named window ending now.
    pub async fn top_players_for_period(
        &self,
        game_id: &str,
        period: ReportPeriod,
        limit: u64,
    ) -> Result<Vec<LeaderboardEntry>> {
        let (start, end) = period.window(Utc::now());
        self.top_players_by_period(game_id, start, end, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_period() {
        assert_eq!("week".parse::<ReportPeriod>().unwrap(), ReportPeriod::Week);
        assert_eq!(" Month ".parse::<ReportPeriod>().unwrap(), ReportPeriod::Month);
        assert!(matches!(
            "fortnight".parse::<ReportPeriod>(),
            Err(RankdError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_windows() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();

        let (start, end) = ReportPeriod::Day.window(now);
        assert_eq!(end, now);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 30, 12, 0, 0).unwrap());

        let (start, _) = ReportPeriod::Week.window(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 24, 12, 0, 0).unwrap());

        // Clamped to the end of a shorter month.
        let (start, _) = ReportPeriod::Month.window(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap());

        let (start, _) = ReportPeriod::Year.window(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2023, 3, 31, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_period_json() {
        assert_eq!(serde_json::to_string(&ReportPeriod::Year).unwrap(), "\"year\"");
    }
}
