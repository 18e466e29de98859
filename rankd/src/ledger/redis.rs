//! Redis history ledger: one sorted set per (user, game), scored by
//! timestamp in milliseconds, JSON record as member.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::Pool;

use super::{decode, encode, HistoryLedger, RetentionPolicy};
use crate::error::Result;
use crate::event::ScoreEvent;

pub struct RedisLedger {
    pool: Pool,
    prefix: String,
    retention: RetentionPolicy,
}

impl RedisLedger {
    pub fn new(pool: Pool, prefix: impl Into<String>, retention: RetentionPolicy) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
            retention,
        }
    }

    fn key(&self, user_id: &str, game_id: &str) -> String {
        format!("{}history:{user_id}:{game_id}", self.prefix)
    }
}

#[async_trait]
impl HistoryLedger for RedisLedger {
    async fn append(&self, event: &ScoreEvent) -> Result<()> {
        let key = self.key(&event.user_id, &event.game_id);
        let member = encode(event)?;

        let mut pipe = redis::pipe();
        pipe.zadd(&key, member, event.timestamp.timestamp_millis()).ignore();
        if let Some(cutoff) = self.retention.cutoff(event.timestamp) {
            pipe.zrembyscore(&key, "-inf", format!("({}", cutoff.timestamp_millis()))
                .ignore();
        }
        if let Some(max) = self.retention.max_events_per_key {
            // Keep the newest `max`: drop ranks 0..=-(max + 1).
            let stop = -(max as isize) - 1;
            pipe.zremrangebyrank(&key, 0, stop).ignore();
        }

        let mut conn = self.pool.get().await?;
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn recent(&self, user_id: &str, game_id: &str, limit: usize) -> Result<Vec<ScoreEvent>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let stop = isize::try_from(limit).map(|l| l - 1).unwrap_or(-1);
        let mut conn = self.pool.get().await?;
        let raw: Vec<String> = conn.zrevrange(self.key(user_id, game_id), 0, stop).await?;
        Ok(raw
            .iter()
            .filter_map(|r| decode(r, user_id, game_id))
            .collect())
    }

    async fn in_range(
        &self,
        user_id: &str,
        game_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScoreEvent>> {
        if end < start {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.get().await?;
        let raw: Vec<String> = conn
            .zrangebyscore(
                self.key(user_id, game_id),
                start.timestamp_millis(),
                end.timestamp_millis(),
            )
            .await?;
        // Scores are whole milliseconds; the exact bounds are checked on the decoded events.
        Ok(raw
            .iter()
            .filter_map(|r| decode(r, user_id, game_id))
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .collect())
    }
}
