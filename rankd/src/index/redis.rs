//! Redis ranking store: one sorted set per index.
//!
//! Enable with `redis` feature flag:
//! ```toml
//! rankd = { version = "0.1", features = ["redis"] }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::Pool;
use tracing::{debug, warn};

use super::{IndexKey, RankedMember, RankingIndex, RankingStore};
use crate::error::Result;

/// Sorted-set backed index.
pub struct RedisIndex {
    pool: Pool,
    key: String,
    /// Safety expiry refreshed on every write (period indices only).
    ttl: Option<Duration>,
}

impl RedisIndex {
    pub fn new(pool: Pool, key: String, ttl: Option<Duration>) -> Self {
        Self { pool, key, ttl }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn touch(&self, conn: &mut deadpool_redis::Connection) -> Result<()> {
        if let Some(ttl) = self.ttl {
            let _: () = conn.expire(&self.key, ttl.as_secs().max(1) as i64).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RankingIndex for RedisIndex {
    async fn upsert(&self, member: &str, score: f64) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.zadd(&self.key, member, score).await?;
        self.touch(&mut conn).await
    }

    async fn increment_by(&self, member: &str, delta: f64) -> Result<f64> {
        let mut conn = self.pool.get().await?;
        let score: f64 = conn.zincr(&self.key, member, delta).await?;
        self.touch(&mut conn).await?;
        Ok(score)
    }

    async fn score_of(&self, member: &str) -> Result<Option<f64>> {
        let mut conn = self.pool.get().await?;
        Ok(conn.zscore(&self.key, member).await?)
    }

    async fn rank_of(&self, member: &str) -> Result<Option<u64>> {
        let mut conn = self.pool.get().await?;
        Ok(conn.zrevrank(&self.key, member).await?)
    }

    async fn range_desc(&self, start: u64, end: u64) -> Result<Vec<RankedMember>> {
        let Ok(start) = isize::try_from(start) else {
            return Ok(Vec::new());
        };
        // -1 is the store's "through the last member".
        let stop = isize::try_from(end).unwrap_or(-1);
        let mut conn = self.pool.get().await?;
        let rows: Vec<(String, f64)> = conn.zrevrange_withscores(&self.key, start, stop).await?;
        Ok(rows
            .into_iter()
            .map(|(member, score)| RankedMember::new(member, score))
            .collect())
    }

    async fn remove(&self, member: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let removed: u64 = conn.zrem(&self.key, member).await?;
        Ok(removed > 0)
    }

    async fn size(&self) -> Result<u64> {
        let mut conn = self.pool.get().await?;
        Ok(conn.zcard(&self.key).await?)
    }
}

/// Redis ranking store.
pub struct RedisRankingStore {
    pool: Pool,
    prefix: String,
    period_ttl: Duration,
}

impl RedisRankingStore {
    pub fn new(pool: Pool, prefix: impl Into<String>, period_ttl: Duration) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
            period_ttl,
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl RankingStore for RedisRankingStore {
    fn index(&self, key: &IndexKey) -> Arc<dyn RankingIndex> {
        let ttl = key.is_ephemeral().then_some(self.period_ttl);
        Arc::new(RedisIndex::new(self.pool.clone(), key.render(&self.prefix), ttl))
    }

    fn discard(&self, key: &IndexKey) {
        let rendered = key.render(&self.prefix);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %rendered, "no runtime to discard index, leaving it to expire");
            return;
        };
        let pool = self.pool.clone();
        runtime.spawn(async move {
            match delete_key(&pool, &rendered).await {
                Ok(()) => debug!(key = %rendered, "index deleted"),
                Err(e) => warn!(key = %rendered, error = %e, "index delete failed, leaving it to expire"),
            }
        });
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

async fn delete_key(pool: &Pool, key: &str) -> Result<()> {
    let mut conn = pool.get().await?;
    let _: () = conn.del(key).await?;
    Ok(())
}
