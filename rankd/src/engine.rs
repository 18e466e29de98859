//! Score engine: submission and leaderboard reads.
//!
//! A submission touches three independent structures in a fixed order:
//!
//! 1. the game board (overwrite),
//! 2. the history ledger (append),
//! 3. the global board (increment).
//!
//! There is no transaction across them. If a step fails or times out the
//! remaining steps are skipped, the steps already applied stay applied, and
//! the caller gets the step's error. Retrying a failed submission can
//! therefore duplicate history or double-count the global total.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::boards::{GameBoard, GlobalBoard};
use crate::config::EngineConfig;
use crate::error::{RankdError, Result};
use crate::event::{LeaderboardEntry, RankSource, ScoreEvent};
use crate::identity::{Identity, IdentityResolver};
use crate::index::{MemoryRankingStore, RankingIndex, RankingStore};
use crate::ledger::{HistoryLedger, MemoryLedger};

/// Ranked score engine.
///
/// Owns no global state: the ranking store, ledger and identity resolver
/// are handles supplied by whoever wires the service.
pub struct ScoreEngine {
    store: Arc<dyn RankingStore>,
    ledger: Arc<dyn HistoryLedger>,
    identities: Arc<dyn IdentityResolver>,
    global: GlobalBoard,
    config: EngineConfig,
}

impl ScoreEngine {
    pub fn new(
        store: Arc<dyn RankingStore>,
        ledger: Arc<dyn HistoryLedger>,
        identities: Arc<dyn IdentityResolver>,
        config: EngineConfig,
    ) -> Self {
        let global = GlobalBoard::open(store.as_ref());
        Self {
            store,
            ledger,
            identities,
            global,
            config,
        }
    }

    /// Engine over in-process store and ledger.
    pub fn in_memory(identities: Arc<dyn IdentityResolver>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let ledger = MemoryLedger::with_retention(config.retention.clone());
        Ok(Self::new(
            Arc::new(MemoryRankingStore::new()),
            Arc::new(ledger),
            identities,
            config,
        ))
    }

    /// Engine over Redis, using `config.redis`.
    #[cfg(feature = "redis")]
    pub fn connect_redis(identities: Arc<dyn IdentityResolver>, config: EngineConfig) -> Result<Self> {
        use crate::index::RedisRankingStore;
        use crate::ledger::RedisLedger;

        config.validate()?;
        let redis = config
            .redis
            .as_ref()
            .ok_or_else(|| RankdError::config("redis settings missing"))?;
        let pool = deadpool_redis::Config::from_url(redis.connection_url())
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| RankdError::config(e.to_string()))?;

        let store = RedisRankingStore::new(pool.clone(), config.key_prefix.clone(), config.period_ttl());
        let ledger = RedisLedger::new(pool, config.key_prefix.clone(), config.retention.clone());
        Ok(Self::new(Arc::new(store), Arc::new(ledger), identities, config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RankingStore> {
        &self.store
    }

    pub fn game_board(&self, game_id: &str) -> GameBoard {
        GameBoard::open(self.store.as_ref(), game_id)
    }

    pub fn global_board(&self) -> &GlobalBoard {
        &self.global
    }

    /// Submit a score: game board, then history, then global total.
    #[instrument(level = "debug", skip(self))]
    pub async fn submit_score(&self, user_id: &str, game_id: &str, score: f64) -> Result<ScoreEvent> {
        require_id("user_id", user_id)?;
        require_id("game_id", game_id)?;
        if !score.is_finite() {
            return Err(RankdError::invalid_argument(format!(
                "score must be finite, got {score}"
            )));
        }

        let event = ScoreEvent::new(user_id, game_id, score);
        let board = self.game_board(game_id);

        self.guarded("upsert", board.record(user_id, score)).await?;

        if let Err(e) = self.guarded("append", self.ledger.append(&event)).await {
            warn!(user_id, game_id, applied = "leaderboard", error = %e, "partial submission");
            return Err(e);
        }

        match self.guarded("increment", self.global.accumulate(user_id, score)).await {
            Ok(total) => {
                debug!(user_id, game_id, score, total, "score submitted");
                Ok(event)
            }
            Err(e) => {
                warn!(user_id, game_id, applied = "leaderboard,history", error = %e, "partial submission");
                Err(e)
            }
        }
    }

    /// Rows `start..start + count` of a game's leaderboard. `count == 0` reads one row.
    #[instrument(level = "debug", skip(self))]
    pub async fn leaderboard(&self, game_id: &str, start: u64, count: u64) -> Result<Vec<LeaderboardEntry>> {
        require_id("game_id", game_id)?;
        let board = self.game_board(game_id);
        self.read_board(board.index(), game_id, start, count).await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn global_leaderboard(&self, start: u64, count: u64) -> Result<Vec<LeaderboardEntry>> {
        self.read_board(self.global.index(), "global", start, count).await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn user_rank(&self, user_id: &str, game_id: &str) -> Result<LeaderboardEntry> {
        require_id("user_id", user_id)?;
        require_id("game_id", game_id)?;
        let board = self.game_board(game_id);
        self.standing(board.index(), user_id, game_id).await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn user_global_rank(&self, user_id: &str) -> Result<LeaderboardEntry> {
        require_id("user_id", user_id)?;
        self.standing(self.global.index(), user_id, "global").await
    }

    /// Newest first.
    #[instrument(level = "debug", skip(self))]
    pub async fn user_score_history(
        &self,
        user_id: &str,
        game_id: &str,
        limit: usize,
    ) -> Result<Vec<ScoreEvent>> {
        require_id("user_id", user_id)?;
        require_id("game_id", game_id)?;
        if limit == 0 {
            return Err(RankdError::invalid_range("history limit must be positive"));
        }
        self.guarded("recent", self.ledger.recent(user_id, game_id, limit))
            .await
    }

    /// Players on a game's board, for pagination.
    pub async fn leaderboard_size(&self, game_id: &str) -> Result<u64> {
        require_id("game_id", game_id)?;
        let board = self.game_board(game_id);
        self.guarded("size", board.index().size()).await
    }

    pub async fn global_leaderboard_size(&self) -> Result<u64> {
        self.guarded("size", self.global.index().size()).await
    }

    pub async fn health(&self) -> Result<()> {
        self.guarded("ping", self.store.ping()).await
    }

    /// Run one store operation under the configured timeout.
    pub(crate) async fn guarded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let limit = self.config.op_timeout();
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(RankdError::timed_out(op, limit)),
        }
    }

    /// Display identity, or `None` when the row should be omitted.
    pub(crate) async fn resolve(&self, user_id: &str) -> Option<Identity> {
        match self.guarded("lookup", self.identities.lookup(user_id)).await {
            Ok(Some(identity)) => Some(identity),
            Ok(None) => {
                debug!(user_id, "unknown user, row omitted");
                None
            }
            Err(e) => {
                warn!(user_id, error = %e, "identity lookup failed, row omitted");
                None
            }
        }
    }

    pub(crate) fn shared_store(&self) -> Arc<dyn RankingStore> {
        Arc::clone(&self.store)
    }

    pub(crate) fn ledger(&self) -> &dyn HistoryLedger {
        self.ledger.as_ref()
    }

    async fn read_board(
        &self,
        index: &dyn RankingIndex,
        board: &str,
        start: u64,
        count: u64,
    ) -> Result<Vec<LeaderboardEntry>> {
        let end = start.saturating_add(count.max(1) - 1);
        let members = self.guarded("range", index.range_desc(start, end)).await?;

        let mut entries = Vec::with_capacity(members.len());
        for (offset, ranked) in members.into_iter().enumerate() {
            let Some(identity) = self.resolve(&ranked.member).await else {
                continue;
            };
            let position = start + offset as u64;
            let (rank, rank_source) = match self.guarded("rank_of", index.rank_of(&ranked.member)).await {
                Ok(Some(rank)) => (rank + 1, RankSource::Indexed),
                Ok(None) => {
                    warn!(board, user_id = %ranked.member, position, "member left the board mid-read, using positional rank");
                    (position + 1, RankSource::Positional)
                }
                Err(e) => {
                    warn!(board, user_id = %ranked.member, position, error = %e, "rank lookup unavailable, using positional rank");
                    (position + 1, RankSource::Positional)
                }
            };
            entries.push(LeaderboardEntry {
                rank,
                user_id: ranked.member,
                username: identity.username,
                score: ranked.score,
                rank_source,
            });
        }
        Ok(entries)
    }

    async fn standing(&self, index: &dyn RankingIndex, user_id: &str, board: &str) -> Result<LeaderboardEntry> {
        let missing = || RankdError::not_found(format!("{user_id} on {board} leaderboard"));

        let score = self
            .guarded("score_of", index.score_of(user_id))
            .await?
            .ok_or_else(missing)?;
        let rank = self
            .guarded("rank_of", index.rank_of(user_id))
            .await?
            .ok_or_else(missing)?;
        let identity = self.resolve(user_id).await.ok_or_else(missing)?;

        Ok(LeaderboardEntry {
            rank: rank + 1,
            user_id: user_id.to_string(),
            username: identity.username,
            score,
            rank_source: RankSource::Indexed,
        })
    }
}

pub(crate) fn require_id(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RankdError::invalid_argument(format!("{name} must not be empty")));
    }
    Ok(())
}
