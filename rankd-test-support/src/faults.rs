//! Fault-injecting wrappers around the rankd store seams.
//!
//! A [`FaultPlan`] is shared by every wrapper. Operations are named after
//! the trait method (`upsert`, `rank_of`, `append`, `lookup`, ...). Index
//! operations may also be targeted per board kind with a scope prefix:
//! `game.rank_of`, `global.increment_by`, `period.upsert`.
//!
//! ```ignore
//! let plan = FaultPlan::new();
//! plan.fail("global.increment_by");
//! plan.stall("append", Duration::from_secs(5));
//! let store = Arc::new(FaultyStore::new(Arc::new(MemoryRankingStore::new()), plan.clone()));
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use rankd::{
    HistoryLedger, Identity, IdentityResolver, IndexKey, RankdError, RankedMember, RankingIndex,
    RankingStore, Result, ScoreEvent,
};

use crate::chaos::{ChaosEvent, ChaosMonkey};

/// Injected behaviour for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Return `StoreUnavailable` without reaching the store.
    Fail,
    /// Sleep, then reach the store.
    Stall(Duration),
}

struct ChaosRule {
    ops: HashSet<String>,
    monkey: ChaosMonkey,
}

/// Shared fault schedule and call counter.
#[derive(Default)]
pub struct FaultPlan {
    faults: DashMap<String, Fault>,
    calls: DashMap<String, usize>,
    chaos: RwLock<Option<Arc<ChaosRule>>>,
}

impl FaultPlan {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, op: &str) {
        self.faults.insert(op.to_string(), Fault::Fail);
    }

    pub fn stall(&self, op: &str, duration: Duration) {
        self.faults.insert(op.to_string(), Fault::Stall(duration));
    }

    /// Let `op` through again.
    pub fn clear(&self, op: &str) {
        self.faults.remove(op);
    }

    /// Roll `monkey` on every call to one of `ops`.
    pub fn with_chaos(&self, ops: &[&str], monkey: ChaosMonkey) {
        let rule = ChaosRule {
            ops: ops.iter().map(|op| op.to_string()).collect(),
            monkey,
        };
        *self.chaos.write() = Some(Arc::new(rule));
    }

    /// Chaos events fired so far.
    pub fn chaos_events(&self) -> usize {
        self.chaos
            .read()
            .as_ref()
            .map_or(0, |rule| rule.monkey.events_triggered())
    }

    /// Calls seen for `op` (plain or scoped name).
    pub fn calls(&self, op: &str) -> usize {
        self.calls.get(op).map_or(0, |n| *n)
    }

    fn record(&self, op: &str) {
        *self.calls.entry(op.to_string()).or_insert(0) += 1;
    }

    /// Apply whatever is scheduled for `op` within `scope`.
    pub async fn check(&self, scope: Option<&str>, op: &'static str) -> Result<()> {
        let scoped = scope.map(|s| format!("{s}.{op}"));

        self.record(op);
        if let Some(name) = &scoped {
            self.record(name);
        }

        let fault = scoped
            .as_deref()
            .and_then(|name| self.faults.get(name).map(|f| f.value().clone()))
            .or_else(|| self.faults.get(op).map(|f| f.value().clone()));

        match fault {
            Some(Fault::Fail) => return Err(RankdError::unavailable(op, "injected fault")),
            Some(Fault::Stall(duration)) => tokio::time::sleep(duration).await,
            None => {}
        }

        let rule = self.chaos.read().clone();
        if let Some(rule) = rule {
            let targeted = rule.ops.contains(op)
                || scoped.as_deref().is_some_and(|name| rule.ops.contains(name));
            if targeted {
                match rule.monkey.decide() {
                    ChaosEvent::Fail => return Err(RankdError::unavailable(op, "chaos")),
                    ChaosEvent::Delay(d) => tokio::time::sleep(d).await,
                    ChaosEvent::None => {}
                }
            }
        }
        Ok(())
    }
}

fn scope_of(key: &IndexKey) -> &'static str {
    match key {
        IndexKey::Game(_) => "game",
        IndexKey::Global => "global",
        IndexKey::Period { .. } => "period",
    }
}

/// Ranking store whose indices consult a [`FaultPlan`].
pub struct FaultyStore {
    inner: Arc<dyn RankingStore>,
    plan: Arc<FaultPlan>,
    live_periods: DashMap<IndexKey, ()>,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn RankingStore>, plan: Arc<FaultPlan>) -> Self {
        Self {
            inner,
            plan,
            live_periods: DashMap::new(),
        }
    }

    /// Period indices handed out and not yet discarded.
    pub fn live_periods(&self) -> usize {
        self.live_periods.len()
    }
}

#[async_trait]
impl RankingStore for FaultyStore {
    fn index(&self, key: &IndexKey) -> Arc<dyn RankingIndex> {
        if key.is_ephemeral() {
            self.live_periods.insert(key.clone(), ());
        }
        Arc::new(FaultyIndex {
            inner: self.inner.index(key),
            plan: Arc::clone(&self.plan),
            scope: scope_of(key),
        })
    }

    fn discard(&self, key: &IndexKey) {
        self.plan.record("discard");
        self.live_periods.remove(key);
        self.inner.discard(key);
    }

    async fn ping(&self) -> Result<()> {
        self.plan.check(None, "ping").await?;
        self.inner.ping().await
    }
}

/// One index behind a [`FaultPlan`].
pub struct FaultyIndex {
    inner: Arc<dyn RankingIndex>,
    plan: Arc<FaultPlan>,
    scope: &'static str,
}

impl FaultyIndex {
    async fn check(&self, op: &'static str) -> Result<()> {
        self.plan.check(Some(self.scope), op).await
    }
}

#[async_trait]
impl RankingIndex for FaultyIndex {
    async fn upsert(&self, member: &str, score: f64) -> Result<()> {
        self.check("upsert").await?;
        self.inner.upsert(member, score).await
    }

    async fn increment_by(&self, member: &str, delta: f64) -> Result<f64> {
        self.check("increment_by").await?;
        self.inner.increment_by(member, delta).await
    }

    async fn score_of(&self, member: &str) -> Result<Option<f64>> {
        self.check("score_of").await?;
        self.inner.score_of(member).await
    }

    async fn rank_of(&self, member: &str) -> Result<Option<u64>> {
        self.check("rank_of").await?;
        self.inner.rank_of(member).await
    }

    async fn range_desc(&self, start: u64, end: u64) -> Result<Vec<RankedMember>> {
        self.check("range_desc").await?;
        self.inner.range_desc(start, end).await
    }

    async fn remove(&self, member: &str) -> Result<bool> {
        self.check("remove").await?;
        self.inner.remove(member).await
    }

    async fn size(&self) -> Result<u64> {
        self.check("size").await?;
        self.inner.size().await
    }
}

/// History ledger behind a [`FaultPlan`].
pub struct FaultyLedger {
    inner: Arc<dyn HistoryLedger>,
    plan: Arc<FaultPlan>,
}

impl FaultyLedger {
    pub fn new(inner: Arc<dyn HistoryLedger>, plan: Arc<FaultPlan>) -> Self {
        Self { inner, plan }
    }
}

#[async_trait]
impl HistoryLedger for FaultyLedger {
    async fn append(&self, event: &ScoreEvent) -> Result<()> {
        self.plan.check(None, "append").await?;
        self.inner.append(event).await
    }

    async fn recent(&self, user_id: &str, game_id: &str, limit: usize) -> Result<Vec<ScoreEvent>> {
        self.plan.check(None, "recent").await?;
        self.inner.recent(user_id, game_id, limit).await
    }

    async fn in_range(
        &self,
        user_id: &str,
        game_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScoreEvent>> {
        self.plan.check(None, "in_range").await?;
        self.inner.in_range(user_id, game_id, start, end).await
    }
}

/// Identity resolver behind a [`FaultPlan`]; `lookup` faults can also be
/// pinned to single users.
pub struct FaultyResolver {
    inner: Arc<dyn IdentityResolver>,
    plan: Arc<FaultPlan>,
    broken_users: DashMap<String, ()>,
}

impl FaultyResolver {
    pub fn new(inner: Arc<dyn IdentityResolver>, plan: Arc<FaultPlan>) -> Self {
        Self {
            inner,
            plan,
            broken_users: DashMap::new(),
        }
    }

    /// Make every lookup of `user_id` fail.
    pub fn break_user(&self, user_id: &str) {
        self.broken_users.insert(user_id.to_string(), ());
    }
}

#[async_trait]
impl IdentityResolver for FaultyResolver {
    async fn lookup(&self, user_id: &str) -> Result<Option<Identity>> {
        self.plan.check(None, "lookup").await?;
        if self.broken_users.contains_key(user_id) {
            return Err(RankdError::unavailable("lookup", format!("directory error for {user_id}")));
        }
        self.inner.lookup(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rankd::MemoryRankingStore;

    #[tokio::test]
    async fn test_scoped_fault_only_hits_its_board() {
        let plan = FaultPlan::new();
        plan.fail("global.increment_by");
        let store = FaultyStore::new(Arc::new(MemoryRankingStore::new()), plan.clone());

        let game = store.index(&IndexKey::game("g1"));
        let global = store.index(&IndexKey::Global);

        assert_eq!(game.increment_by("alice", 5.0).await.unwrap(), 5.0);
        assert!(global.increment_by("alice", 5.0).await.unwrap_err().is_retriable());

        assert_eq!(plan.calls("increment_by"), 2);
        assert_eq!(plan.calls("global.increment_by"), 1);
    }

    #[tokio::test]
    async fn test_clear_restores_calls() {
        let plan = FaultPlan::new();
        plan.fail("upsert");
        let store = FaultyStore::new(Arc::new(MemoryRankingStore::new()), plan.clone());
        let index = store.index(&IndexKey::game("g1"));

        assert!(index.upsert("alice", 1.0).await.is_err());
        plan.clear("upsert");
        index.upsert("alice", 1.0).await.unwrap();
        assert_eq!(index.size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_period_tracking() {
        let plan = FaultPlan::new();
        let store = FaultyStore::new(Arc::new(MemoryRankingStore::new()), plan.clone());

        let key = IndexKey::period("g1");
        let _ = store.index(&key);
        assert_eq!(store.live_periods(), 1);

        store.discard(&key);
        assert_eq!(store.live_periods(), 0);
        assert_eq!(plan.calls("discard"), 1);
    }

    #[tokio::test]
    async fn test_chaos_targets_named_ops() {
        let plan = FaultPlan::new();
        plan.with_chaos(&["append"], ChaosMonkey::new().with_failure_probability(1.0));

        assert!(plan.check(None, "append").await.is_err());
        assert!(plan.check(None, "recent").await.is_ok());
        assert_eq!(plan.chaos_events(), 1);
    }
}
