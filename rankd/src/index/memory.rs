//! In-memory ranking store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::tree::{RankTree, SortKey};
use super::{IndexKey, RankedMember, RankingIndex, RankingStore};
use crate::error::Result;

/// Single in-process index: member scores plus an order-statistic tree.
pub struct MemoryIndex {
    inner: RwLock<IndexData>,
}

#[derive(Default)]
struct IndexData {
    /// Scores indexed by member.
    scores: HashMap<String, f64>,
    /// Sorted keys for ranking.
    sorted: RankTree,
}

impl IndexData {
    fn set(&mut self, member: &str, score: f64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.sorted.remove(&SortKey::new(member, old));
        }
        self.sorted.insert(SortKey::new(member, score));
    }
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(IndexData::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RankingIndex for MemoryIndex {
    async fn upsert(&self, member: &str, score: f64) -> Result<()> {
        self.inner.write().set(member, score);
        Ok(())
    }

    async fn increment_by(&self, member: &str, delta: f64) -> Result<f64> {
        let mut data = self.inner.write();
        let score = data.scores.get(member).copied().unwrap_or(0.0) + delta;
        data.set(member, score);
        Ok(score)
    }

    async fn score_of(&self, member: &str) -> Result<Option<f64>> {
        Ok(self.inner.read().scores.get(member).copied())
    }

    async fn rank_of(&self, member: &str) -> Result<Option<u64>> {
        let data = self.inner.read();
        let rank = data
            .scores
            .get(member)
            .and_then(|score| data.sorted.rank(&SortKey::new(member, *score)));
        Ok(rank.map(|r| r as u64))
    }

    async fn range_desc(&self, start: u64, end: u64) -> Result<Vec<RankedMember>> {
        let start = usize::try_from(start).unwrap_or(usize::MAX);
        let end = usize::try_from(end).unwrap_or(usize::MAX);
        let data = self.inner.read();
        Ok(data
            .sorted
            .range(start, end)
            .into_iter()
            .map(|key| RankedMember::new(key.member.clone(), key.score))
            .collect())
    }

    async fn remove(&self, member: &str) -> Result<bool> {
        let mut data = self.inner.write();
        match data.scores.remove(member) {
            Some(score) => {
                data.sorted.remove(&SortKey::new(member, score));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }
}

/// In-memory ranking store: one [`MemoryIndex`] per key.
///
/// An index is allocated on its first write. Reads of a key nobody has
/// written see an empty index and leave the store untouched.
pub struct MemoryRankingStore {
    indices: Arc<DashMap<IndexKey, Arc<MemoryIndex>>>,
}

impl MemoryRankingStore {
    pub fn new() -> Self {
        Self {
            indices: Arc::new(DashMap::new()),
        }
    }

    /// Number of live indices, ephemeral ones included.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn contains(&self, key: &IndexKey) -> bool {
        self.indices.contains_key(key)
    }

    /// Count of period indices still alive. Zero whenever no report is running.
    pub fn ephemeral_count(&self) -> usize {
        self.indices.iter().filter(|e| e.key().is_ephemeral()).count()
    }
}

impl Default for MemoryRankingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RankingStore for MemoryRankingStore {
    fn index(&self, key: &IndexKey) -> Arc<dyn RankingIndex> {
        Arc::new(StoreHandle {
            indices: Arc::clone(&self.indices),
            key: key.clone(),
        })
    }

    fn discard(&self, key: &IndexKey) {
        self.indices.remove(key);
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Handle resolving its index on every call; writes create it.
struct StoreHandle {
    indices: Arc<DashMap<IndexKey, Arc<MemoryIndex>>>,
    key: IndexKey,
}

impl StoreHandle {
    fn existing(&self) -> Option<Arc<MemoryIndex>> {
        self.indices.get(&self.key).map(|e| Arc::clone(e.value()))
    }

    fn or_create(&self) -> Arc<MemoryIndex> {
        let index = self
            .indices
            .entry(self.key.clone())
            .or_insert_with(|| Arc::new(MemoryIndex::new()));
        Arc::clone(index.value())
    }
}

#[async_trait]
impl RankingIndex for StoreHandle {
    async fn upsert(&self, member: &str, score: f64) -> Result<()> {
        self.or_create().upsert(member, score).await
    }

    async fn increment_by(&self, member: &str, delta: f64) -> Result<f64> {
        self.or_create().increment_by(member, delta).await
    }

    async fn score_of(&self, member: &str) -> Result<Option<f64>> {
        match self.existing() {
            Some(index) => index.score_of(member).await,
            None => Ok(None),
        }
    }

    async fn rank_of(&self, member: &str) -> Result<Option<u64>> {
        match self.existing() {
            Some(index) => index.rank_of(member).await,
            None => Ok(None),
        }
    }

    async fn range_desc(&self, start: u64, end: u64) -> Result<Vec<RankedMember>> {
        match self.existing() {
            Some(index) => index.range_desc(start, end).await,
            None => Ok(Vec::new()),
        }
    }

    async fn remove(&self, member: &str) -> Result<bool> {
        match self.existing() {
            Some(index) => index.remove(member).await,
            None => Ok(false),
        }
    }

    async fn size(&self) -> Result<u64> {
        match self.existing() {
            Some(index) => index.size().await,
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let index = MemoryIndex::new();
        index.upsert("alice", 100.0).await.unwrap();
        index.upsert("bob", 150.0).await.unwrap();
        index.upsert("alice", 120.0).await.unwrap();

        assert_eq!(index.size().await.unwrap(), 2);
        assert_eq!(index.score_of("alice").await.unwrap(), Some(120.0));
        assert_eq!(index.rank_of("bob").await.unwrap(), Some(0));
        assert_eq!(index.rank_of("alice").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_increment_creates_and_accumulates() {
        let index = MemoryIndex::new();
        assert_eq!(index.increment_by("alice", 100.0).await.unwrap(), 100.0);
        assert_eq!(index.increment_by("alice", 120.0).await.unwrap(), 220.0);
        assert_eq!(index.increment_by("bob", 150.0).await.unwrap(), 150.0);

        let top = index.range_desc(0, 9).await.unwrap();
        assert_eq!(
            top,
            vec![
                RankedMember::new("alice", 220.0),
                RankedMember::new("bob", 150.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_absent_member() {
        let index = MemoryIndex::new();
        assert_eq!(index.score_of("ghost").await.unwrap(), None);
        assert_eq!(index.rank_of("ghost").await.unwrap(), None);
        assert!(!index.remove("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_range_past_end_is_empty() {
        let index = MemoryIndex::new();
        index.upsert("alice", 1.0).await.unwrap();
        assert!(index.range_desc(5, 10).await.unwrap().is_empty());
        assert_eq!(index.range_desc(0, u64::MAX).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_reranks() {
        let index = MemoryIndex::new();
        index.upsert("a", 3.0).await.unwrap();
        index.upsert("b", 2.0).await.unwrap();
        index.upsert("c", 1.0).await.unwrap();

        assert!(index.remove("a").await.unwrap());
        assert_eq!(index.rank_of("b").await.unwrap(), Some(0));
        assert_eq!(index.rank_of("c").await.unwrap(), Some(1));
        assert_eq!(index.size().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_store_hands_out_shared_handles() {
        let store = MemoryRankingStore::new();
        let a = store.index(&IndexKey::game("g1"));
        let b = store.index(&IndexKey::game("g1"));
        a.upsert("alice", 10.0).await.unwrap();
        assert_eq!(b.score_of("alice").await.unwrap(), Some(10.0));

        let other = store.index(&IndexKey::game("g2"));
        assert_eq!(other.size().await.unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_reads_of_unknown_keys_allocate_nothing() {
        let store = MemoryRankingStore::new();
        store.index(&IndexKey::game("g1")).upsert("alice", 1.0).await.unwrap();

        for i in 0..100 {
            let index = store.index(&IndexKey::game(format!("unplayed-{i}")));
            assert_eq!(index.score_of("alice").await.unwrap(), None);
            assert_eq!(index.rank_of("alice").await.unwrap(), None);
            assert!(index.range_desc(0, 9).await.unwrap().is_empty());
            assert!(!index.remove("alice").await.unwrap());
            assert_eq!(index.size().await.unwrap(), 0);
        }
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_discard_clears_outstanding_handles() {
        let store = MemoryRankingStore::new();
        let key = IndexKey::period("g1");
        let handle = store.index(&key);
        handle.upsert("alice", 80.0).await.unwrap();
        assert_eq!(store.ephemeral_count(), 1);

        store.discard(&key);
        assert_eq!(store.ephemeral_count(), 0);
        assert_eq!(handle.size().await.unwrap(), 0);
    }
}
