//! In-memory history ledger.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{decode, encode, HistoryLedger, RetentionPolicy};
use crate::error::Result;
use crate::event::ScoreEvent;

/// (timestamp millis, arrival sequence) so equal timestamps never overwrite.
type Slot = (i64, u64);

/// In-memory ledger: (user_id, game_id) -> time-ordered encoded records.
pub struct MemoryLedger {
    logs: DashMap<(String, String), BTreeMap<Slot, String>>,
    seq: AtomicU64,
    retention: RetentionPolicy,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::with_retention(RetentionPolicy::default())
    }

    pub fn with_retention(retention: RetentionPolicy) -> Self {
        Self {
            logs: DashMap::new(),
            seq: AtomicU64::new(0),
            retention,
        }
    }

    /// Store a pre-encoded record verbatim (history import).
    ///
    /// The record is not validated; unreadable records are skipped on read.
    pub fn append_record(
        &self,
        user_id: &str,
        game_id: &str,
        timestamp: DateTime<Utc>,
        raw: impl Into<String>,
    ) {
        let slot = (timestamp.timestamp_millis(), self.seq.fetch_add(1, Ordering::Relaxed));
        let mut log = self
            .logs
            .entry((user_id.to_string(), game_id.to_string()))
            .or_default();
        // Age is measured from the newest record held, not from an imported old one.
        let newest = log
            .last_key_value()
            .and_then(|((ms, _), _)| DateTime::from_timestamp_millis(*ms))
            .map_or(timestamp, |newest| newest.max(timestamp));
        log.insert(slot, raw.into());
        self.enforce(&mut log, newest);
    }

    /// Stored records for (user, game), malformed ones included.
    pub fn record_count(&self, user_id: &str, game_id: &str) -> usize {
        self.logs
            .get(&(user_id.to_string(), game_id.to_string()))
            .map(|log| log.len())
            .unwrap_or(0)
    }

    fn enforce(&self, log: &mut BTreeMap<Slot, String>, now: DateTime<Utc>) {
        if let Some(cutoff) = self.retention.cutoff(now) {
            let keep = log.split_off(&(cutoff.timestamp_millis(), 0));
            *log = keep;
        }
        if let Some(max) = self.retention.max_events_per_key {
            while log.len() > max {
                log.pop_first();
            }
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryLedger for MemoryLedger {
    async fn append(&self, event: &ScoreEvent) -> Result<()> {
        let raw = encode(event)?;
        self.append_record(&event.user_id, &event.game_id, event.timestamp, raw);
        Ok(())
    }

    async fn recent(&self, user_id: &str, game_id: &str, limit: usize) -> Result<Vec<ScoreEvent>> {
        let Some(log) = self.logs.get(&(user_id.to_string(), game_id.to_string())) else {
            return Ok(Vec::new());
        };
        Ok(log
            .values()
            .rev()
            .take(limit)
            .filter_map(|raw| decode(raw, user_id, game_id))
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
        let Some(log) = self.logs.get(&(user_id.to_string(), game_id.to_string())) else {
            return Ok(Vec::new());
        };
        // Slots are millisecond buckets; the exact bounds are checked on the decoded events.
        let lo = (start.timestamp_millis(), 0);
        let hi = (end.timestamp_millis(), u64::MAX);
        Ok(log
            .range(lo..=hi)
            .filter_map(|(_, raw)| decode(raw, user_id, game_id))
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .collect())
    }
}
