//! # rankd
//!
//! Ranked score engine: per-game and global leaderboards, per-player score
//! history, and on-demand period reports.
//!
//! ## Features
//!
//! - **Game boards**: latest score per player, rank and range queries
//! - **Global board**: lifetime score totals across games
//! - **History**: append-only per (player, game) log with retention
//! - **Period reports**: best in-window score per player, computed per call
//! - **Backends**: in-memory, or Redis sorted sets (`redis` feature)
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rankd::{EngineConfig, ReportPeriod, ScoreEngine, UserDirectory};
//!
//! let users = UserDirectory::new();
//! users.register("u1", "alice");
//!
//! let engine = ScoreEngine::in_memory(Arc::new(users), EngineConfig::default().with_env()?)?;
//! engine.submit_score("u1", "tetris", 1200.0).await?;
//!
//! let top = engine.leaderboard("tetris", 0, 10).await?;
//! let week = engine.top_players_for_period("tetris", ReportPeriod::Week, 10).await?;
//! ```

pub mod boards;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod identity;
pub mod index;
pub mod ledger;
pub mod period;

#[cfg(feature = "telemetry")]
pub mod telemetry;

// Re-exports
pub use boards::{GameBoard, GlobalBoard};
pub use config::{EngineConfig, RedisConfig};
pub use engine::ScoreEngine;
pub use error::{RankdError, Result};
pub use event::{LeaderboardEntry, RankSource, ScoreEvent};
pub use identity::{Identity, IdentityResolver, UserDirectory};
pub use index::{
    EphemeralIndex, IndexKey, MemoryIndex, MemoryRankingStore, RankedMember, RankingIndex,
    RankingStore,
};
pub use ledger::{HistoryLedger, MemoryLedger, RetentionPolicy};
pub use period::ReportPeriod;

#[cfg(feature = "redis")]
pub use index::{RedisIndex, RedisRankingStore};
#[cfg(feature = "redis")]
pub use ledger::RedisLedger;

#[cfg(feature = "telemetry")]
pub use telemetry::{init_tracing, TracingConfig};
