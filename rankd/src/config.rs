//! Engine configuration.
//!
//! Loaded from JSON (file IO optional), then overlaid from the environment.
//! Every field has a default, so `{}` is a valid config.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RankdError, Result};
use crate::ledger::RetentionPolicy;

/// Root engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout applied to every individual index/ledger operation.
    pub op_timeout_ms: u64,
    /// Prepended to every key in the external store.
    pub key_prefix: String,
    /// History kept per (user, game).
    pub retention: RetentionPolicy,
    /// Safety expiry for temporary period keys in the external store.
    pub period_ttl_secs: u64,
    /// External store connection. `None` runs fully in memory.
    pub redis: Option<RedisConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            op_timeout_ms: 2000,
            key_prefix: String::new(),
            retention: RetentionPolicy::default(),
            period_ttl_secs: 300,
            redis: None,
        }
    }
}

/// Redis connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// `host:port` or a full `redis://` URL.
    pub url: String,
    /// Logical database number.
    #[serde(default)]
    pub db: Option<u32>,
}

impl RedisConfig {
    pub fn connection_url(&self) -> String {
        let base = if self.url.contains("://") {
            self.url.trim_end_matches('/').to_string()
        } else {
            format!("redis://{}", self.url.trim_end_matches('/'))
        };
        match self.db {
            Some(db) => format!("{base}/{db}"),
            None => base,
        }
    }
}

impl EngineConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| RankdError::config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RankdError::config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Overlay `RANKD_*` / `REDIS_*` environment variables.
    pub fn with_env(self) -> Result<Self> {
        self.with_vars(|name| std::env::var(name).ok())
    }

    /// Overlay variables from `lookup`; the environment-free core of [`Self::with_env`].
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup("RANKD_OP_TIMEOUT_MS") {
            self.op_timeout_ms = parse_var("RANKD_OP_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("RANKD_KEY_PREFIX") {
            self.key_prefix = v;
        }
        if let Some(v) = lookup("RANKD_HISTORY_MAX_EVENTS") {
            self.retention.max_events_per_key = match v.as_str() {
                "" | "unbounded" => None,
                n => Some(parse_var("RANKD_HISTORY_MAX_EVENTS", n)?),
            };
        }
        if let Some(v) = lookup("RANKD_HISTORY_MAX_AGE_SECS") {
            let secs: u64 = parse_var("RANKD_HISTORY_MAX_AGE_SECS", &v)?;
            self.retention.max_age = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(v) = lookup("RANKD_PERIOD_TTL_SECS") {
            self.period_ttl_secs = parse_var("RANKD_PERIOD_TTL_SECS", &v)?;
        }
        if let Some(url) = lookup("REDIS_URL").filter(|u| !u.is_empty()) {
            let db = match lookup("REDIS_DB").filter(|d| !d.is_empty()) {
                Some(d) => Some(parse_var("REDIS_DB", &d)?),
                None => None,
            };
            self.redis = Some(RedisConfig { url, db });
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.op_timeout_ms == 0 {
            return Err(RankdError::config("op_timeout_ms must be positive"));
        }
        if self.retention.max_events_per_key == Some(0) {
            return Err(RankdError::config("retention.max_events_per_key must be positive"));
        }
        if self.period_ttl_secs == 0 {
            return Err(RankdError::config("period_ttl_secs must be positive"));
        }
        Ok(())
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn period_ttl(&self) -> Duration {
        Duration::from_secs(self.period_ttl_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| RankdError::config(format!("{name}={value:?}: {e}")))
}
