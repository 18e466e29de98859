//! Error types for rankd.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RankdError>;

#[derive(Error, Debug)]
pub enum RankdError {
    /// Member absent from an index, or identity not resolvable.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Ranking or history store unreachable or timed out. Retriable by the caller.
    #[error("store unavailable during {op}: {reason}")]
    StoreUnavailable { op: String, reason: String },

    #[error("invalid range: {reason}")]
    InvalidRange { reason: String },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("config error: {reason}")]
    Config { reason: String },
}

impl RankdError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn unavailable(op: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            op: op.into(),
            reason: reason.into(),
        }
    }

    pub fn timed_out(op: impl Into<String>, after: Duration) -> Self {
        Self::StoreUnavailable {
            op: op.into(),
            reason: format!("timed out after {}ms", after.as_millis()),
        }
    }

    pub fn invalid_range(reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Only store outages are worth retrying; everything else fails the same way twice.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::redis::RedisError> for RankdError {
    fn from(e: deadpool_redis::redis::RedisError) -> Self {
        Self::unavailable("redis", e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::PoolError> for RankdError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Self::unavailable("redis pool", e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(RankdError::not_found("alice in g1").is_not_found());
        assert!(!RankdError::not_found("x").is_retriable());
        assert!(RankdError::unavailable("upsert", "connection reset").is_retriable());
        assert!(RankdError::timed_out("append", Duration::from_millis(5)).is_retriable());
        assert!(!RankdError::invalid_range("end before start").is_retriable());
    }

    #[test]
    fn test_timeout_message() {
        let err = RankdError::timed_out("rank_of", Duration::from_millis(250));
        assert_eq!(
            err.to_string(),
            "store unavailable during rank_of: timed out after 250ms"
        );
    }
}
