//! Structured logging setup for services embedding rankd.
//!
//! # Example
//!
//! ```rust,ignore
//! use rankd::telemetry::{init_tracing, TracingConfig};
//!
//! // Console output at info
//! init_tracing(TracingConfig::default())?;
//!
//! // JSON lines for log aggregation
//! init_tracing(TracingConfig::new("leaderboard-api").with_level("info,rankd=debug").with_json())?;
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{RankdError, Result};

/// Tracing configuration.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Service name, attached to the startup event.
    pub service_name: String,
    /// Log level filter (e.g., "info", "debug", "rankd=debug,tokio=warn").
    /// `RUST_LOG` takes precedence when set.
    pub log_level: String,
    /// Output logs as JSON (useful for log aggregation).
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "rankd".into(),
            log_level: "info".into(),
            json_output: false,
        }
    }
}

impl TracingConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_json(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_tracing(config: TracingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if config.json_output {
        let fmt_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        registry.with(fmt_layer).try_init()
    } else {
        let fmt_layer = fmt::layer().with_target(true).compact();
        registry.with(fmt_layer).try_init()
    };
    installed.map_err(|e| RankdError::config(format!("tracing already initialised: {e}")))?;

    tracing::info!(service = %config.service_name, version = env!("CARGO_PKG_VERSION"), "tracing initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new("test-service")
            .with_level("debug")
            .with_json();

        assert_eq!(config.service_name, "test-service");
        assert_eq!(config.log_level, "debug");
        assert!(config.json_output);
    }

    #[test]
    fn test_second_init_is_an_error() {
        // The first call may race other tests; the second never succeeds.
        let _ = init_tracing(TracingConfig::default().with_level("warn"));
        assert!(init_tracing(TracingConfig::default()).is_err());
    }
}
