//! Service configuration.

use std::time::Duration;

use ratekeeper_common::time::{constants, is_valid_refresh_interval};
use ratekeeper_fx::source::ECB_DAILY_URL;
use ratekeeper_fx::EngineConfig;
use thiserror::Error;

/// Configuration rejected at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("refresh interval must be between 1 and 168 hours, got {0}")]
    RefreshInterval(u32),

    #[error("fetch timeout cannot be 0")]
    ZeroFetchTimeout,

    #[error("status interval cannot be 0")]
    ZeroStatusInterval,

    #[error("feed URL cannot be empty")]
    EmptyFeedUrl,
}

/// Main service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Age after which cached rates are refreshed.
    pub refresh_interval_hours: u32,
    /// Daily reference-rate document.
    pub feed_url: String,
    /// Upper bound on one feed request.
    pub fetch_timeout: Duration,
    /// How often the background task checks freshness and reports status.
    pub status_interval: Duration,
    /// Postgres URL. Rates are kept in memory only when unset.
    pub database_url: Option<String>,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            refresh_interval_hours: constants::DEFAULT_REFRESH_INTERVAL_HOURS,
            feed_url: ECB_DAILY_URL.to_string(),
            fetch_timeout: constants::fetch_timeout(),
            status_interval: Duration::from_secs(300),
            database_url: None,
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Unparseable numbers keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(hours) = lookup("RATEKEEPER_REFRESH_INTERVAL_HOURS") {
            if let Ok(hours) = hours.trim().parse() {
                config.refresh_interval_hours = hours;
            }
        }

        if let Some(url) = lookup("RATEKEEPER_FEED_URL") {
            config.feed_url = url.trim().to_string();
        }

        if let Some(secs) = lookup("RATEKEEPER_FETCH_TIMEOUT_SECS") {
            if let Ok(secs) = secs.trim().parse() {
                config.fetch_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(secs) = lookup("RATEKEEPER_STATUS_INTERVAL_SECS") {
            if let Ok(secs) = secs.trim().parse() {
                config.status_interval = Duration::from_secs(secs);
            }
        }

        if let Some(url) = lookup("DATABASE_URL") {
            if !url.trim().is_empty() {
                config.database_url = Some(url);
            }
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_refresh_interval(self.refresh_interval_hours) {
            return Err(ConfigError::RefreshInterval(self.refresh_interval_hours));
        }

        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::ZeroFetchTimeout);
        }

        if self.status_interval.is_zero() {
            return Err(ConfigError::ZeroStatusInterval);
        }

        if self.feed_url.is_empty() {
            return Err(ConfigError::EmptyFeedUrl);
        }

        Ok(())
    }

    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            refresh_interval_hours: self.refresh_interval_hours,
            fetch_timeout: self.fetch_timeout,
            ..EngineConfig::default()
        }
    }
}
