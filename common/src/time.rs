//! Time utilities and constants for Ratekeeper.

use chrono::Duration;

/// Rate cache timing constants.
pub mod constants {
    use super::Duration;

    /// Default refresh interval in hours (daily feed).
    pub const DEFAULT_REFRESH_INTERVAL_HOURS: u32 = 24;

    /// Shortest accepted refresh interval in hours.
    pub const MIN_REFRESH_INTERVAL_HOURS: u32 = 1;

    /// Longest accepted refresh interval in hours (one week).
    pub const MAX_REFRESH_INTERVAL_HOURS: u32 = 168;

    /// Remote fetch timeout (10 seconds).
    pub fn fetch_timeout() -> std::time::Duration {
        std::time::Duration::from_secs(10)
    }

    /// Minimum delay between fetch attempts while serving stale data
    /// (15 minutes).
    pub fn failure_backoff() -> Duration {
        Duration::minutes(15)
    }

    /// Age past which persisted snapshots are deleted (7 days).
    pub fn snapshot_retention() -> Duration {
        Duration::days(7)
    }
}

/// Whether `hours` is an accepted refresh interval.
pub fn is_valid_refresh_interval(hours: u32) -> bool {
    (constants::MIN_REFRESH_INTERVAL_HOURS..=constants::MAX_REFRESH_INTERVAL_HOURS)
        .contains(&hours)
}

/// Refresh interval as a duration.
pub fn refresh_interval(hours: u32) -> Duration {
    Duration::hours(i64::from(hours))
}

/// Fractional hours, for log fields.
pub fn as_hours(duration: Duration) -> f64 {
    duration.num_seconds() as f64 / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_interval_bounds() {
        assert!(!is_valid_refresh_interval(0));
        assert!(is_valid_refresh_interval(1));
        assert!(is_valid_refresh_interval(24));
        assert!(is_valid_refresh_interval(168));
        assert!(!is_valid_refresh_interval(169));
    }

    #[test]
    fn test_as_hours() {
        assert_eq!(as_hours(Duration::minutes(90)), 1.5);
        assert_eq!(refresh_interval(30), Duration::hours(30));
    }
}
