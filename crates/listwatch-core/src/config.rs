use crate::{Result, WatchError};
use std::time::Duration;

/// Origin used to resolve relative listing and photo URLs.
pub const DEFAULT_ORIGIN: &str = "https://www.vinted.it";

/// Poll interval given to queries registered without one (seconds).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Pause between two consecutive fetches inside one poll cycle (seconds).
pub const DEFAULT_PACING_DELAY_SECS: u64 = 3;

/// Upper bound on a single page fetch (seconds).
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;

/// Delay before the first scheduled poll cycle (seconds).
pub const DEFAULT_FIRST_CYCLE_DELAY_SECS: u64 = 10;

/// When a query's `last_polled_at` moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampPolicy {
    /// Only after a poll that recovered at least one record.
    #[default]
    OnSuccess,
    /// After every poll attempt, inconclusive ones included.
    Always,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub origin: String,
    pub default_poll_interval: Duration,
    pub pacing_delay: Duration,
    pub fetch_timeout: Duration,
    pub first_cycle_delay: Duration,
    pub cycle_interval: Duration,
    pub timestamp_policy: TimestampPolicy,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            default_poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            pacing_delay: Duration::from_secs(DEFAULT_PACING_DELAY_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            first_cycle_delay: Duration::from_secs(DEFAULT_FIRST_CYCLE_DELAY_SECS),
            cycle_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timestamp_policy: TimestampPolicy::OnSuccess,
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.origin)
            .map_err(|e| WatchError::Config(format!("origin '{}' is not a URL: {}", self.origin, e)))?;
        if self.default_poll_interval.is_zero() {
            return Err(WatchError::Config("poll interval must be positive".to_string()));
        }
        if self.cycle_interval.is_zero() {
            return Err(WatchError::Config("cycle interval must be positive".to_string()));
        }
        if self.fetch_timeout.is_zero() {
            return Err(WatchError::Config("fetch timeout must be positive".to_string()));
        }
        Ok(())
    }
}
