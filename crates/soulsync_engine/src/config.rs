//! Configuration for the sync engine.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the backend base URL.
pub const ENV_URL: &str = "SOULSYNC_URL";
/// Environment variable holding the backend API key.
pub const ENV_API_KEY: &str = "SOULSYNC_API_KEY";
/// Environment variable holding the session file path.
pub const ENV_SESSION_PATH: &str = "SOULSYNC_SESSION_PATH";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Backend base URL (e.g., "https://abc.example.co").
    pub backend_url: Option<String>,
    /// Backend API key.
    pub api_key: Option<String>,
    /// How long leaderboard pages stay cached.
    pub leaderboard_ttl: Duration,
    /// How long the personal-bests slot stays cached.
    pub personal_bests_ttl: Duration,
    /// Quiet period before a debounced save is written.
    pub save_debounce: Duration,
    /// Retry configuration for writes.
    pub retry: RetryConfig,
    /// HTTP request timeout.
    pub request_timeout: Duration,
    /// Interval of the background cache sweep.
    pub cache_sweep_interval: Duration,
    /// Where to persist the anonymous session, if anywhere.
    pub session_path: Option<PathBuf>,
}

impl SyncConfig {
    /// Creates a configuration for the given backend.
    pub fn new(backend_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            backend_url: Some(backend_url.into()),
            api_key: Some(api_key.into()),
            ..Self::unconfigured()
        }
    }

    /// Creates a configuration without credentials. Services built from it
    /// report unavailable and fail soft.
    pub fn unconfigured() -> Self {
        Self {
            backend_url: None,
            api_key: None,
            leaderboard_ttl: Duration::from_secs(2 * 60),
            personal_bests_ttl: Duration::from_secs(10 * 60),
            save_debounce: Duration::from_secs(2),
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(10),
            cache_sweep_interval: Duration::from_secs(5 * 60),
            session_path: None,
        }
    }

    /// Reads credentials and the session path from the environment.
    ///
    /// Missing or blank variables leave the corresponding field unset.
    pub fn from_env() -> Self {
        let read = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            backend_url: read(ENV_URL),
            api_key: read(ENV_API_KEY),
            session_path: read(ENV_SESSION_PATH).map(PathBuf::from),
            ..Self::unconfigured()
        }
    }

    /// Returns the URL and API key if both are present.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.backend_url, &self.api_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }

    /// Returns true if both credentials are present.
    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }

    /// Sets the leaderboard cache TTL.
    pub fn with_leaderboard_ttl(mut self, ttl: Duration) -> Self {
        self.leaderboard_ttl = ttl;
        self
    }

    /// Sets the personal-bests cache TTL.
    pub fn with_personal_bests_ttl(mut self, ttl: Duration) -> Self {
        self.personal_bests_ttl = ttl;
        self
    }

    /// Sets the save debounce window.
    pub fn with_save_debounce(mut self, window: Duration) -> Self {
        self.save_debounce = window;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the background cache sweep interval.
    pub fn with_cache_sweep_interval(mut self, interval: Duration) -> Self {
        self.cache_sweep_interval = interval;
        self
    }

    /// Sets the session file path.
    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = Some(path.into());
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::unconfigured()
    }
}

/// Configuration for retry behavior.
///
/// Delays double after every failed attempt, with no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Total number of attempts, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("https://saves.example.com", "anon-key")
            .with_leaderboard_ttl(Duration::from_secs(30))
            .with_save_debounce(Duration::from_millis(500))
            .with_timeout(Duration::from_secs(60));

        assert_eq!(
            config.credentials(),
            Some(("https://saves.example.com", "anon-key"))
        );
        assert_eq!(config.leaderboard_ttl, Duration::from_secs(30));
        assert_eq!(config.save_debounce, Duration::from_millis(500));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn unconfigured_has_no_credentials() {
        let config = SyncConfig::unconfigured();
        assert!(!config.is_configured());

        let mut half = SyncConfig::unconfigured();
        half.backend_url = Some("https://saves.example.com".into());
        assert!(!half.is_configured());
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts(), 1);
    }

    #[test]
    fn retry_delay_doubles() {
        let config = RetryConfig::new(5, Duration::from_millis(100));

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(800));
    }

    #[test]
    fn retry_delay_saturates() {
        let config = RetryConfig::new(100, Duration::from_secs(1));
        assert!(config.delay_for_attempt(80) >= Duration::from_secs(u64::from(u32::MAX)));
    }
}
