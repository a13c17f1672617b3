//! Bounded exponential-backoff retry for asynchronous writes.

use crate::config::RetryConfig;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs fallible async operations with sequential retries.
///
/// After a failure the executor sleeps for the current delay, then tries
/// again with the delay doubled, until `max_retries` retries are spent. The
/// last error is returned unchanged. Retry sequences cannot be cancelled
/// once started.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    retries: Arc<AtomicU64>,
}

impl RetryExecutor {
    /// Creates an executor with the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            retries: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Total number of retries performed by this executor and its clones.
    pub fn retries_performed(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Runs `operation` until it succeeds or retries are exhausted.
    ///
    /// `label` names the operation in log events.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.config.max_attempts();
        let mut attempt = 0u32;

        loop {
            if attempt > 0 {
                let delay = self.config.delay_for_attempt(attempt);
                debug!(operation = label, attempt, ?delay, "waiting before retry");
                tokio::time::sleep(delay).await;
                self.retries.fetch_add(1, Ordering::Relaxed);
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 < attempts => {
                    warn!(
                        operation = label,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %err,
                        "attempt failed, will retry"
                    );
                    attempt += 1;
                }
                Err(err) => {
                    warn!(
                        operation = label,
                        attempts,
                        error = %err,
                        "giving up after final attempt"
                    );
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
