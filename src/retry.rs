//! Bounded retries with exponential backoff.
//!
//! Transient failures (`Store`, `Busy`) earn a small retry budget inside
//! the component that owns the transaction; anything the taxonomy marks
//! permanent fails on the spot.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::game::EngineError;
use crate::metrics::ServerMetrics;

/// Shape of one retry schedule.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Pause after the first failure
    pub initial_delay: Duration,
    /// Ceiling the backoff growth stops at
    pub max_delay: Duration,
    /// Growth factor applied between attempts
    pub backoff_multiplier: f64,
    /// Random extra pause as a fraction of the current backoff, so
    /// contending sessions do not retry in lockstep
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Budget for transient store failures.
    pub fn storage() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(1000),
            backoff_multiplier: 1.8,
            jitter_factor: 0.15,
        }
    }

    /// One retry for resolver transactions; failing the retry quarantines
    /// the session.
    pub fn resolver() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(250),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }

    fn grow(&self, backoff: Duration) -> Duration {
        backoff.mul_f64(self.backoff_multiplier).min(self.max_delay)
    }

    fn jittered(&self, backoff: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return backoff;
        }
        let spread_ms = backoff.mul_f64(self.jitter_factor).as_millis() as u64;
        backoff + Duration::from_millis(fastrand::u64(0..=spread_ms.max(1)))
    }
}

/// Drives an operation through its retry schedule.
pub struct RetryExecutor {
    config: RetryConfig,
    metrics: Option<Arc<ServerMetrics>>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(config: RetryConfig, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            config,
            metrics: Some(metrics),
        }
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is
    /// spent. The last error is returned as-is; callers decide whether an
    /// exhausted budget means quarantine.
    pub async fn execute<T, F, Fut>(&self, op_name: &str, op: F) -> Result<T, EngineError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, EngineError>>,
    {
        let budget = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if let Some(metrics) = &self.metrics {
                metrics.increment_retry_attempts();
            }

            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        if let Some(metrics) = &self.metrics {
                            metrics.increment_retry_successes();
                        }
                        debug!(op = op_name, attempt, "recovered after backoff");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                debug!(op = op_name, %err, "permanent failure, not retrying");
                return Err(err);
            }
            if attempt >= budget {
                error!(op = op_name, attempts = attempt, %err, "retry budget exhausted");
                return Err(err);
            }

            let pause = self.config.jittered(backoff);
            warn!(
                op = op_name,
                attempt,
                pause_ms = pause.as_millis() as u64,
                %err,
                "transient failure, backing off"
            );
            sleep(pause).await;
            backoff = self.config.grow(backoff);
        }
    }
}
