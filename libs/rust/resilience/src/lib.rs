//! Resilience utilities: bounded waits + caller-side retry with backoff.
use std::future::Future;
use std::time::Duration;

use once_cell::sync::Lazy;
use opentelemetry::{global, metrics::Counter};
use rand::{thread_rng, Rng};
use thiserror::Error;
use tracing::{debug, warn};

static RETRY_ATTEMPTS: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("eta-resilience")
        .u64_counter("eta_resilience_retry_attempts_total")
        .with_description("Total retry attempts executed")
        .build()
});

static TIMEOUTS: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("eta-resilience")
        .u64_counter("eta_resilience_timeouts_total")
        .with_description("Operations abandoned after exceeding their deadline")
        .build()
});

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResilienceError {
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64, // 0.0 - 1.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(500), max_delay: Duration::from_secs(10), jitter: 0.25 }
    }
}

impl RetryConfig {
    /// Backoff before the attempt following `attempt` (0-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exp = self.base_delay.mul_f64(2f64.powi(attempt.min(30) as i32));
        let delay = std::cmp::min(exp, self.max_delay);
        if self.jitter <= 0.0 { return delay; }
        let jitter_ms = (delay.as_millis() as f64 * self.jitter.min(1.0)) as i64;
        let offset: i64 = thread_rng().gen_range(-jitter_ms..=jitter_ms);
        Duration::from_millis((delay.as_millis() as i64 + offset).max(0) as u64)
    }
}

/// Run `fut` with a deadline. The future is dropped when the deadline passes.
pub async fn with_timeout<F: Future>(limit: Duration, fut: F) -> Result<F::Output, ResilienceError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(v) => Ok(v),
        Err(_) => {
            TIMEOUTS.add(1, &[]);
            Err(ResilienceError::Timeout(limit))
        }
    }
}

/// Retry `op` while `should_retry` accepts the error and attempts remain.
/// The last error is returned unchanged once the budget is spent.
pub async fn retry_async<F, Fut, T, E, P>(cfg: &RetryConfig, should_retry: P, mut op: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = cfg.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        RETRY_ATTEMPTS.add(1, &[]);
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt + 1 >= max_attempts || !should_retry(&e) => return Err(e),
            Err(e) => {
                let delay = cfg.delay_for(attempt);
                warn!(attempt = attempt + 1, max_attempts, error = %e, ?delay, "attempt failed, backing off");
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;
        debug!(attempt = attempt + 1, "retrying");
    }
}
