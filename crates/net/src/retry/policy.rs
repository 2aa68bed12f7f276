//! Retry policies and backoff calculations

use bundlefetch_config::{RetryConfig, RetryStrategyKind};
use std::sync::Arc;
use std::time::Duration;

/// Decides whether and when a failed operation is attempted again.
pub trait RetryPolicy: Send + Sync {
    /// Delay before retry number `attempt` (starting at 1), or `None` to give up.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Never retries; wrapping with it is equivalent to a bare call.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryStrategy;

impl RetryPolicy for NoRetryStrategy {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}

/// Up to `max_retries` retries, `interval` apart.
#[derive(Debug, Clone, Copy)]
pub struct FixedIntervalStrategy {
    pub max_retries: u32,
    pub interval: Duration,
}

impl FixedIntervalStrategy {
    #[must_use]
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries,
            interval,
        }
    }
}

impl RetryPolicy for FixedIntervalStrategy {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt <= self.max_retries).then_some(self.interval)
    }
}

/// Exponential backoff with jitter, capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoffStrategy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl ExponentialBackoffStrategy {
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            backoff_multiplier: config.backoff_multiplier,
            jitter_factor: config.jitter_factor,
        }
    }

    /// Calculate exponential backoff delay with jitter
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        // Precision loss acceptable for backoff calculations - we don't need nanosecond precision
        #[allow(clippy::cast_precision_loss)]
        let base_delay = self.initial_delay.as_millis().min(u128::from(u64::MAX)) as f64;
        #[allow(clippy::cast_precision_loss)]
        let max_delay = self.max_delay.as_millis().min(u128::from(u64::MAX)) as f64;

        // Retry attempts are small, so this cast is safe
        #[allow(clippy::cast_possible_wrap)]
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = (base_delay * self.backoff_multiplier.powi(exponent)).min(max_delay);

        // Add jitter
        let jitter = delay * self.jitter_factor * (rand::random::<f64>() - 0.5);
        // Safe cast: max(0.0) ensures non-negative, round() handles fractional part
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let final_delay = (delay + jitter).max(0.0).round() as u64;

        Duration::from_millis(final_delay)
    }
}

impl RetryPolicy for ExponentialBackoffStrategy {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt <= self.max_retries).then(|| self.backoff_delay(attempt))
    }
}

/// Build the policy named by the configuration.
#[must_use]
pub fn policy_from_config(config: &RetryConfig) -> Arc<dyn RetryPolicy> {
    match config.strategy {
        RetryStrategyKind::None => Arc::new(NoRetryStrategy),
        RetryStrategyKind::Fixed => Arc::new(FixedIntervalStrategy::new(
            config.max_retries,
            config.initial_delay(),
        )),
        RetryStrategyKind::Exponential => {
            Arc::new(ExponentialBackoffStrategy::from_config(config))
        }
    }
}
