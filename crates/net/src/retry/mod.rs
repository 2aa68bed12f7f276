//! Retrying whole operations with observable attempts

mod handler;
mod policy;

pub use handler::RetryHandler;
pub use policy::{
    policy_from_config, ExponentialBackoffStrategy, FixedIntervalStrategy, NoRetryStrategy,
    RetryPolicy,
};

use bundlefetch_config::RetryConfig;
use bundlefetch_errors::{Error, UserFacingError};

/// Treat every failure as transient.
#[must_use]
pub fn always_retry(_: &Error) -> bool {
    true
}

/// Retry only failures that report themselves retryable.
#[must_use]
pub fn retry_if_transient(error: &Error) -> bool {
    error.is_retryable()
}

/// The retry predicate selected by `classify_errors`.
#[must_use]
pub fn predicate_for(config: &RetryConfig) -> fn(&Error) -> bool {
    if config.classify_errors {
        retry_if_transient
    } else {
        always_retry
    }
}
