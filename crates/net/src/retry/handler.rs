//! Generic retry wrapper

use bundlefetch_errors::Error;
use bundlefetch_events::RetryEvent;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::policy::RetryPolicy;

const EVENT_CAPACITY: usize = 64;

/// Runs one operation until it succeeds or the policy gives up.
///
/// Subscribers registered before [`handle`](Self::handle) see zero or more
/// `ConnectRetrying` events followed by exactly one `ConnectRetried`. The
/// channel closes when the call settles, so nothing leaks past it.
pub struct RetryHandler<T, F, P> {
    operation: F,
    is_retryable: P,
    policy: Arc<dyn RetryPolicy>,
    events: broadcast::Sender<RetryEvent>,
    _output: PhantomData<fn() -> T>,
}

impl<T, F, Fut, P> RetryHandler<T, F, P>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
    P: Fn(&Error) -> bool,
{
    #[must_use]
    pub fn of(operation: F, is_retryable: P, policy: Arc<dyn RetryPolicy>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            operation,
            is_retryable,
            policy,
            events,
            _output: PhantomData,
        }
    }

    /// Observe the attempts of this handler.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RetryEvent> {
        self.events.subscribe()
    }

    /// Run the operation, retrying per policy.
    ///
    /// # Errors
    ///
    /// Returns the last error once it is not retryable or the policy declines
    /// another attempt.
    pub async fn handle(mut self) -> Result<T, Error> {
        let mut attempt = 0u32;
        loop {
            match (self.operation)().await {
                Ok(value) => {
                    self.publish(RetryEvent::ConnectRetried { succeeded: true });
                    return Ok(value);
                }
                Err(error) => {
                    attempt += 1;
                    let delay = if (self.is_retryable)(&error) {
                        self.policy.next_delay(attempt)
                    } else {
                        debug!(error = %error, "error is not retryable");
                        None
                    };

                    let Some(delay) = delay else {
                        self.publish(RetryEvent::ConnectRetried { succeeded: false });
                        return Err(error);
                    };

                    warn!(attempt, ?delay, error = %error, "operation failed, retrying");
                    self.publish(RetryEvent::ConnectRetrying { attempt });
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn publish(&self, event: RetryEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
