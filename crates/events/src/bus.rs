use tokio::sync::broadcast;

use crate::AppEvent;

/// Default capacity used by [`EventBus::default`].
pub const DEFAULT_CAPACITY: usize = 256;

/// Broadcast channel shared by every component of a provider.
///
/// Publishing is synchronous and never blocks. With no subscribers the event
/// is dropped; a subscriber that falls more than `capacity` events behind
/// receives `RecvError::Lagged` instead of slowing producers down.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    pub fn publish<E: Into<AppEvent>>(&self, event: E) {
        let _ = self.tx.send(event.into());
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DownloadEvent, GeneralEvent, RetryEvent};

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.publish(GeneralEvent::started("download", "cube"));
    }

    #[tokio::test]
    async fn each_subscriber_receives() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(RetryEvent::ConnectRetried { succeeded: true });

        for rx in [&mut rx1, &mut rx2] {
            assert!(matches!(
                rx.recv().await.unwrap(),
                AppEvent::Retry(RetryEvent::ConnectRetried { succeeded: true })
            ));
        }
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::new(16);
        bus.publish(DownloadEvent::Downloading {
            asset_name: "cube".into(),
        });
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn lagged_subscriber_gets_error() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for attempt in 0..10 {
            bus.publish(RetryEvent::ConnectRetrying { attempt });
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }

    #[test]
    fn dropping_subscriber_leaves_others_intact() {
        let bus = EventBus::new(16);
        let rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        drop(rx1);
        bus.publish(GeneralEvent::completed("load", "cube"));
        assert_eq!(bus.subscriber_count(), 1);
        assert!(rx2.try_recv().is_ok());
    }
}
