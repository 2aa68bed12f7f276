//! Integration tests for events

#[cfg(test)]
mod tests {
    use bundlefetch_errors::{Error, FetchError, TransportResult};
    use bundlefetch_events::*;
    use bundlefetch_types::{DownloadStatus, NamedDownloadStatus};

    struct Holder {
        bus: EventBus,
    }

    impl EventEmitter for Holder {
        fn event_bus(&self) -> Option<&EventBus> {
            Some(&self.bus)
        }
    }

    #[tokio::test]
    async fn test_emitter_helpers() {
        let holder = Holder {
            bus: EventBus::default(),
        };
        let mut rx = holder.bus.subscribe();

        holder.emit_downloading("cube");
        holder.emit_downloaded(NamedDownloadStatus::new(
            "cube",
            DownloadStatus::new(1000, 400, false),
        ));
        holder.emit_connect_retrying(1);
        holder.emit_connect_retried(true);
        holder.emit_operation_completed("download", "cube");

        assert!(matches!(
            rx.recv().await.unwrap(),
            AppEvent::Download(DownloadEvent::Downloading { asset_name }) if asset_name == "cube"
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            AppEvent::Download(DownloadEvent::Downloaded { status }) if status.downloaded_bytes == 400
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            AppEvent::Retry(RetryEvent::ConnectRetrying { attempt: 1 })
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            AppEvent::Retry(RetryEvent::ConnectRetried { succeeded: true })
        ));
        match rx.recv().await.unwrap() {
            AppEvent::General(event @ GeneralEvent::OperationCompleted { .. }) => {
                assert_eq!(event.operation(), "download");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_missing_bus_is_silent() {
        let none: Option<EventBus> = None;
        none.emit_operation_started("download", "cube");
    }

    #[test]
    fn test_log_levels() {
        let failed = AppEvent::Retry(RetryEvent::ConnectRetried { succeeded: false });
        assert_eq!(failed.log_level(), tracing::Level::ERROR);
        assert_eq!(failed.log_target(), "bundlefetch::events::retry");

        let progress = AppEvent::Download(DownloadEvent::Downloaded {
            status: NamedDownloadStatus::new("cube", DownloadStatus::completed(10)),
        });
        assert_eq!(progress.log_level(), tracing::Level::DEBUG);

        let retrying = AppEvent::Retry(RetryEvent::ConnectRetrying { attempt: 2 });
        assert_eq!(retrying.log_level(), tracing::Level::WARN);

        let started = AppEvent::General(GeneralEvent::started("load", "cube"));
        assert_eq!(started.log_level(), tracing::Level::INFO);
        assert_eq!(started.log_target(), "bundlefetch::events::general");
    }

    #[test]
    fn test_failure_context_from_error() {
        let error: Error =
            FetchError::transport(TransportResult::ConnectionError, "https://cdn/cube", "reset")
                .into();
        let failure = FailureContext::from_error(&error);
        assert!(failure.retryable);
        assert_eq!(failure.code.as_deref(), Some("fetch.transport"));
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = AppEvent::Retry(RetryEvent::ConnectRetrying { attempt: 3 });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["domain"], "retry");
        assert_eq!(json["event"]["type"], "ConnectRetrying");
        assert_eq!(json["event"]["attempt"], 3);
    }
}
