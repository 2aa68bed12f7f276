#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for async communication in bundlefetch
//!
//! Components never print. Everything observable about a fetch (progress,
//! retry lifecycle, operation outcomes) is published as an [`AppEvent`] on an
//! [`EventBus`] and rendered by whoever subscribes, usually the CLI.
//!
//! ## Architecture
//!
//! - **Domain events**: grouped by concern (download, retry, general)
//! - **Broadcast bus**: any number of subscribers, slow ones lag instead of
//!   blocking producers
//! - **`EventEmitter` trait**: one emission API for anything holding a bus
//! - **Tracing integration**: every event knows its log level and target

pub mod bus;
pub mod events;

pub use bus::EventBus;
pub use events::{AppEvent, DownloadEvent, FailureContext, GeneralEvent, RetryEvent};

use bundlefetch_types::NamedDownloadStatus;

/// The unified trait for emitting events throughout bundlefetch
///
/// Implementors only say where their bus is; emission helpers are shared.
pub trait EventEmitter {
    /// Get the event bus for this emitter
    fn event_bus(&self) -> Option<&EventBus>;

    /// Emit an event through this emitter
    fn emit(&self, event: AppEvent) {
        if let Some(bus) = self.event_bus() {
            bus.publish(event);
        }
    }

    /// Emit the start of an operation on `asset_name`
    fn emit_operation_started(&self, operation: impl Into<String>, asset_name: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::started(operation, asset_name)));
    }

    /// Emit the successful end of an operation on `asset_name`
    fn emit_operation_completed(
        &self,
        operation: impl Into<String>,
        asset_name: impl Into<String>,
    ) {
        self.emit(AppEvent::General(GeneralEvent::completed(operation, asset_name)));
    }

    /// Emit an operation failed event built from a user-facing error
    fn emit_operation_failed(&self, operation: impl Into<String>, failure: FailureContext) {
        self.emit(AppEvent::General(GeneralEvent::OperationFailed {
            operation: operation.into(),
            failure,
        }));
    }

    /// Emit the start of a download for `asset_name`
    fn emit_downloading(&self, asset_name: impl Into<String>) {
        self.emit(AppEvent::Download(DownloadEvent::Downloading {
            asset_name: asset_name.into(),
        }));
    }

    /// Emit a progress sample
    fn emit_downloaded(&self, status: NamedDownloadStatus) {
        self.emit(AppEvent::Download(DownloadEvent::Downloaded { status }));
    }

    /// Emit a retry attempt notice
    fn emit_connect_retrying(&self, attempt: u32) {
        self.emit(AppEvent::Retry(RetryEvent::ConnectRetrying { attempt }));
    }

    /// Emit the final outcome of a retried operation
    fn emit_connect_retried(&self, succeeded: bool) {
        self.emit(AppEvent::Retry(RetryEvent::ConnectRetried { succeeded }));
    }
}

impl EventEmitter for EventBus {
    fn event_bus(&self) -> Option<&EventBus> {
        Some(self)
    }
}

impl EventEmitter for Option<EventBus> {
    fn event_bus(&self) -> Option<&EventBus> {
        self.as_ref()
    }
}
