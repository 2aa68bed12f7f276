//! Structured logging integration for events
//!
//! Converts domain events into tracing records with structured fields so
//! `--json` output can be consumed by log tooling.

use bundlefetch_events::{AppEvent, DownloadEvent, GeneralEvent, RetryEvent};
use tracing::{debug, error, info, warn};

/// Log an `AppEvent` at its level with structured fields
pub fn log_event_with_tracing(event: &AppEvent) {
    match event {
        AppEvent::Download(download_event) => match download_event {
            DownloadEvent::Downloading { asset_name } => {
                info!(
                    target: "bundlefetch::events::download",
                    asset = %asset_name,
                    "Download started"
                );
            }
            DownloadEvent::Downloaded { status } => {
                debug!(
                    target: "bundlefetch::events::download",
                    asset = %status.asset_name,
                    downloaded_bytes = status.downloaded_bytes,
                    total_bytes = status.total_bytes,
                    percent = status.percent,
                    done = status.is_done,
                    "Download progress"
                );
            }
        },

        AppEvent::Retry(retry_event) => match retry_event {
            RetryEvent::ConnectRetrying { attempt } => {
                warn!(
                    target: "bundlefetch::events::retry",
                    attempt = attempt,
                    "Retrying after failure"
                );
            }
            RetryEvent::ConnectRetried { succeeded: true } => {
                info!(
                    target: "bundlefetch::events::retry",
                    succeeded = true,
                    "Operation finished"
                );
            }
            RetryEvent::ConnectRetried { succeeded: false } => {
                error!(
                    target: "bundlefetch::events::retry",
                    succeeded = false,
                    "Retries exhausted"
                );
            }
        },

        AppEvent::General(general_event) => match general_event {
            GeneralEvent::OperationStarted {
                operation,
                asset_name,
            } => {
                info!(
                    target: "bundlefetch::events::general",
                    operation = %operation,
                    asset = %asset_name,
                    "Operation started"
                );
            }
            GeneralEvent::OperationCompleted {
                operation,
                asset_name,
            } => {
                info!(
                    target: "bundlefetch::events::general",
                    operation = %operation,
                    asset = %asset_name,
                    "Operation completed"
                );
            }
            GeneralEvent::OperationFailed { operation, failure } => {
                error!(
                    target: "bundlefetch::events::general",
                    operation = %operation,
                    retryable = failure.retryable,
                    code = ?failure.code,
                    message = %failure.message,
                    hint = ?failure.hint,
                    "Operation failed"
                );
            }
        },
    }
}
