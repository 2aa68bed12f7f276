//! Event handling and progress display

use bundlefetch_events::{AppEvent, DownloadEvent, GeneralEvent, RetryEvent};
use std::collections::HashMap;

/// Renders events for a human on stderr
pub struct EventHandler {
    /// Suppress human output; events are only logged
    json_mode: bool,
    /// Last whole percent shown per asset
    shown_percent: HashMap<String, u32>,
}

impl EventHandler {
    pub fn new(json_mode: bool) -> Self {
        Self {
            json_mode,
            shown_percent: HashMap::new(),
        }
    }

    /// Handle incoming event
    pub fn handle_event(&mut self, event: &AppEvent) {
        crate::logging::log_event_with_tracing(event);
        if self.json_mode {
            return;
        }

        match event {
            AppEvent::Download(DownloadEvent::Downloading { asset_name }) => {
                self.shown_percent.remove(asset_name);
                eprintln!("Downloading {asset_name}");
            }
            AppEvent::Download(DownloadEvent::Downloaded { status }) => {
                // Truncation is fine for display
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let percent = (status.percent * 100.0) as u32;
                let last = self.shown_percent.get(&status.asset_name).copied();
                if status.is_done {
                    eprintln!(
                        "Downloaded {} ({} bytes)",
                        status.asset_name, status.downloaded_bytes
                    );
                } else if last.is_none_or(|last| percent >= last + 10) {
                    self.shown_percent.insert(status.asset_name.clone(), percent);
                    eprintln!(
                        "  {} {percent:>3}% ({}/{} bytes)",
                        status.asset_name, status.downloaded_bytes, status.total_bytes
                    );
                }
            }
            AppEvent::Retry(RetryEvent::ConnectRetrying { attempt }) => {
                eprintln!("Retrying (attempt {attempt})");
            }
            AppEvent::Retry(RetryEvent::ConnectRetried { succeeded: false }) => {
                eprintln!("Giving up after retries");
            }
            AppEvent::General(GeneralEvent::OperationFailed { operation, failure }) => {
                eprintln!("Failed to {operation}: {}", failure.message);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundlefetch_types::{DownloadStatus, NamedDownloadStatus};

    fn sample(downloaded: u64) -> AppEvent {
        AppEvent::Download(DownloadEvent::Downloaded {
            status: NamedDownloadStatus::new("cube", DownloadStatus::new(1000, downloaded, false)),
        })
    }

    #[test]
    fn progress_is_printed_in_ten_percent_steps() {
        let mut handler = EventHandler::new(false);
        handler.handle_event(&sample(0));
        assert_eq!(handler.shown_percent.get("cube"), Some(&0));
        handler.handle_event(&sample(50));
        assert_eq!(handler.shown_percent.get("cube"), Some(&0));
        handler.handle_event(&sample(150));
        assert_eq!(handler.shown_percent.get("cube"), Some(&15));
    }

    #[test]
    fn download_start_resets_progress() {
        let mut handler = EventHandler::new(false);
        handler.handle_event(&sample(500));
        handler.handle_event(&AppEvent::Download(DownloadEvent::Downloading {
            asset_name: "cube".to_string(),
        }));
        assert!(handler.shown_percent.is_empty());
    }
}
