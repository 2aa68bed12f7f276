//! Download progress sampling

use bundlefetch_errors::Error;
use bundlefetch_events::EventEmitter;
use bundlefetch_types::{DownloadStatus, NamedDownloadStatus};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

/// Byte counters updated by a running fetch.
#[derive(Debug, Default)]
pub struct FetchProgress {
    total: AtomicU64,
    downloaded: AtomicU64,
}

impl FetchProgress {
    /// Counters for a download expected to be `total` bytes (0 if unknown).
    #[must_use]
    pub fn new(total: u64) -> Self {
        Self {
            total: AtomicU64::new(total),
            downloaded: AtomicU64::new(0),
        }
    }

    /// Adopt `total` unless a size was already known.
    pub fn set_total_if_unknown(&self, total: u64) {
        let _ = self
            .total
            .compare_exchange(0, total, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn add_downloaded(&self, bytes: u64) {
        self.downloaded.fetch_add(bytes, Ordering::SeqCst);
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::SeqCst)
    }

    /// Status of a download still in progress.
    #[must_use]
    pub fn snapshot(&self) -> DownloadStatus {
        DownloadStatus::new(self.total(), self.downloaded(), false)
    }
}

/// Turns [`FetchProgress`] samples into `Downloaded` events for one asset.
///
/// Emits once when the fetch starts, whenever the downloaded byte count
/// changes, and once when it settles. After a successful fetch the last
/// event is done with `downloaded_bytes == total_bytes`.
pub struct ProgressMonitor<'a, E: EventEmitter + ?Sized> {
    emitter: &'a E,
    asset_name: String,
    interval: Duration,
}

impl<'a, E: EventEmitter + ?Sized> ProgressMonitor<'a, E> {
    /// `interval` of zero samples on every scheduler tick.
    #[must_use]
    pub fn new(emitter: &'a E, asset_name: impl Into<String>, interval: Duration) -> Self {
        Self {
            emitter,
            asset_name: asset_name.into(),
            interval,
        }
    }

    /// Drive `fetch` to completion while sampling `progress`.
    ///
    /// # Errors
    ///
    /// Returns whatever error `fetch` resolves to.
    pub async fn run<T, Fut>(&self, progress: &FetchProgress, fetch: Fut) -> Result<T, Error>
    where
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut last = progress.snapshot();
        self.emit(last);

        tokio::pin!(fetch);
        let result = loop {
            tokio::select! {
                biased;
                result = &mut fetch => break result,
                () = self.tick() => {
                    let status = progress.snapshot();
                    if status.downloaded_bytes != last.downloaded_bytes {
                        self.emit(status);
                        last = status;
                    }
                }
            }
        };

        let terminal = if result.is_ok() {
            DownloadStatus::completed(progress.total().max(progress.downloaded()))
        } else {
            // A failed download reports nothing downloaded
            DownloadStatus::new(progress.total(), 0, false)
        };
        self.emit(terminal);
        result
    }

    async fn tick(&self) {
        if self.interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.interval).await;
        }
    }

    fn emit(&self, status: DownloadStatus) {
        trace!(
            asset = %self.asset_name,
            downloaded = status.downloaded_bytes,
            total = status.total_bytes,
            done = status.is_done,
            "progress sample"
        );
        self.emitter
            .emit_downloaded(NamedDownloadStatus::new(self.asset_name.clone(), status));
    }
}
