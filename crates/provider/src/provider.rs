//! Asset provider facade

use bundlefetch_config::Config;
use bundlefetch_crypto::CryptoStreamFactory;
use bundlefetch_errors::Error;
use bundlefetch_events::{AppEvent, EventBus, EventEmitter, FailureContext};
use bundlefetch_net::{
    always_retry, policy_from_config, predicate_for, FileTransport, HttpTransport, NoRetryStrategy,
    RetryHandler, RetryPolicy, SchemeRouter,
};
use bundlefetch_types::should_use_request;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

use crate::cache::BundleCache;
use crate::catalog::AssetLocator;
use crate::fetch::{BundleFetch, FetchContext};
use crate::handle::AssetHandle;
use crate::loader::{FileBundleLoader, LoadedBundle};
use crate::progress::{FetchProgress, ProgressMonitor};

/// Sizes, downloads and loads assets by name.
///
/// Every download and load runs under a [`RetryHandler`]; its attempt and
/// outcome events are forwarded to the provider's bus while the call runs,
/// alongside `Downloading` and `Downloaded` events.
pub struct AssetProvider {
    bus: EventBus,
    locator: Arc<dyn AssetLocator>,
    context: FetchContext,
    policy: Arc<dyn RetryPolicy>,
    is_retryable: fn(&Error) -> bool,
    progress_interval: Duration,
}

impl AssetProvider {
    /// Provider that does not retry and samples progress every tick.
    #[must_use]
    pub fn new(locator: Arc<dyn AssetLocator>, context: FetchContext, bus: EventBus) -> Self {
        Self {
            bus,
            locator,
            context,
            policy: Arc::new(NoRetryStrategy),
            is_retryable: always_retry,
            progress_interval: Duration::ZERO,
        }
    }

    /// Build a provider with HTTP and `file://` transports from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(
        config: &Config,
        locator: Arc<dyn AssetLocator>,
        factory: Arc<dyn CryptoStreamFactory>,
        bus: EventBus,
    ) -> Result<Self, Error> {
        let transport = SchemeRouter::new(
            Arc::new(HttpTransport::new(config.network.clone())?),
            Arc::new(FileTransport::default()),
        );
        let context = FetchContext::new(
            Arc::new(transport),
            factory,
            Arc::new(FileBundleLoader::new()),
            BundleCache::new(config.cache_dir()),
        )
        .with_fetch_config(&config.fetch);

        Ok(Self::new(locator, context, bus)
            .with_retry_policy(policy_from_config(&config.retry))
            .with_retry_predicate(predicate_for(&config.retry))
            .with_progress_interval(config.progress.interval()))
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Decide which failures are retried. Configuration errors and sink
    /// misuse never are.
    #[must_use]
    pub fn with_retry_predicate(mut self, is_retryable: fn(&Error) -> bool) -> Self {
        self.is_retryable = is_retryable;
        self
    }

    /// Default sampling interval for [`download`](Self::download).
    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    #[must_use]
    pub fn context(&self) -> &FetchContext {
        &self.context
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.bus.subscribe()
    }

    /// Bytes that still have to be downloaded for `asset_name`.
    ///
    /// Local bundles and cached versions need nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the asset is unknown.
    pub async fn get_download_size(&self, asset_name: &str) -> Result<u64, Error> {
        let location = self.locator.locate(asset_name)?;
        let Some(options) = location.options.as_ref() else {
            return Ok(0);
        };
        if !should_use_request(&location.internal_id) {
            return Ok(0);
        }
        if self
            .context
            .cache
            .is_version_cached(options, &location.file_name())
            .await?
        {
            debug!(asset = asset_name, "bundle version already cached");
            return Ok(0);
        }
        Ok(options.bundle_size)
    }

    /// Download the bundle holding `asset_name` unless it is already present.
    ///
    /// `interval` overrides the configured progress sampling interval.
    ///
    /// # Errors
    ///
    /// Returns the last fetch error once retries are exhausted.
    pub async fn download(&self, asset_name: &str, interval: Option<Duration>) -> Result<(), Error> {
        if self.get_download_size(asset_name).await? == 0 {
            debug!(asset = asset_name, "nothing to download");
            return Ok(());
        }

        let interval = interval.unwrap_or(self.progress_interval);
        self.emit_operation_started("download", asset_name);
        let result = self
            .retrying(|| self.download_once(asset_name, interval))
            .await;
        match &result {
            Ok(()) => self.emit_operation_completed("download", asset_name),
            Err(e) => self.emit_operation_failed("download", FailureContext::from_error(e)),
        }
        result
    }

    /// Fetch and load the bundle holding `asset_name`.
    ///
    /// The bundle is unloaded when the returned handle is disposed or
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns the last fetch or load error once retries are exhausted.
    pub async fn load_asset(&self, asset_name: &str) -> Result<AssetHandle<LoadedBundle>, Error> {
        self.emit_operation_started("load", asset_name);
        match self.retrying(|| self.load_once(asset_name)).await {
            Ok(bundle) => {
                self.emit_operation_completed("load", asset_name);
                let loader = Arc::clone(&self.context.loader);
                Ok(AssetHandle::new(bundle, move |bundle| loader.unload(bundle)))
            }
            Err(e) => {
                self.emit_operation_failed("load", FailureContext::from_error(&e));
                Err(e)
            }
        }
    }

    async fn download_once(&self, asset_name: &str, interval: Duration) -> Result<(), Error> {
        let location = self.locator.locate(asset_name)?;
        self.emit_downloading(asset_name);

        let total = location.options.as_ref().map_or(0, |o| o.bundle_size);
        let progress = FetchProgress::new(total);
        let monitor = ProgressMonitor::new(self, asset_name, interval);
        let mut fetch = BundleFetch::new(&location, &self.context, &progress);
        let bundle = monitor.run(&progress, fetch.run()).await?;

        // Downloading only warms the cache
        self.context.loader.unload(&bundle);
        Ok(())
    }

    async fn load_once(&self, asset_name: &str) -> Result<LoadedBundle, Error> {
        let location = self.locator.locate(asset_name)?;
        let progress = FetchProgress::default();
        BundleFetch::new(&location, &self.context, &progress)
            .run()
            .await
    }

    /// Run `operation` under the retry policy, forwarding its events.
    ///
    /// Configuration errors and sink misuse end the call on the first
    /// failure whatever the predicate says.
    async fn retrying<T, F, Fut>(&self, operation: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let is_retryable = self.is_retryable;
        let handler = RetryHandler::of(
            operation,
            move |e: &Error| !is_fatal(e) && is_retryable(e),
            Arc::clone(&self.policy),
        );
        let mut events = handler.subscribe();
        let handled = handler.handle();
        tokio::pin!(handled);

        let result = loop {
            tokio::select! {
                biased;
                Ok(event) = events.recv() => self.emit(AppEvent::from(event)),
                result = &mut handled => break result,
            }
        };
        while let Ok(event) = events.try_recv() {
            self.emit(AppEvent::from(event));
        }
        result
    }
}

fn is_fatal(error: &Error) -> bool {
    matches!(error, Error::Config(_) | Error::Stream(_))
}

impl EventEmitter for AssetProvider {
    fn event_bus(&self) -> Option<&EventBus> {
        Some(&self.bus)
    }
}

impl std::fmt::Debug for AssetProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetProvider")
            .field("context", &self.context)
            .field("progress_interval", &self.progress_interval)
            .finish_non_exhaustive()
    }
}
