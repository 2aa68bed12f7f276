//! Per-bundle fetch state machine

use bundlefetch_config::FetchConfig;
use bundlefetch_crypto::{CryptoStreamFactory, SinkSettings, StreamingDecryptSink};
use bundlefetch_errors::{ConfigError, Error, FetchError, TransportResult};
use bundlefetch_net::{transport_result_of, Transport, TransportRequest};
use bundlefetch_types::{should_use_request, to_file_url, BundleLocation, FetchOptions};
use futures::StreamExt;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::BundleCache;
use crate::loader::{BundleLoader, LoadedBundle};
use crate::progress::FetchProgress;

/// Where a fetch is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Undetermined,
    /// Plain file path loaded straight from disk
    LocalFile,
    /// Plain file path routed through the transport as a `file://` URL
    LocalViaRequest,
    Remote,
    Failed,
    Completed,
}

impl FetchState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Completed)
    }
}

/// Collaborators shared by every fetch of a provider.
#[derive(Clone)]
pub struct FetchContext {
    pub transport: Arc<dyn Transport>,
    pub factory: Arc<dyn CryptoStreamFactory>,
    pub loader: Arc<dyn BundleLoader>,
    pub cache: BundleCache,
    pub sink: SinkSettings,
    pub use_request_for_local_bundles: bool,
}

impl FetchContext {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        factory: Arc<dyn CryptoStreamFactory>,
        loader: Arc<dyn BundleLoader>,
        cache: BundleCache,
    ) -> Self {
        Self {
            transport,
            factory,
            loader,
            cache,
            sink: SinkSettings::default(),
            use_request_for_local_bundles: false,
        }
    }

    /// Apply the `[fetch]` configuration section.
    #[must_use]
    pub fn with_fetch_config(mut self, config: &FetchConfig) -> Self {
        self.sink = SinkSettings {
            block_size: config.block_size,
            strict_decrypt: config.strict_decrypt,
        };
        self.use_request_for_local_bundles = config.use_request_for_local_bundles;
        self
    }
}

impl fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchContext")
            .field("cache", &self.cache)
            .field("sink", &self.sink)
            .field(
                "use_request_for_local_bundles",
                &self.use_request_for_local_bundles,
            )
            .finish_non_exhaustive()
    }
}

/// Pick the load path for `path` and the path or URL to load it from.
///
/// # Errors
///
/// Returns an error if a local path has to be turned into a URL and cannot
/// be.
pub fn select_load_path(
    path: &str,
    use_request_for_local_bundles: bool,
) -> Result<(FetchState, String), Error> {
    if should_use_request(path) {
        Ok((FetchState::Remote, path.to_string()))
    } else if use_request_for_local_bundles {
        Ok((FetchState::LocalViaRequest, to_file_url(path)?))
    } else {
        Ok((FetchState::LocalFile, path.to_string()))
    }
}

/// One fetch of one bundle location.
///
/// Created per request and discarded once it reaches
/// [`FetchState::Completed`] or [`FetchState::Failed`]. Any decrypt sink it
/// creates is disposed before either state is entered.
pub struct BundleFetch<'a> {
    location: &'a BundleLocation,
    context: &'a FetchContext,
    progress: &'a FetchProgress,
    state: FetchState,
}

impl<'a> BundleFetch<'a> {
    #[must_use]
    pub fn new(
        location: &'a BundleLocation,
        context: &'a FetchContext,
        progress: &'a FetchProgress,
    ) -> Self {
        Self {
            location,
            context,
            progress,
            state: FetchState::Undetermined,
        }
    }

    #[must_use]
    pub fn state(&self) -> FetchState {
        self.state
    }

    /// Fetch and load the bundle.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NoLoadOptions` when the location has no
    /// options, a transport failure carrying the transport result and path,
    /// or the loader's error.
    pub async fn run(&mut self) -> Result<LoadedBundle, Error> {
        if self.state != FetchState::Undetermined {
            return Err(Error::internal(format!(
                "fetch of '{}' already ran",
                self.location.internal_id
            )));
        }

        let result = self.run_inner().await;
        self.state = match &result {
            Ok(_) => FetchState::Completed,
            Err(e) => {
                debug!(location = %self.location.internal_id, error = %e, "fetch failed");
                FetchState::Failed
            }
        };
        result
    }

    async fn run_inner(&mut self) -> Result<LoadedBundle, Error> {
        let location = self.location;
        let Some(options) = location.options.as_ref() else {
            return Err(ConfigError::NoLoadOptions {
                location: location.internal_id.clone(),
            }
            .into());
        };

        let (state, path) = select_load_path(
            &location.internal_id,
            self.context.use_request_for_local_bundles,
        )?;
        self.state = state;
        debug!(location = %location.internal_id, ?state, path = %path, "selected load path");

        if state == FetchState::LocalFile {
            return self
                .context
                .loader
                .load(
                    Path::new(&path),
                    &options.bundle_name,
                    options.crc_to_check(false),
                )
                .await;
        }
        self.fetch_via_request(&path, options).await
    }

    async fn fetch_via_request(&self, url: &str, options: &FetchOptions) -> Result<LoadedBundle, Error> {
        let cache = &self.context.cache;
        let file_name = self.location.file_name();

        if let Some(cached) = cache.cached_version(options, &file_name).await? {
            debug!(bundle = %options.bundle_name, path = %cached.display(), "loading cached version");
            return self.load_stored(&cached, options, true).await;
        }

        let staging = cache.staging_path(&file_name);
        if let Err(e) = self.stream_to(url, options, &staging).await {
            self.discard_staged(&staging).await;
            return Err(e);
        }

        let stored = match cache.store(&staging, options, &file_name).await {
            Ok(stored) => stored,
            Err(e) => {
                self.discard_staged(&staging).await;
                return Err(e);
            }
        };
        let loaded = self.load_stored(&stored, options, false).await;
        if stored == staging {
            self.discard_staged(&staging).await;
        }
        cache.prune().await;
        loaded
    }

    /// Stream the response body through a decrypt sink into `staging`.
    async fn stream_to(&self, url: &str, options: &FetchOptions, staging: &Path) -> Result<(), Error> {
        let request = TransportRequest::new(url, options)?;
        debug!(
            url = %request.url,
            redirect_limit = ?request.redirect_limit,
            timeout = ?request.timeout,
            retry_count = request.retry_count,
            "requesting bundle"
        );
        let response = self
            .context
            .transport
            .open(&request)
            .await
            .map_err(|e| transport_failure(&e, url))?;
        if let Some(length) = response.content_length {
            self.progress.set_total_if_unknown(length);
        }

        let mut sink = StreamingDecryptSink::create(
            staging,
            Arc::clone(&self.context.factory),
            options.clone(),
            self.context.sink,
        )
        .await
        .map_err(|e| sink_failure(e, url))?;

        let mut body = response.body;
        let streamed = async {
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| transport_failure(&e, url))?;
                sink.receive(&chunk)
                    .await
                    .map_err(|e| sink_failure(e, url))?;
                self.progress.add_downloaded(chunk.len() as u64);
            }
            sink.complete().await.map_err(|e| sink_failure(e, url))
        }
        .await;

        let written = sink.bytes_written();
        let disposed = sink.dispose().await;
        streamed?;
        disposed.map_err(|e| sink_failure(e, url))?;

        if written == 0 {
            return Err(FetchError::InvalidBundle {
                path: url.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn load_stored(
        &self,
        path: &Path,
        options: &FetchOptions,
        from_cache: bool,
    ) -> Result<LoadedBundle, Error> {
        let cache = &self.context.cache;
        let loaded = self
            .context
            .loader
            .load(path, &options.bundle_name, options.crc_to_check(from_cache))
            .await;

        let Some(hash) = options.cache_hash() else {
            return loaded;
        };
        match &loaded {
            Ok(_) if options.clear_other_cached_versions_on_load => {
                if let Err(e) = cache
                    .clear_other_cached_versions(&options.bundle_name, hash)
                    .await
                {
                    warn!(bundle = %options.bundle_name, error = %e, "failed to clear other cached versions");
                }
            }
            Ok(_) => {}
            Err(_) => {
                // A version that does not load must not satisfy the next fetch
                if let Err(e) = cache.clear_cached_version(&options.bundle_name, hash).await {
                    warn!(bundle = %options.bundle_name, error = %e, "failed to clear cached version");
                }
            }
        }
        loaded
    }

    async fn discard_staged(&self, staging: &Path) {
        if let Err(e) = self.context.cache.remove_staged(staging).await {
            warn!(path = %staging.display(), error = %e, "failed to remove staged bundle");
        }
    }
}

/// Wrap a transport error as a failure of the fetch of `path`.
fn transport_failure(error: &Error, path: &str) -> Error {
    match error {
        Error::Fetch(FetchError::TransportFailed { .. } | FetchError::InvalidUrl(_))
        | Error::Cancelled => error.clone(),
        _ => FetchError::transport(transport_result_of(error), path, error.to_string()).into(),
    }
}

/// Sink failures mean the payload could not be processed.
fn sink_failure(error: Error, path: &str) -> Error {
    match error {
        Error::Stream(_) => error,
        _ => FetchError::transport(TransportResult::DataProcessingError, path, error.to_string())
            .into(),
    }
}
