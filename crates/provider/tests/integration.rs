//! Integration tests for provider crate

#[cfg(test)]
mod tests {
    use bundlefetch_crypto::{encrypt_bytes, Aes128CbcFactory, CryptoStreamFactory};
    use async_trait::async_trait;
    use bundlefetch_errors::{ConfigError, Error, FetchError, StreamError, TransportResult};
    use bundlefetch_events::{AppEvent, DownloadEvent, EventBus, GeneralEvent, RetryEvent};
    use bundlefetch_net::{
        retry_if_transient, FileTransport, FixedIntervalStrategy, HttpTransport, SchemeRouter,
    };
    use bundlefetch_provider::*;
    use bundlefetch_types::{DownloadStatus, FetchOptions};
    use httpmock::prelude::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    const KEY: [u8; 16] = *b"bundlefetch-key!";

    fn aes() -> Arc<dyn CryptoStreamFactory> {
        Arc::new(Aes128CbcFactory::new(KEY))
    }

    fn plaintext() -> Vec<u8> {
        (0..1000u32).map(|i| (i % 251) as u8).collect()
    }

    fn catalog(entries: Vec<BundleEntry>, assets: &[(&str, &str)]) -> Catalog {
        let mut catalog = Catalog::default();
        catalog.bundles = entries;
        for (asset, bundle) in assets {
            catalog.assets.insert((*asset).to_string(), (*bundle).to_string());
        }
        catalog
    }

    fn build_provider(
        cache_root: &Path,
        catalog: Catalog,
        loader: &Arc<FileBundleLoader>,
        use_request_for_local_bundles: bool,
    ) -> AssetProvider {
        let transport = SchemeRouter::new(
            Arc::new(HttpTransport::with_defaults().unwrap()),
            Arc::new(FileTransport::default()),
        );
        let mut context = FetchContext::new(
            Arc::new(transport),
            aes(),
            loader.clone(),
            BundleCache::new(cache_root),
        );
        context.sink.block_size = 256;
        context.use_request_for_local_bundles = use_request_for_local_bundles;
        AssetProvider::new(Arc::new(catalog), context, EventBus::new(1024))
    }

    fn drain(rx: &mut broadcast::Receiver<AppEvent>) -> Vec<AppEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn download_statuses(events: &[AppEvent]) -> Vec<DownloadStatus> {
        events
            .iter()
            .filter_map(|event| match event {
                AppEvent::Download(DownloadEvent::Downloaded { status }) => Some(status.status()),
                _ => None,
            })
            .collect()
    }

    fn retry_events(events: &[AppEvent]) -> Vec<RetryEvent> {
        events
            .iter()
            .filter_map(|event| match event {
                AppEvent::Retry(retry) => Some(*retry),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_cube_download_then_load_from_cache() {
        let dir = TempDir::new().unwrap();
        let plain = plaintext();
        let options = FetchOptions::new("shapes")
            .with_hash("v1")
            .with_crc(crc32fast::hash(&plain), false);
        let ciphertext = encrypt_bytes(aes().as_ref(), &options, &plain).unwrap();
        let options = options.with_bundle_size(ciphertext.len() as u64);

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/shapes.bundle");
                then.status(200).body(&ciphertext);
            })
            .await;

        let loader = Arc::new(FileBundleLoader::new());
        let provider = build_provider(
            &dir.path().join("cache"),
            catalog(
                vec![BundleEntry {
                    name: "shapes".into(),
                    path: server.url("/shapes.bundle"),
                    options: Some(options),
                }],
                &[("cube", "shapes")],
            ),
            &loader,
            false,
        );
        let mut rx = provider.subscribe();

        let size = provider.get_download_size("cube").await.unwrap();
        assert_eq!(size, ciphertext.len() as u64);
        provider.download("cube", None).await.unwrap();
        assert_eq!(provider.get_download_size("cube").await.unwrap(), 0);
        assert_eq!(loader.live_count(), 0);

        let events = drain(&mut rx);
        assert!(matches!(
            &events[0],
            AppEvent::General(GeneralEvent::OperationStarted { operation, asset_name })
                if operation == "download" && asset_name == "cube"
        ));
        assert!(matches!(
            &events[1],
            AppEvent::Download(DownloadEvent::Downloading { asset_name }) if asset_name == "cube"
        ));
        assert!(matches!(
            events.last(),
            Some(AppEvent::General(GeneralEvent::OperationCompleted { operation, .. }))
                if operation == "download"
        ));
        let statuses = download_statuses(&events);
        assert_eq!(statuses.first().unwrap().downloaded_bytes, 0);
        assert_eq!(statuses.last(), Some(&DownloadStatus::completed(size)));
        assert_eq!(statuses.iter().filter(|s| s.is_done).count(), 1);
        for pair in statuses[..statuses.len() - 1].windows(2) {
            assert_ne!(pair[0].downloaded_bytes, pair[1].downloaded_bytes);
        }
        assert_eq!(
            retry_events(&events),
            vec![RetryEvent::ConnectRetried { succeeded: true }]
        );

        // Cached version satisfies the load without another request
        let handle = provider.load_asset("cube").await.unwrap();
        assert_eq!(&handle.data[..], &plain[..]);
        assert_eq!(loader.live_count(), 1);
        handle.dispose();
        assert_eq!(loader.live_count(), 0);
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_failed_download_retries_and_reports() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/flaky.bundle");
                then.status(503);
            })
            .await;

        let loader = Arc::new(FileBundleLoader::new());
        let provider = build_provider(
            &dir.path().join("cache"),
            catalog(
                vec![BundleEntry {
                    name: "flaky".into(),
                    path: server.url("/flaky.bundle"),
                    options: Some(FetchOptions::new("flaky").with_bundle_size(100)),
                }],
                &[],
            ),
            &loader,
            false,
        )
        .with_retry_policy(Arc::new(FixedIntervalStrategy::new(
            2,
            Duration::from_millis(10),
        )));
        let mut rx = provider.subscribe();

        let err = provider.download("flaky", None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Fetch(FetchError::TransportFailed {
                result: TransportResult::ProtocolError,
                ..
            })
        ));
        mock.assert_hits_async(3).await;

        let events = drain(&mut rx);
        let downloading = events
            .iter()
            .filter(|e| matches!(e, AppEvent::Download(DownloadEvent::Downloading { .. })))
            .count();
        assert_eq!(downloading, 3);
        assert_eq!(
            retry_events(&events),
            vec![
                RetryEvent::ConnectRetrying { attempt: 1 },
                RetryEvent::ConnectRetrying { attempt: 2 },
                RetryEvent::ConnectRetried { succeeded: false },
            ]
        );
        assert!(matches!(
            events.last(),
            Some(AppEvent::General(GeneralEvent::OperationFailed { operation, .. })) if operation == "download"
        ));
        assert!(!dir.path().join("cache/decrypted/flaky.bundle").exists());
    }

    #[tokio::test]
    async fn test_missing_load_options() {
        let dir = TempDir::new().unwrap();
        let loader = Arc::new(FileBundleLoader::new());
        let bare = || {
            catalog(
                vec![BundleEntry {
                    name: "bare".into(),
                    path: "https://cdn.example.com/bare.bundle".into(),
                    options: None,
                }],
                &[],
            )
        };

        // Configuration errors end the call even when every error counts as retryable
        let provider = build_provider(dir.path(), bare(), &loader, false)
            .with_retry_policy(Arc::new(FixedIntervalStrategy::new(3, Duration::ZERO)));
        let mut rx = provider.subscribe();
        assert_eq!(provider.get_download_size("bare").await.unwrap(), 0);
        let err = provider.load_asset("bare").await.unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::NoLoadOptions { .. })));
        assert_eq!(
            retry_events(&drain(&mut rx)),
            vec![RetryEvent::ConnectRetried { succeeded: false }]
        );

        let err = provider.load_asset("torus").await.unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::UnknownAsset { .. })));
        assert_eq!(
            retry_events(&drain(&mut rx)),
            vec![RetryEvent::ConnectRetried { succeeded: false }]
        );

        // Classified errors skip retries for configuration failures
        let provider = build_provider(dir.path(), bare(), &loader, false)
            .with_retry_policy(Arc::new(FixedIntervalStrategy::new(3, Duration::ZERO)))
            .with_retry_predicate(retry_if_transient);
        let mut rx = provider.subscribe();
        assert!(provider.load_asset("bare").await.is_err());
        assert_eq!(
            retry_events(&drain(&mut rx)),
            vec![RetryEvent::ConnectRetried { succeeded: false }]
        );

        assert!(matches!(
            provider.load_asset("torus").await,
            Err(Error::Config(ConfigError::UnknownAsset { .. }))
        ));
    }

    #[tokio::test]
    async fn test_local_bundle_paths() {
        let dir = TempDir::new().unwrap();
        let plain = plaintext();
        let options = FetchOptions::new("local");
        let ciphertext = encrypt_bytes(aes().as_ref(), &options, &plain).unwrap();
        std::fs::create_dir_all(dir.path().join("bundles")).unwrap();
        std::fs::write(dir.path().join("bundles/local.bundle"), &ciphertext).unwrap();

        let local = || {
            catalog(
                vec![BundleEntry {
                    name: "local".into(),
                    path: "bundles/local.bundle".into(),
                    options: Some(options.clone()),
                }],
                &[],
            )
            .with_base_dir(Some(dir.path().to_path_buf()))
        };
        let loader = Arc::new(FileBundleLoader::new());

        // Through the transport the bundle is decrypted
        let via_request = build_provider(&dir.path().join("cache"), local(), &loader, true);
        assert_eq!(via_request.get_download_size("local").await.unwrap(), 0);
        let handle = via_request.load_asset("local").await.unwrap();
        assert_eq!(&handle.data[..], &plain[..]);

        // Direct file loads bypass the sink
        let direct = build_provider(&dir.path().join("cache"), local(), &loader, false);
        let handle = direct.load_asset("local").await.unwrap();
        assert_eq!(&handle.data[..], &ciphertext[..]);
    }

    #[tokio::test]
    async fn test_load_clears_other_cached_versions() {
        let dir = TempDir::new().unwrap();
        let cache_root = dir.path().join("cache");
        let plain = plaintext();
        let options = FetchOptions::new("shapes")
            .with_hash("v2")
            .with_clear_other_cached_versions(true);
        let ciphertext = encrypt_bytes(aes().as_ref(), &options, &plain).unwrap();

        let stale = BundleCache::new(&cache_root).version_dir("shapes", "v1").unwrap();
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("shapes.bundle"), b"old").unwrap();

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/shapes.bundle");
                then.status(200).body(&ciphertext);
            })
            .await;

        let loader = Arc::new(FileBundleLoader::new());
        let provider = build_provider(
            &cache_root,
            catalog(
                vec![BundleEntry {
                    name: "shapes".into(),
                    path: server.url("/shapes.bundle"),
                    options: Some(options.clone()),
                }],
                &[],
            ),
            &loader,
            false,
        );

        let handle = provider.load_asset("shapes").await.unwrap();
        assert_eq!(&handle.data[..], &plain[..]);
        assert!(!stale.exists());
        assert!(provider
            .context()
            .cache
            .is_version_cached(&options, "shapes.bundle")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_crc_mismatch_fails_load() {
        let dir = TempDir::new().unwrap();
        let plain = plaintext();
        let options = FetchOptions::new("shapes")
            .with_hash("v1")
            .with_crc(crc32fast::hash(&plain) ^ 0xff, false);
        let ciphertext = encrypt_bytes(aes().as_ref(), &options, &plain).unwrap();

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/shapes.bundle");
                then.status(200).body(&ciphertext);
            })
            .await;

        let loader = Arc::new(FileBundleLoader::new());
        let provider = build_provider(
            &dir.path().join("cache"),
            catalog(
                vec![BundleEntry {
                    name: "shapes".into(),
                    path: server.url("/shapes.bundle"),
                    options: Some(options.clone()),
                }],
                &[],
            ),
            &loader,
            false,
        );

        let err = provider.load_asset("shapes").await.unwrap_err();
        assert!(matches!(err, Error::Fetch(FetchError::CrcMismatch { .. })));
        // A version that failed to load is not kept
        assert!(!provider
            .context()
            .cache
            .is_version_cached(&options, "shapes.bundle")
            .await
            .unwrap());
    }

    /// Loader that reports sink misuse on every call.
    #[derive(Default)]
    struct MisusedSinkLoader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BundleLoader for MisusedSinkLoader {
        async fn load(
            &self,
            path: &Path,
            _bundle_name: &str,
            _crc_to_check: Option<u32>,
        ) -> Result<LoadedBundle, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StreamError::Reentrancy {
                operation: "receive".to_string(),
                path: path.display().to_string(),
            }
            .into())
        }

        fn unload(&self, _bundle: &LoadedBundle) {}
    }

    #[tokio::test]
    async fn test_stream_errors_are_not_retried() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("local.bundle"), b"bundle bytes").unwrap();
        let bundles = catalog(
            vec![BundleEntry {
                name: "local".into(),
                path: "local.bundle".into(),
                options: Some(FetchOptions::new("local")),
            }],
            &[],
        )
        .with_base_dir(Some(dir.path().to_path_buf()));

        let loader = Arc::new(MisusedSinkLoader::default());
        let context = FetchContext::new(
            Arc::new(FileTransport::default()),
            aes(),
            loader.clone(),
            BundleCache::new(dir.path().join("cache")),
        );
        let provider = AssetProvider::new(Arc::new(bundles), context, EventBus::new(64))
            .with_retry_policy(Arc::new(FixedIntervalStrategy::new(3, Duration::ZERO)));
        let mut rx = provider.subscribe();

        let err = provider.load_asset("local").await.unwrap_err();
        assert!(matches!(err, Error::Stream(StreamError::Reentrancy { .. })));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);

        let events = drain(&mut rx);
        assert_eq!(
            retry_events(&events),
            vec![RetryEvent::ConnectRetried { succeeded: false }]
        );
        assert!(matches!(
            events.last(),
            Some(AppEvent::General(GeneralEvent::OperationFailed { operation, failure }))
                if operation == "load" && failure.code.as_deref() == Some("stream.reentrancy")
        ));
    }
}
