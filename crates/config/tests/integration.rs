//! Integration tests for config

#[cfg(test)]
mod tests {
    use bundlefetch_config::*;
    use bundlefetch_errors::{ConfigError, Error};
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    // Mutex to ensure env var tests don't run concurrently
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_VARS: [&str; 6] = [
        "BUNDLEFETCH_RETRY_STRATEGY",
        "BUNDLEFETCH_MAX_RETRIES",
        "BUNDLEFETCH_CACHE_DIR",
        "BUNDLEFETCH_STRICT_DECRYPT",
        "BUNDLEFETCH_USE_REQUEST_FOR_LOCAL",
        "BUNDLEFETCH_PROGRESS_INTERVAL_MS",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[network]
timeout_secs = 60

[retry]
strategy = "exponential"
max_retries = 5
classify_errors = true

[fetch]
use_request_for_local_bundles = true
block_size = 256
cache_dir = "/tmp/bundles"

[progress]
interval_ms = 100
        "#
        )
        .unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.network.timeout(), Duration::from_secs(60));
        assert_eq!(config.network.connect_timeout_secs, 30);
        assert_eq!(config.retry.strategy, RetryStrategyKind::Exponential);
        assert_eq!(config.retry.max_retries, 5);
        assert!(config.retry.classify_errors);
        assert_eq!(config.retry.initial_delay(), Duration::from_millis(500));
        assert!(config.fetch.use_request_for_local_bundles);
        assert_eq!(config.fetch.block_size, 256);
        assert!(!config.fetch.strict_decrypt);
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/bundles"));
        assert_eq!(config.progress.interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.retry.strategy, RetryStrategyKind::None);
        assert!(!config.retry.classify_errors);
        assert_eq!(config.fetch.block_size, 4096);
        assert_eq!(config.progress.interval_ms, 0);
        assert!(config.cache_dir().ends_with("bundlefetch"));
    }

    #[tokio::test]
    async fn test_parse_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[retry\nstrategy = ").unwrap();
        let err = Config::load_from_file(temp_file.path()).await.unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::ParseError { .. })));
    }

    #[tokio::test]
    async fn test_zero_block_size_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[fetch]\nblock_size = 0").unwrap();
        let err = Config::load_from_file(temp_file.path()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidValue { field, .. }) if field == "fetch.block_size"
        ));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = Config::load_from_file(std::path::Path::new("/nonexistent/bundlefetch.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::NotFound { .. })));
    }

    #[test]
    fn test_merge_env() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var("BUNDLEFETCH_RETRY_STRATEGY", "fixed");
        std::env::set_var("BUNDLEFETCH_MAX_RETRIES", "7");
        std::env::set_var("BUNDLEFETCH_CACHE_DIR", "/var/cache/bf");
        std::env::set_var("BUNDLEFETCH_STRICT_DECRYPT", "yes");
        std::env::set_var("BUNDLEFETCH_USE_REQUEST_FOR_LOCAL", "1");
        std::env::set_var("BUNDLEFETCH_PROGRESS_INTERVAL_MS", "250");

        let mut config = Config::default();
        config.merge_env().unwrap();

        assert_eq!(config.retry.strategy, RetryStrategyKind::Fixed);
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.cache_dir(), PathBuf::from("/var/cache/bf"));
        assert!(config.fetch.strict_decrypt);
        assert!(config.fetch.use_request_for_local_bundles);
        assert_eq!(config.progress.interval_ms, 250);

        clear_env();
    }

    #[test]
    fn test_invalid_env_value() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var("BUNDLEFETCH_RETRY_STRATEGY", "sometimes");

        let mut config = Config::default();
        let result = config.merge_env();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidValue { field, value }))
                if field == "BUNDLEFETCH_RETRY_STRATEGY" && value == "sometimes"
        ));

        clear_env();
    }

    #[test]
    fn test_invalid_bool_env_value() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var("BUNDLEFETCH_STRICT_DECRYPT", "maybe");
        let mut config = Config::default();
        assert!(config.merge_env().is_err());

        clear_env();
    }
}
