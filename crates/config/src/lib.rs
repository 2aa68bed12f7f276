#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for bundlefetch
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/bundlefetch/config.toml)
//! - Environment variables
//! - CLI flags

pub mod settings;

pub use settings::{FetchConfig, NetworkConfig, ProgressConfig, RetryConfig, RetryStrategyKind};

use bundlefetch_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub progress: ProgressConfig,
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("bundlefetch").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        if let Ok(strategy) = std::env::var("BUNDLEFETCH_RETRY_STRATEGY") {
            self.retry.strategy = RetryStrategyKind::from_str(&strategy)
                .map_err(|value| invalid("BUNDLEFETCH_RETRY_STRATEGY", value))?;
        }

        if let Ok(retries) = std::env::var("BUNDLEFETCH_MAX_RETRIES") {
            self.retry.max_retries = retries
                .parse()
                .map_err(|_| invalid("BUNDLEFETCH_MAX_RETRIES", retries))?;
        }

        if let Ok(dir) = std::env::var("BUNDLEFETCH_CACHE_DIR") {
            if dir.is_empty() {
                return Err(invalid("BUNDLEFETCH_CACHE_DIR", dir).into());
            }
            self.fetch.cache_dir = Some(PathBuf::from(dir));
        }

        if let Ok(strict) = std::env::var("BUNDLEFETCH_STRICT_DECRYPT") {
            self.fetch.strict_decrypt = parse_bool("BUNDLEFETCH_STRICT_DECRYPT", strict)?;
        }

        if let Ok(local) = std::env::var("BUNDLEFETCH_USE_REQUEST_FOR_LOCAL") {
            self.fetch.use_request_for_local_bundles =
                parse_bool("BUNDLEFETCH_USE_REQUEST_FOR_LOCAL", local)?;
        }

        if let Ok(interval) = std::env::var("BUNDLEFETCH_PROGRESS_INTERVAL_MS") {
            self.progress.interval_ms = interval
                .parse()
                .map_err(|_| invalid("BUNDLEFETCH_PROGRESS_INTERVAL_MS", interval))?;
        }

        self.validate()
    }

    /// Reject values that would break the fetch pipeline.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending field.
    pub fn validate(&self) -> Result<(), Error> {
        if self.fetch.block_size == 0 {
            return Err(invalid("fetch.block_size", "0").into());
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid(
                "retry.backoff_multiplier",
                self.retry.backoff_multiplier.to_string(),
            )
            .into());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(invalid("retry.jitter_factor", self.retry.jitter_factor.to_string()).into());
        }
        Ok(())
    }

    /// Get the bundle cache root (with default)
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.fetch.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("bundlefetch")
        })
    }
}

fn invalid(field: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.into(),
    }
}

fn parse_bool(field: &str, value: String) -> Result<bool, ConfigError> {
    match value.as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(field, value)),
    }
}
