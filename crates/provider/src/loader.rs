//! Bundle loading collaborator

use async_trait::async_trait;
use bundlefetch_errors::{Error, FetchError};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs;
use tracing::debug;

/// A decrypted bundle held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedBundle {
    pub bundle_name: String,
    /// File the bundle was loaded from
    pub path: PathBuf,
    pub data: Bytes,
    /// CRC-32 of `data`
    pub crc: u32,
}

/// Turns a decrypted bundle file into a loaded resource.
#[async_trait]
pub trait BundleLoader: Send + Sync {
    /// Load the bundle at `path`, verifying `crc_to_check` when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is empty, or fails the
    /// CRC check.
    async fn load(
        &self,
        path: &Path,
        bundle_name: &str,
        crc_to_check: Option<u32>,
    ) -> Result<LoadedBundle, Error>;

    /// Release a bundle previously returned by [`load`](Self::load).
    fn unload(&self, bundle: &LoadedBundle);
}

/// Reads bundles into memory.
#[derive(Debug, Default)]
pub struct FileBundleLoader {
    live: AtomicUsize,
}

impl FileBundleLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bundles loaded and not yet unloaded.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BundleLoader for FileBundleLoader {
    async fn load(
        &self,
        path: &Path,
        bundle_name: &str,
        crc_to_check: Option<u32>,
    ) -> Result<LoadedBundle, Error> {
        let data = fs::read(path)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;
        if data.is_empty() {
            return Err(FetchError::InvalidBundle {
                path: path.display().to_string(),
            }
            .into());
        }

        let crc = crc32fast::hash(&data);
        if let Some(expected) = crc_to_check {
            if expected != crc {
                return Err(FetchError::CrcMismatch {
                    path: path.display().to_string(),
                    expected,
                    actual: crc,
                }
                .into());
            }
        }

        self.live.fetch_add(1, Ordering::SeqCst);
        debug!(
            bundle = bundle_name,
            path = %path.display(),
            size = data.len(),
            crc_checked = crc_to_check.is_some(),
            "bundle loaded"
        );
        Ok(LoadedBundle {
            bundle_name: bundle_name.to_string(),
            path: path.to_path_buf(),
            data: Bytes::from(data),
            crc,
        })
    }

    fn unload(&self, bundle: &LoadedBundle) {
        // Saturate so a foreign bundle cannot underflow the count
        let _ = self
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        debug!(bundle = %bundle.bundle_name, "bundle unloaded");
    }
}
