//! On-disk bundle cache
//!
//! ```text
//! <root>/decrypted/<file>                      in-flight and staged bundles
//! <root>/versions/<bundle>/<hash>/<file>       cached bundle versions
//! ```

use bundlefetch_errors::{ConfigError, Error};
use bundlefetch_types::FetchOptions;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const STAGING_DIR: &str = "decrypted";
const VERSIONS_DIR: &str = "versions";

/// Staging area and version cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct BundleCache {
    root: PathBuf,
}

impl BundleCache {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the sink writes `file_name` while it downloads.
    #[must_use]
    pub fn staging_path(&self, file_name: &str) -> PathBuf {
        self.root.join(STAGING_DIR).join(file_name)
    }

    /// Directory holding one cached version of a bundle.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle name or hash cannot be used as a
    /// single path component.
    pub fn version_dir(&self, bundle_name: &str, hash: &str) -> Result<PathBuf, Error> {
        Ok(self
            .bundle_dir(bundle_name)?
            .join(path_component("hash", hash)?))
    }

    fn bundle_dir(&self, bundle_name: &str) -> Result<PathBuf, Error> {
        Ok(self
            .root
            .join(VERSIONS_DIR)
            .join(path_component("bundle_name", bundle_name)?))
    }

    fn version_path(&self, options: &FetchOptions, file_name: &str) -> Result<Option<PathBuf>, Error> {
        let Some(hash) = options.cache_hash() else {
            return Ok(None);
        };
        Ok(Some(
            self.version_dir(&options.bundle_name, hash)?
                .join(path_component("file_name", file_name)?),
        ))
    }

    /// Path of the cached copy for this version, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the options name an unusable cache location.
    pub async fn cached_version(
        &self,
        options: &FetchOptions,
        file_name: &str,
    ) -> Result<Option<PathBuf>, Error> {
        let Some(path) = self.version_path(options, file_name)? else {
            return Ok(None);
        };
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(Some(path)),
            _ => Ok(None),
        }
    }

    /// Whether this version of the bundle is already cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the options name an unusable cache location.
    pub async fn is_version_cached(
        &self,
        options: &FetchOptions,
        file_name: &str,
    ) -> Result<bool, Error> {
        Ok(self.cached_version(options, file_name).await?.is_some())
    }

    /// Move a staged bundle into the version cache.
    ///
    /// Returns the staged path unchanged when the options carry no hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the version directory cannot be created or the
    /// file cannot be moved.
    pub async fn store(
        &self,
        staged: &Path,
        options: &FetchOptions,
        file_name: &str,
    ) -> Result<PathBuf, Error> {
        let Some(target) = self.version_path(options, file_name)? else {
            return Ok(staged.to_path_buf());
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(&e, parent))?;
        }

        if fs::rename(staged, &target).await.is_err() {
            // Cache root may sit on another file system
            fs::copy(staged, &target)
                .await
                .map_err(|e| Error::io_with_path(&e, &target))?;
            fs::remove_file(staged)
                .await
                .map_err(|e| Error::io_with_path(&e, staged))?;
        }
        debug!(bundle = %options.bundle_name, path = %target.display(), "stored bundle version");
        Ok(target)
    }

    /// Remove one cached version.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub async fn clear_cached_version(&self, bundle_name: &str, hash: &str) -> Result<(), Error> {
        let dir = self.version_dir(bundle_name, hash)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(bundle = bundle_name, hash, "cleared cached version");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io_with_path(&e, dir)),
        }
    }

    /// Remove every cached version of `bundle_name` except `keep_hash`.
    ///
    /// Returns the number of versions removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle directory cannot be listed or a
    /// version cannot be removed.
    pub async fn clear_other_cached_versions(
        &self,
        bundle_name: &str,
        keep_hash: &str,
    ) -> Result<usize, Error> {
        let dir = self.bundle_dir(bundle_name)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::io_with_path(&e, dir)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io_with_path(&e, &dir))?
        {
            if entry.file_name() == keep_hash {
                continue;
            }
            let path = entry.path();
            let result = if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            result.map_err(|e| Error::io_with_path(&e, &path))?;
            removed += 1;
        }
        debug!(bundle = bundle_name, keep = keep_hash, removed, "cleared other cached versions");
        Ok(removed)
    }

    /// Delete a staged file; a missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn remove_staged(&self, path: &Path) -> Result<(), Error> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io_with_path(&e, path)),
        }
    }

    /// Drop zero-byte files and empty directories below the cache root.
    ///
    /// Failures are logged and skipped. Returns the number of entries
    /// removed.
    pub async fn prune(&self) -> usize {
        let mut removed = 0;
        for top in [STAGING_DIR, VERSIONS_DIR] {
            removed += prune_tree(&self.root.join(top)).await;
        }
        if removed > 0 {
            debug!(root = %self.root.display(), removed, "pruned bundle cache");
        }
        removed
    }
}

fn path_component<'a>(field: &str, value: &'a str) -> Result<&'a str, Error> {
    let usable = !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\']);
    if usable {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
        .into())
    }
}

async fn prune_tree(top: &Path) -> usize {
    let mut removed = 0;
    let mut pending = vec![top.to_path_buf()];
    let mut dirs = Vec::new();

    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to list cache directory");
                continue;
            }
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "failed to read cache entry");
                    break;
                }
            };
            let path = entry.path();
            match entry.metadata().await {
                Ok(meta) if meta.is_dir() => pending.push(path),
                Ok(meta) if meta.is_file() && meta.len() == 0 => {
                    match fs::remove_file(&path).await {
                        Ok(()) => removed += 1,
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "failed to remove empty file");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to stat cache entry"),
            }
        }
        if dir != top {
            dirs.push(dir);
        }
    }

    // Children were discovered after their parents
    for dir in dirs.into_iter().rev() {
        if is_empty_dir(&dir).await {
            match fs::remove_dir(&dir).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %dir.display(), error = %e, "failed to remove empty directory"),
            }
        }
    }
    removed
}

async fn is_empty_dir(dir: &Path) -> bool {
    match fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    }
}
