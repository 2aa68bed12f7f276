//! Disposable wrapper around loaded assets

use std::fmt;
use std::ops::Deref;

type Release<T> = Box<dyn FnOnce(&T) + Send>;

/// An asset that is released exactly once.
///
/// Release happens on [`dispose`](Self::dispose) or, failing that, on drop.
pub struct AssetHandle<T> {
    asset: T,
    release: Option<Release<T>>,
}

impl<T> AssetHandle<T> {
    #[must_use]
    pub fn new(asset: T, release: impl FnOnce(&T) + Send + 'static) -> Self {
        Self {
            asset,
            release: Some(Box::new(release)),
        }
    }

    #[must_use]
    pub fn get(&self) -> &T {
        &self.asset
    }

    /// Release the asset now.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release(&self.asset);
        }
    }
}

impl<T> Deref for AssetHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.asset
    }
}

impl<T> Drop for AssetHandle<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: fmt::Debug> fmt::Debug for AssetHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetHandle")
            .field("asset", &self.asset)
            .field("released", &self.release.is_none())
            .finish()
    }
}
