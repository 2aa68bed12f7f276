#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Asset fetching for bundlefetch
//!
//! Ties the transport, the decrypt sink and the retry wrapper together:
//!
//! - [`BundleFetch`] decides how a bundle is loaded and drives one fetch
//! - [`ProgressMonitor`] samples a running fetch into download events
//! - [`BundleCache`] owns the staging area and the per-version cache
//! - [`AssetProvider`] is the facade callers use to size, download and load

pub mod cache;
pub mod catalog;
pub mod fetch;
pub mod handle;
pub mod loader;
pub mod progress;
pub mod provider;

pub use cache::BundleCache;
pub use catalog::{AssetLocator, BundleEntry, Catalog};
pub use fetch::{BundleFetch, FetchContext, FetchState};
pub use handle::AssetHandle;
pub use loader::{BundleLoader, FileBundleLoader, LoadedBundle};
pub use progress::{FetchProgress, ProgressMonitor};
pub use provider::AssetProvider;
