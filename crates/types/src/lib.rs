#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for bundlefetch
//!
//! This crate provides the value types shared by the transport, decryption
//! and provider crates: download status snapshots, per-bundle fetch options
//! and bundle locations.

pub mod location;
pub mod options;
pub mod status;

// Re-export commonly used types
pub use location::{should_use_request, to_file_url, BundleLocation};
pub use options::FetchOptions;
pub use status::{DownloadStatus, NamedDownloadStatus};
