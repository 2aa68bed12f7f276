//! Bundle locations and load-path predicates

use bundlefetch_errors::{Error, FetchError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::FetchOptions;

/// Where a bundle lives and how to fetch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLocation {
    /// Resolved path or URL of the bundle artifact
    pub internal_id: String,
    /// Fetch options; a location without options cannot be fetched
    #[serde(default)]
    pub options: Option<FetchOptions>,
}

impl BundleLocation {
    #[must_use]
    pub fn new(internal_id: impl Into<String>, options: Option<FetchOptions>) -> Self {
        Self {
            internal_id: internal_id.into(),
            options,
        }
    }

    /// File name component of the location, used to key staging files.
    #[must_use]
    pub fn file_name(&self) -> String {
        file_name_of(&self.internal_id)
    }
}

/// Whether `path` must go through the network stack.
///
/// Anything carrying a URL scheme does; plain file-system paths do not.
#[must_use]
pub fn should_use_request(path: &str) -> bool {
    path.contains("://")
}

/// Turn a local path into an absolute `file://` URL.
///
/// # Errors
///
/// Returns an error if the path cannot be made absolute or is not
/// representable as a URL.
pub fn to_file_url(path: &str) -> Result<String, Error> {
    let absolute = std::path::absolute(Path::new(path))
        .map_err(|e| Error::io_with_path(&e, path))?;
    Url::from_file_path(&absolute)
        .map(String::from)
        .map_err(|()| FetchError::InvalidUrl(absolute.display().to_string()).into())
}

fn file_name_of(id: &str) -> String {
    let trimmed = id.split(['?', '#']).next().unwrap_or(id);
    trimmed
        .rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}
