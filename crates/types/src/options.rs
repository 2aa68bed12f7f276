//! Per-bundle fetch options

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options attached to a bundle location.
///
/// Built once per fetch and never mutated afterwards; the fetch state machine
/// holds its own copy for the lifetime of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOptions {
    /// CRC-32 of the decrypted bundle, `None` disables the check
    #[serde(default)]
    pub crc: Option<u32>,
    /// Also check CRC when loading a previously cached copy
    #[serde(default)]
    pub use_crc_for_cache: bool,
    /// Version hash; enables the version cache when set
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub chunked_transfer: bool,
    /// Maximum HTTP redirects; 0 or negative keeps the transport default
    #[serde(default)]
    pub redirect_limit: i32,
    /// Reconnect attempts made by the transport itself
    #[serde(default)]
    pub retry_count: i32,
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,
    pub bundle_name: String,
    #[serde(default)]
    pub bundle_size: u64,
    #[serde(default)]
    pub clear_other_cached_versions_on_load: bool,
}

fn default_timeout() -> Duration {
    Duration::ZERO
}

impl FetchOptions {
    #[must_use]
    pub fn new(bundle_name: impl Into<String>) -> Self {
        Self {
            crc: None,
            use_crc_for_cache: false,
            hash: None,
            chunked_transfer: false,
            redirect_limit: 0,
            retry_count: 0,
            timeout: Duration::ZERO,
            bundle_name: bundle_name.into(),
            bundle_size: 0,
            clear_other_cached_versions_on_load: false,
        }
    }

    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    #[must_use]
    pub fn with_crc(mut self, crc: u32, use_for_cache: bool) -> Self {
        self.crc = Some(crc);
        self.use_crc_for_cache = use_for_cache;
        self
    }

    #[must_use]
    pub fn with_bundle_size(mut self, size: u64) -> Self {
        self.bundle_size = size;
        self
    }

    #[must_use]
    pub fn with_redirect_limit(mut self, limit: i32) -> Self {
        self.redirect_limit = limit;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_clear_other_cached_versions(mut self, clear: bool) -> Self {
        self.clear_other_cached_versions_on_load = clear;
        self
    }

    /// Hash to key the version cache with, ignoring empty strings.
    #[must_use]
    pub fn cache_hash(&self) -> Option<&str> {
        self.hash.as_deref().filter(|h| !h.is_empty())
    }

    /// Redirect limit if one was configured.
    #[must_use]
    pub fn redirect_limit(&self) -> Option<usize> {
        usize::try_from(self.redirect_limit).ok().filter(|l| *l > 0)
    }

    /// Timeout if one was configured.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }

    /// Whether CRC must be checked for a load that did or did not come from cache.
    #[must_use]
    pub fn crc_to_check(&self, from_cache: bool) -> Option<u32> {
        match self.crc {
            Some(0) | None => None,
            Some(_) if from_cache && !self.use_crc_for_cache => None,
            Some(crc) => Some(crc),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
