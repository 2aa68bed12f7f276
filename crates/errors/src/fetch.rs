//! Fetch and transport error types

use std::borrow::Cow;
use std::fmt;

use crate::UserFacingError;
use thiserror::Error;

/// Outcome reported by a transport once a request settles.
///
/// This is independent of payload validity: a request can succeed at the
/// transport level and still carry a bundle that fails to decrypt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TransportResult {
    Success,
    ConnectionError,
    ProtocolError,
    DataProcessingError,
}

impl TransportResult {
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for TransportResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "Success",
            Self::ConnectionError => "ConnectionError",
            Self::ProtocolError => "ProtocolError",
            Self::DataProcessingError => "DataProcessingError",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FetchError {
    #[error("download has failed. result:{result} path:{path}")]
    TransportFailed {
        result: TransportResult,
        path: String,
        message: String,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("connection timeout to {url}")]
    Timeout { url: String },

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid path for bundle: '{path}'")]
    InvalidBundle { path: String },

    #[error("CRC mismatch for {path}: expected {expected:08x}, got {actual:08x}")]
    CrcMismatch {
        path: String,
        expected: u32,
        actual: u32,
    },
}

impl FetchError {
    /// Build a transport failure for `path` with the given result.
    #[must_use]
    pub fn transport(
        result: TransportResult,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::TransportFailed {
            result,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl UserFacingError for FetchError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::TransportFailed { .. } | Self::ConnectionFailed(_) | Self::Timeout { .. } => {
                Some("Check your network connection and retry.")
            }
            Self::HttpStatus { .. } => Some("Verify the bundle URL is reachable from this host."),
            Self::InvalidUrl(_) => Some("Fix the bundle location in the catalog."),
            Self::CrcMismatch { .. } => {
                Some("The bundle is corrupted or was encrypted with a different key.")
            }
            Self::InvalidBundle { .. } => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::TransportFailed { .. }
            | Self::ConnectionFailed(_)
            | Self::Timeout { .. }
            | Self::InvalidBundle { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::InvalidUrl(_) | Self::CrcMismatch { .. } => false,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::TransportFailed { .. } => "fetch.transport",
            Self::HttpStatus { .. } => "fetch.http_status",
            Self::Timeout { .. } => "fetch.timeout",
            Self::ConnectionFailed(_) => "fetch.connection_failed",
            Self::InvalidUrl(_) => "fetch.invalid_url",
            Self::InvalidBundle { .. } => "fetch.invalid_bundle",
            Self::CrcMismatch { .. } => "fetch.crc_mismatch",
        };
        Some(code)
    }
}
