//! Transport collaborator interface

use async_trait::async_trait;
use bundlefetch_errors::{Error, FetchError, TransportResult};
use bundlefetch_types::FetchOptions;
use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Response body delivered chunk by chunk.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// One request for a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub url: Url,
    pub redirect_limit: Option<usize>,
    pub timeout: Option<Duration>,
    /// Reconnect attempts made by the transport before giving up
    pub retry_count: u32,
}

impl TransportRequest {
    /// Build a request for `url` honouring the per-bundle options.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` does not parse.
    pub fn new(url: &str, options: &FetchOptions) -> Result<Self, Error> {
        let url = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self {
            url,
            redirect_limit: options.redirect_limit(),
            timeout: options.timeout(),
            retry_count: u32::try_from(options.retry_count).unwrap_or(0),
        })
    }
}

/// A response whose headers have arrived.
pub struct TransportResponse {
    /// Body length if the server announced it
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a streaming request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent or is answered with a
    /// failure status.
    async fn open(&self, request: &TransportRequest) -> Result<TransportResponse, Error>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn open(&self, request: &TransportRequest) -> Result<TransportResponse, Error> {
        (**self).open(request).await
    }
}

/// Classify a transport-level error.
#[must_use]
pub fn transport_result_of(error: &Error) -> TransportResult {
    match error {
        Error::Fetch(FetchError::TransportFailed { result, .. }) => *result,
        Error::Fetch(FetchError::HttpStatus { .. } | FetchError::InvalidUrl(_)) => {
            TransportResult::ProtocolError
        }
        Error::Fetch(FetchError::Timeout { .. } | FetchError::ConnectionFailed(_))
        | Error::Io { .. } => TransportResult::ConnectionError,
        _ => TransportResult::DataProcessingError,
    }
}

/// Routes requests to a transport by URL scheme.
pub struct SchemeRouter {
    http: Arc<dyn Transport>,
    file: Arc<dyn Transport>,
}

impl SchemeRouter {
    #[must_use]
    pub fn new(http: Arc<dyn Transport>, file: Arc<dyn Transport>) -> Self {
        Self { http, file }
    }
}

#[async_trait]
impl Transport for SchemeRouter {
    async fn open(&self, request: &TransportRequest) -> Result<TransportResponse, Error> {
        match request.url.scheme() {
            "http" | "https" => self.http.open(request).await,
            "file" => self.file.open(request).await,
            other => Err(FetchError::InvalidUrl(format!(
                "unsupported scheme '{other}' in {}",
                request.url
            ))
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_honours_options() {
        let options = FetchOptions::new("cube")
            .with_redirect_limit(4)
            .with_timeout(Duration::from_secs(9));
        let request = TransportRequest::new("https://cdn.example.com/cube.bundle", &options).unwrap();
        assert_eq!(request.redirect_limit, Some(4));
        assert_eq!(request.timeout, Some(Duration::from_secs(9)));
        assert_eq!(request.retry_count, 0);
    }

    #[test]
    fn invalid_url_is_rejected() {
        let err = TransportRequest::new("not a url", &FetchOptions::new("cube")).unwrap_err();
        assert!(matches!(err, Error::Fetch(FetchError::InvalidUrl(_))));
    }

    #[test]
    fn transport_results() {
        let status: Error = FetchError::HttpStatus {
            status: 404,
            url: "u".into(),
        }
        .into();
        assert_eq!(transport_result_of(&status), TransportResult::ProtocolError);

        let io: Error = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert_eq!(transport_result_of(&io), TransportResult::ConnectionError);

        let write = Error::internal("sink");
        assert_eq!(
            transport_result_of(&write),
            TransportResult::DataProcessingError
        );
    }
}
