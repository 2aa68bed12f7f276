//! HTTP transport with connection pooling and reconnect logic

use async_trait::async_trait;
use bundlefetch_config::NetworkConfig;
use bundlefetch_errors::{Error, FetchError, TransportResult};
use futures::StreamExt;
use reqwest::{redirect, Client, Response};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::transport::{Transport, TransportRequest, TransportResponse};

/// Delay unit between reconnect attempts; attempt `n` waits `n` units.
const RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Streams bundles over HTTP(S).
///
/// Clients are pooled per redirect limit since `reqwest` fixes the redirect
/// policy at client construction.
pub struct HttpTransport {
    config: NetworkConfig,
    default_client: Client,
    limited_clients: Mutex<HashMap<usize, Client>>,
    reconnect_delay: Duration,
}

impl HttpTransport {
    /// Create a new HTTP transport
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to initialize.
    pub fn new(config: NetworkConfig) -> Result<Self, Error> {
        let default_client = build_client(&config, redirect::Policy::default())?;
        Ok(Self {
            config,
            default_client,
            limited_clients: Mutex::new(HashMap::new()),
            reconnect_delay: RECONNECT_DELAY,
        })
    }

    /// Create with default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created with default settings.
    pub fn with_defaults() -> Result<Self, Error> {
        Self::new(NetworkConfig::default())
    }

    /// Override the delay unit between reconnect attempts.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    fn client_for(&self, redirect_limit: Option<usize>) -> Result<Client, Error> {
        let Some(limit) = redirect_limit else {
            return Ok(self.default_client.clone());
        };
        let mut clients = self
            .limited_clients
            .lock()
            .map_err(|_| Error::internal("http client pool poisoned"))?;
        if let Some(client) = clients.get(&limit) {
            return Ok(client.clone());
        }
        debug!(limit, "building http client with redirect limit");
        let client = build_client(&self.config, redirect::Policy::limited(limit))?;
        clients.insert(limit, client.clone());
        Ok(client)
    }

    /// Execute a request with reconnects
    async fn retry_request(
        &self,
        client: &Client,
        request: &TransportRequest,
    ) -> Result<Response, Error> {
        let mut last_error = None;

        for attempt in 0..=request.retry_count {
            if attempt > 0 {
                warn!(url = %request.url, attempt, "reconnecting");
                tokio::time::sleep(self.reconnect_delay * attempt).await;
            }

            let mut builder = client.get(request.url.clone());
            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }

            match builder.send().await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let retry = Self::should_retry(&e);
                    last_error = Some(e);
                    // Don't retry on certain errors
                    if !retry {
                        break;
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => map_reqwest_error(&e, request),
            None => FetchError::ConnectionFailed("no request was sent".to_string()).into(),
        })
    }

    /// Determine if an error should be retried
    fn should_retry(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect() || error.is_request()
    }
}

fn build_client(config: &NetworkConfig, policy: redirect::Policy) -> Result<Client, Error> {
    Client::builder()
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .user_agent(&config.user_agent)
        .redirect(policy)
        .build()
        .map_err(|e| FetchError::ConnectionFailed(e.to_string()).into())
}

fn map_reqwest_error(error: &reqwest::Error, request: &TransportRequest) -> Error {
    if error.is_timeout() {
        FetchError::Timeout {
            url: request.url.to_string(),
        }
        .into()
    } else if error.is_redirect() {
        FetchError::transport(
            TransportResult::ProtocolError,
            request.url.as_str(),
            error.to_string(),
        )
        .into()
    } else {
        FetchError::ConnectionFailed(error.to_string()).into()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &TransportRequest) -> Result<TransportResponse, Error> {
        let client = self.client_for(request.redirect_limit)?;
        let response = self.retry_request(&client, request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: request.url.to_string(),
            }
            .into());
        }

        let content_length = response.content_length();
        debug!(url = %request.url, ?content_length, "response headers received");

        let url = request.url.to_string();
        let body = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| -> Error {
                if e.is_timeout() {
                    FetchError::Timeout { url: url.clone() }.into()
                } else {
                    FetchError::ConnectionFailed(e.to_string()).into()
                }
            })
        });

        Ok(TransportResponse {
            content_length,
            body: Box::pin(body),
        })
    }
}
