use serde::{Deserialize, Serialize};

use bundlefetch_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

pub mod download;
pub mod general;
pub mod retry;

pub use download::*;
pub use general::*;
pub use retry::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// Operation lifecycle
    General(GeneralEvent),

    /// Download start and progress samples
    Download(DownloadEvent),

    /// Retry attempts and outcomes
    Retry(RetryEvent),
}

impl AppEvent {
    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::General(GeneralEvent::OperationFailed { .. })
            | Self::Retry(RetryEvent::ConnectRetried { succeeded: false }) => Level::ERROR,

            Self::Retry(RetryEvent::ConnectRetrying { .. }) => Level::WARN,

            // Progress samples are chatty
            Self::Download(DownloadEvent::Downloaded { .. }) => Level::DEBUG,

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "bundlefetch::events::general",
            Self::Download(_) => "bundlefetch::events::download",
            Self::Retry(_) => "bundlefetch::events::retry",
        }
    }
}

impl From<GeneralEvent> for AppEvent {
    fn from(event: GeneralEvent) -> Self {
        Self::General(event)
    }
}

impl From<DownloadEvent> for AppEvent {
    fn from(event: DownloadEvent) -> Self {
        Self::Download(event)
    }
}

impl From<RetryEvent> for AppEvent {
    fn from(event: RetryEvent) -> Self {
        Self::Retry(event)
    }
}
