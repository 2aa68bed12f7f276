//! CLI error handling

use std::fmt;

use bundlefetch_errors::UserFacingError;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Configuration error
    Config(bundlefetch_errors::ConfigError),
    /// Fetch, decrypt or load error
    Ops(bundlefetch_errors::Error),
    /// Invalid command arguments
    InvalidArguments(String),
    /// I/O error
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {e}"),
            CliError::Ops(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this operation.")?;
                }
                Ok(())
            }
            CliError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl CliError {
    /// Structured form printed on stdout in `--json` mode
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CliError::Ops(e) => serde_json::json!({
                "error": e,
                "message": e.user_message(),
                "code": e.user_code(),
                "hint": e.user_hint(),
                "retryable": e.is_retryable(),
            }),
            CliError::Config(e) => serde_json::json!({
                "error": e,
                "message": e.user_message(),
                "code": e.user_code(),
                "hint": e.user_hint(),
                "retryable": false,
            }),
            CliError::InvalidArguments(_) | CliError::Io(_) => serde_json::json!({
                "message": self.to_string(),
                "retryable": false,
            }),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Ops(e) => Some(e),
            CliError::Io(e) => Some(e),
            CliError::InvalidArguments(_) => None,
        }
    }
}

impl From<bundlefetch_errors::ConfigError> for CliError {
    fn from(e: bundlefetch_errors::ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<bundlefetch_errors::Error> for CliError {
    fn from(e: bundlefetch_errors::Error) -> Self {
        match e {
            bundlefetch_errors::Error::Config(config) => CliError::Config(config),
            other => CliError::Ops(other),
        }
    }
}

impl From<bundlefetch_errors::DecryptError> for CliError {
    fn from(e: bundlefetch_errors::DecryptError) -> Self {
        CliError::Ops(e.into())
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}
