//! Streaming sink misuse errors

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

/// Programming errors in how a streaming sink is driven.
///
/// These are never retried.
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StreamError {
    #[error("sink for {path} re-entered during {operation}")]
    Reentrancy { operation: String, path: String },

    #[error("sink for {path} used after {state}")]
    UseAfterClose { state: String, path: String },
}

impl UserFacingError for StreamError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        Some("This is a bug in the transport driving the sink; please report it.")
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Reentrancy { .. } => "stream.reentrancy",
            Self::UseAfterClose { .. } => "stream.use_after_close",
        };
        Some(code)
    }
}
