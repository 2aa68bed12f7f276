use serde::{Deserialize, Serialize};

/// Lifecycle of one retried operation.
///
/// Zero or more `ConnectRetrying` are followed by exactly one
/// `ConnectRetried`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RetryEvent {
    /// Attempt `attempt` failed and another one is scheduled; numbering starts at 1
    ConnectRetrying { attempt: u32 },

    /// Operation settled
    ConnectRetried { succeeded: bool },
}

impl RetryEvent {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ConnectRetried { .. })
    }
}
