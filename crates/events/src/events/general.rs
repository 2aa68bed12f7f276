use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Lifecycle of provider operations (`download`, `load`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeneralEvent {
    OperationStarted {
        operation: String,
        asset_name: String,
    },

    OperationCompleted {
        operation: String,
        asset_name: String,
    },

    OperationFailed {
        operation: String,
        failure: FailureContext,
    },
}

impl GeneralEvent {
    #[must_use]
    pub fn started(operation: impl Into<String>, asset_name: impl Into<String>) -> Self {
        Self::OperationStarted {
            operation: operation.into(),
            asset_name: asset_name.into(),
        }
    }

    #[must_use]
    pub fn completed(operation: impl Into<String>, asset_name: impl Into<String>) -> Self {
        Self::OperationCompleted {
            operation: operation.into(),
            asset_name: asset_name.into(),
        }
    }

    /// Name of the operation this event belongs to
    #[must_use]
    pub fn operation(&self) -> &str {
        match self {
            Self::OperationStarted { operation, .. }
            | Self::OperationCompleted { operation, .. }
            | Self::OperationFailed { operation, .. } => operation,
        }
    }
}
