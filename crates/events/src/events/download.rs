use bundlefetch_types::NamedDownloadStatus;
use serde::{Deserialize, Serialize};

/// Download-specific events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DownloadEvent {
    /// A download for the asset is about to start
    Downloading { asset_name: String },

    /// Progress sample; consecutive samples for one asset never repeat
    /// `downloaded_bytes` except for the terminal one
    Downloaded { status: NamedDownloadStatus },
}

impl DownloadEvent {
    #[must_use]
    pub fn asset_name(&self) -> &str {
        match self {
            Self::Downloading { asset_name } => asset_name,
            Self::Downloaded { status } => &status.asset_name,
        }
    }
}
