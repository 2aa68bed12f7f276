//! Download status snapshots

use serde::{Deserialize, Serialize};

/// Point-in-time view of a bundle download.
///
/// `downloaded_bytes` may transiently exceed `total_bytes` when the total is
/// an estimate; [`DownloadStatus::percent`] clamps for that reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStatus {
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub is_done: bool,
}

impl DownloadStatus {
    #[must_use]
    pub fn new(total_bytes: u64, downloaded_bytes: u64, is_done: bool) -> Self {
        Self {
            total_bytes,
            downloaded_bytes,
            is_done,
        }
    }

    /// Terminal status for a successful download of `total_bytes`.
    #[must_use]
    pub fn completed(total_bytes: u64) -> Self {
        Self::new(total_bytes, total_bytes, true)
    }

    /// Fraction downloaded in `[0, 1]`.
    ///
    /// With an unknown total the value is 0 until the download is done.
    #[must_use]
    pub fn percent(&self) -> f32 {
        if self.total_bytes == 0 {
            return if self.is_done { 1.0 } else { 0.0 };
        }
        // Precision loss acceptable for progress display
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.downloaded_bytes as f64 / self.total_bytes as f64;
        #[allow(clippy::cast_possible_truncation)]
        {
            ratio.clamp(0.0, 1.0) as f32
        }
    }
}

/// A [`DownloadStatus`] tagged with the asset it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedDownloadStatus {
    pub asset_name: String,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub is_done: bool,
    pub percent: f32,
}

impl NamedDownloadStatus {
    #[must_use]
    pub fn new(asset_name: impl Into<String>, status: DownloadStatus) -> Self {
        Self {
            asset_name: asset_name.into(),
            total_bytes: status.total_bytes,
            downloaded_bytes: status.downloaded_bytes,
            is_done: status.is_done,
            percent: status.percent(),
        }
    }

    /// The underlying status without the name.
    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        DownloadStatus::new(self.total_bytes, self.downloaded_bytes, self.is_done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn percent_with_unknown_total() {
        assert!(DownloadStatus::new(0, 10, false).percent().abs() < f32::EPSILON);
        assert!((DownloadStatus::new(0, 0, true).percent() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn percent_is_clamped_when_estimate_is_low() {
        let status = DownloadStatus::new(100, 150, false);
        assert!((status.percent() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn named_status_copies_fields() {
        let named = NamedDownloadStatus::new("cube", DownloadStatus::new(1000, 250, false));
        assert_eq!(named.asset_name, "cube");
        assert_eq!(named.downloaded_bytes, 250);
        assert!((named.percent - 0.25).abs() < f32::EPSILON);
        assert_eq!(named.status(), DownloadStatus::new(1000, 250, false));
    }

    proptest! {
        #[test]
        fn percent_always_in_unit_range(total in 0u64..1_000_000, done in 0u64..2_000_000, is_done: bool) {
            let p = DownloadStatus::new(total, done, is_done).percent();
            prop_assert!((0.0..=1.0).contains(&p));
        }
    }
}
