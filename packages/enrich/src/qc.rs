//! Quality-control verdicts.
//!
//! Image-quality gates run before the confidence gate, so a confident
//! detection on a small, cloudy, or stale image is still rejected.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use solar_map_site_models::{ImageMetadata, QcStatus};
use strum_macros::{AsRefStr, Display};

/// QC thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QcConfig {
    /// Minimum site confidence for `VERIFIABLE` (inclusive).
    pub min_confidence: f64,
    /// Minimum image width in pixels.
    pub min_width: u32,
    /// Minimum image height in pixels.
    pub min_height: u32,
    /// Cloud cover above this fraction is rejected.
    pub max_cloud_cover: f64,
    /// Imagery captured more than this many days ago is stale.
    pub stale_after_days: Option<u32>,
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            min_width: 256,
            min_height: 256,
            max_cloud_cover: 0.5,
            stale_after_days: None,
        }
    }
}

/// Which rule decided a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum QcReason {
    /// Image smaller than the minimum resolution.
    LowResolution,
    /// Cloud cover above the maximum.
    Cloudy,
    /// Imagery flagged stale.
    Stale,
    /// No confidence available.
    MissingConfidence,
    /// Confidence below the minimum.
    LowConfidence,
    /// All gates passed.
    Passed,
}

/// A verdict together with the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QcDecision {
    /// The verdict.
    pub status: QcStatus,
    /// The deciding rule.
    pub reason: QcReason,
}

impl QcDecision {
    const fn reject(reason: QcReason) -> Self {
        Self {
            status: QcStatus::NotVerifiable,
            reason,
        }
    }
}

/// Applies the QC rules in order; the first matching rule wins:
///
/// 1. width or height below the minimum
/// 2. cloud cover above the maximum
/// 3. stale imagery
/// 4. no confidence
/// 5. confidence at or above the minimum passes, otherwise rejected
#[must_use]
pub fn decide(confidence: Option<f64>, metadata: &ImageMetadata, config: &QcConfig) -> QcDecision {
    if metadata.width < config.min_width || metadata.height < config.min_height {
        return QcDecision::reject(QcReason::LowResolution);
    }
    if metadata
        .cloud_cover
        .is_some_and(|cover| cover > config.max_cloud_cover)
    {
        return QcDecision::reject(QcReason::Cloudy);
    }
    if metadata.stale {
        return QcDecision::reject(QcReason::Stale);
    }
    let Some(confidence) = confidence else {
        return QcDecision::reject(QcReason::MissingConfidence);
    };
    if confidence >= config.min_confidence {
        QcDecision {
            status: QcStatus::Verifiable,
            reason: QcReason::Passed,
        }
    } else {
        QcDecision::reject(QcReason::LowConfidence)
    }
}

/// Returns the QC verdict for a site. See [`decide`].
#[must_use]
pub fn evaluate(confidence: Option<f64>, metadata: &ImageMetadata, config: &QcConfig) -> QcStatus {
    decide(confidence, metadata, config).status
}

/// Whether imagery captured on `capture_date` is older than
/// `stale_after_days` as of `today`.
#[must_use]
pub fn is_older_than(capture_date: NaiveDate, today: NaiveDate, stale_after_days: u32) -> bool {
    (today - capture_date).num_days() > i64::from(stale_after_days)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(width: u32, height: u32) -> ImageMetadata {
        ImageMetadata {
            source: "test".to_string(),
            zoom: 19,
            tile_x: None,
            tile_y: None,
            width,
            height,
            meters_per_pixel: 0.3,
            cloud_cover: Some(0.0),
            capture_date: None,
            stale: false,
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        let config = QcConfig::default();
        let m = metadata(256, 256);
        assert_eq!(evaluate(Some(0.6), &m, &config), QcStatus::Verifiable);
        assert_eq!(evaluate(Some(0.59), &m, &config), QcStatus::NotVerifiable);
    }

    #[test]
    fn resolution_gate_precedes_confidence() {
        let decision = decide(Some(0.99), &metadata(100, 640), &QcConfig::default());
        assert_eq!(decision.status, QcStatus::NotVerifiable);
        assert_eq!(decision.reason, QcReason::LowResolution);

        let decision = decide(Some(0.99), &metadata(640, 255), &QcConfig::default());
        assert_eq!(decision.reason, QcReason::LowResolution);
    }

    #[test]
    fn cloud_gate_is_strictly_greater() {
        let config = QcConfig::default();
        let mut m = metadata(640, 640);
        m.cloud_cover = Some(0.5);
        assert_eq!(evaluate(Some(0.9), &m, &config), QcStatus::Verifiable);
        m.cloud_cover = Some(0.51);
        assert_eq!(decide(Some(0.9), &m, &config).reason, QcReason::Cloudy);
        m.cloud_cover = None;
        assert_eq!(evaluate(Some(0.9), &m, &config), QcStatus::Verifiable);
    }

    #[test]
    fn stale_imagery_is_rejected() {
        let mut m = metadata(640, 640);
        m.stale = true;
        assert_eq!(
            decide(Some(0.99), &m, &QcConfig::default()).reason,
            QcReason::Stale
        );
    }

    #[test]
    fn resolution_wins_over_cloud_and_stale() {
        let mut m = metadata(10, 10);
        m.cloud_cover = Some(0.9);
        m.stale = true;
        assert_eq!(
            decide(Some(0.99), &m, &QcConfig::default()).reason,
            QcReason::LowResolution
        );
    }

    #[test]
    fn missing_confidence_is_not_verifiable() {
        assert_eq!(
            decide(None, &metadata(640, 640), &QcConfig::default()).reason,
            QcReason::MissingConfidence
        );
    }

    #[test]
    fn custom_thresholds_apply() {
        let config = QcConfig {
            min_confidence: 0.9,
            min_width: 512,
            min_height: 512,
            max_cloud_cover: 0.1,
            stale_after_days: None,
        };
        assert_eq!(
            evaluate(Some(0.95), &metadata(400, 400), &config),
            QcStatus::NotVerifiable
        );
        assert_eq!(
            evaluate(Some(0.85), &metadata(512, 512), &config),
            QcStatus::NotVerifiable
        );
        assert_eq!(
            evaluate(Some(0.9), &metadata(512, 512), &config),
            QcStatus::Verifiable
        );
    }

    #[test]
    fn staleness_by_age() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        let captured = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert!(is_older_than(captured, today, 364));
        assert!(!is_older_than(captured, today, 365));
    }
}
