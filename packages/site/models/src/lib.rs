#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Site, imagery, detection, and per-site result types.
//!
//! These are the plain data types passed between the tile locator, the
//! imagery and detection collaborators, the enrichment steps, and the
//! batch orchestrator. [`SiteResult`] is the on-disk record format; its
//! field names are the serialized JSON names.

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// One geographic point of interest submitted for PV detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Identifier, unique within a batch.
    pub sample_id: i64,
    /// Latitude (WGS84, degrees).
    pub latitude: f64,
    /// Longitude (WGS84, degrees).
    pub longitude: f64,
}

/// A slippy-map tile address plus the ground resolution at the site's
/// latitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileAddress {
    /// Zoom level.
    pub zoom: u8,
    /// Tile column.
    pub x: u32,
    /// Tile row (0 at the north edge).
    pub y: u32,
    /// Linear ground resolution of one 256-px tile pixel, in meters.
    pub meters_per_pixel: f64,
}

/// Capture and geometry metadata for a fetched image.
///
/// Snapshotted verbatim into [`SiteResult::image_metadata`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Human-readable imagery source (e.g. "ESRI World Imagery").
    pub source: String,
    /// Zoom level the image was requested at.
    pub zoom: u8,
    /// Tile column, for tile-based providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_x: Option<u32>,
    /// Tile row, for tile-based providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_y: Option<u32>,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Linear ground resolution of one image pixel, in meters.
    pub meters_per_pixel: f64,
    /// Cloud cover fraction (0.0 - 1.0), when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_cover: Option<f64>,
    /// Capture date, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_date: Option<NaiveDate>,
    /// Whether the imagery is considered out of date.
    #[serde(default)]
    pub stale: bool,
}

/// A fetched image on disk together with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    /// The site this image was fetched for.
    pub sample_id: i64,
    /// Location of the raster file.
    pub path: PathBuf,
    /// Capture and geometry metadata.
    pub metadata: ImageMetadata,
}

impl ImageRecord {
    /// Image width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.metadata.width
    }

    /// Image height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.metadata.height
    }
}

/// An axis-aligned box in pixel coordinates, `x1 < x2` and `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x1: f64,
    /// Top edge.
    pub y1: f64,
    /// Right edge.
    pub x2: f64,
    /// Bottom edge.
    pub y2: f64,
}

impl BoundingBox {
    /// Builds a box, returning `None` unless all coordinates are finite
    /// and the box has positive width and height.
    #[must_use]
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Option<Self> {
        let finite = [x1, y1, x2, y2].iter().all(|v| v.is_finite());
        (finite && x1 < x2 && y1 < y2).then_some(Self { x1, y1, x2, y2 })
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Area in square pixels.
    #[must_use]
    pub fn pixel_area(&self) -> f64 {
        self.width() * self.height()
    }

    /// `[x1, y1, x2, y2]`.
    #[must_use]
    pub const fn to_array(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// A single object detection produced by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Box in image pixel coordinates.
    pub bbox: BoundingBox,
    /// Detector score (0.0 - 1.0).
    pub confidence: f64,
    /// Detector class id.
    pub class_id: u32,
}

/// Site-level summary of the detections found in one image.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteDetections {
    /// `true` iff at least one detection was found.
    pub has_solar: bool,
    /// Maximum detection confidence, or `0.0` when there are none.
    pub confidence: f64,
    /// All detections, in detector order.
    pub detections: Vec<Detection>,
}

impl SiteDetections {
    /// Summarizes a detection list.
    #[must_use]
    pub fn from_detections(detections: Vec<Detection>) -> Self {
        let confidence = detections
            .iter()
            .map(|d| d.confidence)
            .fold(0.0_f64, f64::max);

        Self {
            has_solar: !detections.is_empty(),
            confidence,
            detections,
        }
    }
}

/// Verdict on whether a site's detection result is trustworthy.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum QcStatus {
    /// Image quality and confidence are both sufficient.
    Verifiable,
    /// Rejected by an image-quality gate or the confidence threshold.
    NotVerifiable,
}

/// The enriched output record for one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteResult {
    /// Site identifier.
    pub sample_id: i64,
    /// Site latitude.
    pub lat: f64,
    /// Site longitude.
    pub lon: f64,
    /// Whether any PV detection was found.
    pub has_solar: bool,
    /// Site-level confidence (maximum detection confidence).
    pub confidence: f64,
    /// Estimated PV area in square meters, rounded to 2 decimals.
    pub pv_area_sqm_est: f64,
    /// Configured buffer radius. Informational only; never applied
    /// geometrically.
    pub buffer_radius_sqft: f64,
    /// QC verdict.
    pub qc_status: QcStatus,
    /// Serialized list of `[x1, y1, x2, y2]` boxes.
    pub bbox_or_mask: String,
    /// Metadata of the image the detections were run on.
    pub image_metadata: ImageMetadata,
    /// Audit overlay location, when one was rendered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_path: Option<String>,
}

/// Stages of a single site's pipeline run.
///
/// A site moves `PENDING -> IMAGE_FETCHED -> DETECTED -> ENRICHED ->
/// PERSISTED`. A failure is recorded together with the last stage the
/// site reached.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteStage {
    /// Not started, or failed before an image was available.
    Pending,
    /// Image fetched and metadata available.
    ImageFetched,
    /// Detector has run.
    Detected,
    /// Area, QC, and overlay computed.
    Enriched,
    /// Per-site record written.
    Persisted,
}

/// A site that did not produce a [`SiteResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteFailure {
    /// Site identifier.
    pub sample_id: i64,
    /// Site latitude.
    pub lat: f64,
    /// Site longitude.
    pub lon: f64,
    /// Last stage the site reached before failing.
    pub stage: SiteStage,
    /// Why processing stopped.
    pub reason: String,
}

/// Counts reported at the end of a batch.
///
/// `completed + failed == total` always holds for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Number of input sites.
    pub total: u64,
    /// Sites that produced a result.
    pub completed: u64,
    /// Completed sites with `VERIFIABLE` status.
    pub verifiable: u64,
    /// Completed sites with `NOT_VERIFIABLE` status.
    pub not_verifiable: u64,
    /// Completed sites with at least one detection.
    pub with_solar: u64,
    /// Sites that failed or were skipped.
    pub failed: u64,
}

impl BatchSummary {
    /// Counts a completed site.
    pub const fn record_result(&mut self, result: &SiteResult) {
        self.total += 1;
        self.completed += 1;
        match result.qc_status {
            QcStatus::Verifiable => self.verifiable += 1,
            QcStatus::NotVerifiable => self.not_verifiable += 1,
        }
        if result.has_solar {
            self.with_solar += 1;
        }
    }

    /// Counts a failed or skipped site.
    pub const fn record_failure(&mut self) {
        self.total += 1;
        self.failed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> Detection {
        Detection {
            bbox: BoundingBox::new(x1, y1, x2, y2).unwrap(),
            confidence,
            class_id: 0,
        }
    }

    fn metadata() -> ImageMetadata {
        ImageMetadata {
            source: "test".to_string(),
            zoom: 17,
            tile_x: None,
            tile_y: None,
            width: 640,
            height: 640,
            meters_per_pixel: 0.5,
            cloud_cover: None,
            capture_date: None,
            stale: false,
        }
    }

    #[test]
    fn bounding_box_rejects_inverted_and_empty() {
        assert!(BoundingBox::new(10.0, 10.0, 5.0, 20.0).is_none());
        assert!(BoundingBox::new(10.0, 10.0, 20.0, 10.0).is_none());
        assert!(BoundingBox::new(0.0, 0.0, f64::NAN, 1.0).is_none());
        let b = BoundingBox::new(1.0, 2.0, 4.0, 6.0).unwrap();
        assert!((b.pixel_area() - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn summarizes_empty_detections() {
        let summary = SiteDetections::from_detections(Vec::new());
        assert!(!summary.has_solar);
        assert!(summary.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn summary_confidence_is_maximum() {
        let summary = SiteDetections::from_detections(vec![
            detection(0.0, 0.0, 1.0, 1.0, 0.4),
            detection(0.0, 0.0, 2.0, 2.0, 0.9),
            detection(0.0, 0.0, 3.0, 3.0, 0.7),
        ]);
        assert!(summary.has_solar);
        assert!((summary.confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(summary.detections.len(), 3);
    }

    #[test]
    fn qc_status_serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&QcStatus::NotVerifiable).unwrap(),
            "\"NOT_VERIFIABLE\""
        );
        assert_eq!(QcStatus::Verifiable.to_string(), "VERIFIABLE");
        assert_eq!(SiteStage::ImageFetched.as_ref(), "IMAGE_FETCHED");
    }

    #[test]
    fn site_result_uses_snake_case_field_names() {
        let result = SiteResult {
            sample_id: 7,
            lat: 12.5,
            lon: 77.5,
            has_solar: false,
            confidence: 0.0,
            pv_area_sqm_est: 0.0,
            buffer_radius_sqft: 1200.0,
            qc_status: QcStatus::NotVerifiable,
            bbox_or_mask: "[]".to_string(),
            image_metadata: metadata(),
            overlay_path: None,
        };
        let value = serde_json::to_value(&result).unwrap();
        for key in [
            "sample_id",
            "lat",
            "lon",
            "has_solar",
            "confidence",
            "pv_area_sqm_est",
            "buffer_radius_sqft",
            "qc_status",
            "bbox_or_mask",
            "image_metadata",
        ] {
            assert!(value.get(key).is_some(), "missing field {key}");
        }
        assert!(value.get("overlay_path").is_none());
        assert!(value["image_metadata"].get("cloud_cover").is_none());
    }

    #[test]
    fn batch_summary_counts_add_up() {
        let mut summary = BatchSummary::default();
        let mut result = SiteResult {
            sample_id: 1,
            lat: 0.0,
            lon: 0.0,
            has_solar: true,
            confidence: 0.8,
            pv_area_sqm_est: 10.0,
            buffer_radius_sqft: 1200.0,
            qc_status: QcStatus::Verifiable,
            bbox_or_mask: "[]".to_string(),
            image_metadata: metadata(),
            overlay_path: None,
        };
        summary.record_result(&result);
        result.has_solar = false;
        result.qc_status = QcStatus::NotVerifiable;
        summary.record_result(&result);
        summary.record_failure();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed + summary.failed, summary.total);
        assert_eq!(summary.verifiable, 1);
        assert_eq!(summary.not_verifiable, 1);
        assert_eq!(summary.with_solar, 1);
    }
}
