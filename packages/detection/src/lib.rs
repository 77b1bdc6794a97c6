#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Object-detection adapter.
//!
//! The detection model itself is an external collaborator. Each backend
//! implements the [`Detector`] trait and returns raw boxes for an image;
//! [`detect_site`] sanitises them and folds them into a
//! [`SiteDetections`] summary. Two backends are provided:
//!
//! - [`predictions`]: detections precomputed by an offline model run and
//!   stored as JSON.
//! - [`http`]: a remote inference endpoint that accepts image bytes.
//!
//! An image with no detections is a valid outcome, not an error. Only
//! transport and model failures are returned as [`DetectionError`].

pub mod http;
pub mod predictions;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solar_map_site_models::{BoundingBox, Detection, ImageRecord, SiteDetections};
use thiserror::Error;

/// Errors from detection backends.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (unreadable image or predictions file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The model or inference service reported a failure.
    #[error("Model error: {message}")]
    Model {
        /// Description of the failure.
        message: String,
    },
}

/// A detection as reported by a model, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// `[x1, y1, x2, y2]` in pixel coordinates.
    #[serde(alias = "bbox")]
    pub bbox_xyxy: [f64; 4],
    /// Model score.
    pub confidence: f64,
    /// Model class id.
    #[serde(default)]
    pub class_id: u32,
}

/// Which raw detections are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionFilter {
    /// Detections scoring below this are dropped.
    pub min_score: f64,
    /// When set, only these class ids are kept.
    pub classes: Option<Vec<u32>>,
}

/// Trait that all detection backends implement.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Returns a short backend name for logging.
    fn name(&self) -> &str;

    /// Runs detection on one image.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError`] on transport or model failure. An image
    /// without detections returns `Ok` with an empty list.
    async fn detect(&self, image: &ImageRecord) -> Result<Vec<RawDetection>, DetectionError>;
}

/// Validates raw detections and applies the filter, preserving order.
///
/// Boxes with non-finite coordinates or non-positive extent and
/// non-finite scores are dropped with a warning; scores are clamped to
/// `0.0..=1.0`.
#[must_use]
pub fn sanitize(raw: Vec<RawDetection>, filter: &DetectionFilter) -> Vec<Detection> {
    raw.into_iter()
        .filter_map(|d| {
            let [x1, y1, x2, y2] = d.bbox_xyxy;
            let Some(bbox) = BoundingBox::new(x1, y1, x2, y2) else {
                log::warn!("Dropping malformed detection box {:?}", d.bbox_xyxy);
                return None;
            };
            if !d.confidence.is_finite() {
                log::warn!("Dropping detection with non-finite score {}", d.confidence);
                return None;
            }
            Some(Detection {
                bbox,
                confidence: d.confidence.clamp(0.0, 1.0),
                class_id: d.class_id,
            })
        })
        .filter(|d| d.confidence >= filter.min_score)
        .filter(|d| {
            filter
                .classes
                .as_ref()
                .is_none_or(|classes| classes.contains(&d.class_id))
        })
        .collect()
}

/// Runs a detector on an image and summarises the result for the site.
///
/// # Errors
///
/// Propagates the backend's [`DetectionError`].
pub async fn detect_site(
    detector: &dyn Detector,
    image: &ImageRecord,
    filter: &DetectionFilter,
) -> Result<SiteDetections, DetectionError> {
    let raw = detector.detect(image).await?;
    let raw_count = raw.len();
    let detections = sanitize(raw, filter);
    log::debug!(
        "[{}] sample {}: kept {}/{raw_count} detections",
        detector.name(),
        image.sample_id,
        detections.len()
    );
    Ok(SiteDetections::from_detections(detections))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use solar_map_site_models::ImageMetadata;

    use super::*;

    fn raw(bbox: [f64; 4], confidence: f64, class_id: u32) -> RawDetection {
        RawDetection {
            bbox_xyxy: bbox,
            confidence,
            class_id,
        }
    }

    struct FixedDetector(Vec<RawDetection>);

    #[async_trait]
    impl Detector for FixedDetector {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn detect(&self, _image: &ImageRecord) -> Result<Vec<RawDetection>, DetectionError> {
            Ok(self.0.clone())
        }
    }

    fn image() -> ImageRecord {
        ImageRecord {
            sample_id: 1,
            path: PathBuf::from("1.png"),
            metadata: ImageMetadata {
                source: "test".to_string(),
                zoom: 19,
                tile_x: None,
                tile_y: None,
                width: 640,
                height: 640,
                meters_per_pixel: 0.3,
                cloud_cover: None,
                capture_date: None,
                stale: false,
            },
        }
    }

    #[test]
    fn drops_malformed_boxes_and_keeps_order() {
        let kept = sanitize(
            vec![
                raw([0.0, 0.0, 10.0, 10.0], 0.5, 0),
                raw([10.0, 0.0, 5.0, 10.0], 0.9, 0),
                raw([0.0, 0.0, f64::NAN, 10.0], 0.9, 0),
                raw([20.0, 20.0, 30.0, 40.0], 0.7, 0),
            ],
            &DetectionFilter::default(),
        );
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.5).abs() < f64::EPSILON);
        assert!((kept[1].bbox.y2 - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn applies_score_and_class_filters() {
        let filter = DetectionFilter {
            min_score: 0.25,
            classes: Some(vec![0]),
        };
        let kept = sanitize(
            vec![
                raw([0.0, 0.0, 1.0, 1.0], 0.2, 0),
                raw([0.0, 0.0, 1.0, 1.0], 0.3, 1),
                raw([0.0, 0.0, 1.0, 1.0], 0.3, 0),
            ],
            &filter,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].class_id, 0);
    }

    #[test]
    fn clamps_scores() {
        let kept = sanitize(
            vec![raw([0.0, 0.0, 1.0, 1.0], 1.7, 0)],
            &DetectionFilter::default(),
        );
        assert!((kept[0].confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn raw_detection_accepts_bbox_alias() {
        let d: RawDetection =
            serde_json::from_str(r#"{"bbox": [1, 2, 3, 4], "confidence": 0.5}"#).unwrap();
        assert_eq!(d.bbox_xyxy, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(d.class_id, 0);
    }

    #[tokio::test]
    async fn empty_result_is_no_solar() {
        let summary = detect_site(&FixedDetector(Vec::new()), &image(), &DetectionFilter::default())
            .await
            .unwrap();
        assert!(!summary.has_solar);
        assert!(summary.confidence.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn site_confidence_is_max_of_kept() {
        let detector = FixedDetector(vec![
            raw([0.0, 0.0, 10.0, 10.0], 0.55, 0),
            raw([5.0, 5.0, 15.0, 15.0], 0.81, 0),
        ]);
        let summary = detect_site(&detector, &image(), &DetectionFilter::default())
            .await
            .unwrap();
        assert!(summary.has_solar);
        assert!((summary.confidence - 0.81).abs() < f64::EPSILON);
        assert_eq!(summary.detections.len(), 2);
    }
}
