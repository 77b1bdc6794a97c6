//! Precomputed predictions backend.
//!
//! Reads the JSON written by an offline model run over a set of images:
//!
//! ```json
//! [
//!   {
//!     "image": "17_rooftop.jpg",
//!     "sample_id": 17,
//!     "detections": [
//!       { "bbox_xyxy": [12.0, 40.5, 96.0, 120.0], "confidence": 0.83, "class_id": 0 }
//!     ]
//!   }
//! ]
//! ```
//!
//! Entries are matched by `sample_id` first, then by image file name. An
//! image without an entry has no detections.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use solar_map_site_models::ImageRecord;

use crate::{DetectionError, Detector, RawDetection};

/// One image's predictions.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionEntry {
    /// Image file name the predictions were made on.
    #[serde(default)]
    pub image: Option<String>,
    /// Site the image belongs to, when known.
    #[serde(default)]
    pub sample_id: Option<i64>,
    /// Detections for the image.
    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

/// Serves detections from a predictions file.
#[derive(Debug, Default)]
pub struct PredictionsDetector {
    by_sample: BTreeMap<i64, Vec<RawDetection>>,
    by_image: BTreeMap<String, Vec<RawDetection>>,
}

impl PredictionsDetector {
    /// Loads a predictions file.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, DetectionError> {
        let contents = std::fs::read_to_string(path)?;
        let entries: Vec<PredictionEntry> = serde_json::from_str(&contents)?;
        let detector = Self::from_entries(entries);
        log::info!(
            "Loaded predictions for {} samples / {} images from {}",
            detector.by_sample.len(),
            detector.by_image.len(),
            path.display()
        );
        Ok(detector)
    }

    /// Indexes prediction entries. Later entries win on duplicate keys.
    #[must_use]
    pub fn from_entries(entries: Vec<PredictionEntry>) -> Self {
        let mut detector = Self::default();
        for entry in entries {
            if let Some(sample_id) = entry.sample_id {
                detector
                    .by_sample
                    .insert(sample_id, entry.detections.clone());
            }
            if let Some(image) = entry.image {
                detector.by_image.insert(image, entry.detections);
            }
        }
        detector
    }

    fn lookup(&self, image: &ImageRecord) -> Option<&Vec<RawDetection>> {
        self.by_sample.get(&image.sample_id).or_else(|| {
            image
                .path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| self.by_image.get(name))
        })
    }
}

#[async_trait]
impl Detector for PredictionsDetector {
    fn name(&self) -> &str {
        "predictions"
    }

    async fn detect(&self, image: &ImageRecord) -> Result<Vec<RawDetection>, DetectionError> {
        self.lookup(image).map_or_else(
            || {
                log::debug!(
                    "No predictions for sample {} ({})",
                    image.sample_id,
                    image.path.display()
                );
                Ok(Vec::new())
            },
            |detections| Ok(detections.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use solar_map_site_models::ImageMetadata;

    use super::*;

    fn image(sample_id: i64, path: &str) -> ImageRecord {
        ImageRecord {
            sample_id,
            path: PathBuf::from(path),
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

    const PREDICTIONS: &str = r#"[
        {
            "image": "11_rooftop.jpg",
            "detections": [
                { "bbox_xyxy": [0, 0, 10, 10], "confidence": 0.9, "class_id": 0 }
            ]
        },
        {
            "image": "other.jpg",
            "sample_id": 12,
            "detections": [
                { "bbox_xyxy": [0, 0, 5, 5], "confidence": 0.4, "class_id": 0 },
                { "bbox_xyxy": [5, 5, 9, 9], "confidence": 0.6, "class_id": 0 }
            ]
        },
        { "image": "13_rooftop.jpg", "detections": [] }
    ]"#;

    #[tokio::test]
    async fn loads_file_and_matches_by_image_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.json");
        std::fs::write(&path, PREDICTIONS).unwrap();

        let detector = PredictionsDetector::load(&path).unwrap();
        let found = detector
            .detect(&image(11, "/out/11_rooftop.jpg"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn sample_id_takes_precedence() {
        let entries: Vec<PredictionEntry> = serde_json::from_str(PREDICTIONS).unwrap();
        let detector = PredictionsDetector::from_entries(entries);
        let found = detector
            .detect(&image(12, "/out/12_rooftop.jpg"))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn unknown_image_has_no_detections() {
        let entries: Vec<PredictionEntry> = serde_json::from_str(PREDICTIONS).unwrap();
        let detector = PredictionsDetector::from_entries(entries);
        assert!(
            detector
                .detect(&image(99, "/out/99_rooftop.jpg"))
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            detector
                .detect(&image(13, "/out/13_rooftop.jpg"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            PredictionsDetector::load(&path),
            Err(DetectionError::Json(_))
        ));
        assert!(matches!(
            PredictionsDetector::load(&dir.path().join("missing.json")),
            Err(DetectionError::Io(_))
        ));
    }
}
