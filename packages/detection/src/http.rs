//! Remote inference backend.
//!
//! POSTs the raw image bytes to an inference endpoint and reads back a
//! JSON detection list, either bare (`[...]`) or wrapped
//! (`{ "detections": [...] }`). Each call is a single request; a failure
//! is terminal for the site.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use solar_map_site_models::ImageRecord;

use crate::{DetectionError, Detector, RawDetection};

/// Accepted response shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    List(Vec<RawDetection>),
    Wrapped { detections: Vec<RawDetection> },
}

impl InferenceResponse {
    fn into_detections(self) -> Vec<RawDetection> {
        match self {
            Self::List(detections) | Self::Wrapped { detections } => detections,
        }
    }
}

/// Sends images to an HTTP inference service.
pub struct HttpDetector {
    client: reqwest::Client,
    url: String,
}

impl HttpDetector {
    /// Creates a detector posting to `url`.
    #[must_use]
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

/// Content type for an image path, by extension.
fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

/// Parses an inference response body.
///
/// # Errors
///
/// Returns [`DetectionError::Json`] if the body is neither shape.
pub fn parse_response(body: &str) -> Result<Vec<RawDetection>, DetectionError> {
    let response: InferenceResponse = serde_json::from_str(body)?;
    Ok(response.into_detections())
}

#[async_trait]
impl Detector for HttpDetector {
    fn name(&self) -> &str {
        "http"
    }

    async fn detect(&self, image: &ImageRecord) -> Result<Vec<RawDetection>, DetectionError> {
        let bytes = tokio::fs::read(&image.path).await?;

        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, content_type(&image.path))
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(DetectionError::Model {
                message: format!("inference request failed with status {status}: {body}"),
            });
        }

        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn parses_bare_and_wrapped_responses() {
        let bare = parse_response(r#"[{"bbox_xyxy": [0, 0, 4, 4], "confidence": 0.7}]"#).unwrap();
        assert_eq!(bare.len(), 1);

        let wrapped = parse_response(
            r#"{"detections": [{"bbox": [1, 1, 2, 2], "confidence": 0.4, "class_id": 2}]}"#,
        )
        .unwrap();
        assert_eq!(wrapped[0].class_id, 2);

        assert!(parse_response("[]").unwrap().is_empty());
        assert!(parse_response(r#"{"error": "boom"}"#).is_err());
    }

    #[test]
    fn picks_content_type_from_extension() {
        assert_eq!(content_type(&PathBuf::from("a/1.PNG")), "image/png");
        assert_eq!(content_type(&PathBuf::from("a/1_rooftop.jpg")), "image/jpeg");
    }

    #[tokio::test]
    async fn unreadable_image_is_an_error() {
        let detector = HttpDetector::new(reqwest::Client::new(), "http://127.0.0.1:9/detect");
        let image = ImageRecord {
            sample_id: 1,
            path: PathBuf::from("/definitely/not/here.jpg"),
            metadata: solar_map_site_models::ImageMetadata {
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
        };
        assert!(matches!(
            detector.detect(&image).await,
            Err(DetectionError::Io(_))
        ));
    }
}
