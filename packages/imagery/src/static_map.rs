//! Static-maps API fetcher (Google Static Maps style).
//!
//! Requests a satellite image centred on the site. The response is
//! decoded before it is written so a garbled or error-page body fails the
//! fetch rather than reaching the detector.

use std::path::Path;

use async_trait::async_trait;
use solar_map_site_models::{ImageMetadata, ImageRecord};

use crate::{FetchRequest, ImageFetcher, ImageryError, retry};

/// Fetches a centred image per site from a static-maps endpoint.
pub struct StaticMapFetcher {
    /// Provider id.
    pub id: String,
    /// Source label recorded in image metadata.
    pub source: String,
    /// Shared HTTP client.
    pub client: reqwest::Client,
    /// API endpoint.
    pub base_url: String,
    /// Requested width.
    pub width: u32,
    /// Requested height.
    pub height: u32,
    /// Map type parameter.
    pub maptype: String,
    /// API key.
    pub api_key: String,
}

impl StaticMapFetcher {
    /// Query parameters for a request, excluding the API key.
    fn query(&self, request: &FetchRequest) -> Vec<(&'static str, String)> {
        vec![
            (
                "center",
                format!("{},{}", request.site.latitude, request.site.longitude),
            ),
            ("zoom", request.tile.zoom.to_string()),
            ("size", format!("{}x{}", self.width, self.height)),
            ("maptype", self.maptype.clone()),
        ]
    }
}

/// Decodes a response body and writes it as the site image. Returns the
/// image dimensions.
fn write_image(bytes: &[u8], output_path: &Path) -> Result<(u32, u32), ImageryError> {
    let decoded = image::load_from_memory(bytes)?.to_rgb8();
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    decoded.save(output_path)?;
    Ok(decoded.dimensions())
}

#[async_trait]
impl ImageFetcher for StaticMapFetcher {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<ImageRecord, ImageryError> {
        let query = self.query(request);
        log::debug!(
            "[{}] Fetching {} for sample {}",
            self.id,
            query
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&"),
            request.site.sample_id,
        );

        let bytes = retry::send_bytes(|| {
            self.client
                .get(&self.base_url)
                .query(&query)
                .query(&[("key", &self.api_key)])
        })
        .await?;

        let output_path = request.output_path.clone();
        let (width, height) = tokio::task::spawn_blocking(move || write_image(&bytes, &output_path))
            .await
            .map_err(std::io::Error::other)??;

        Ok(ImageRecord {
            sample_id: request.site.sample_id,
            path: request.output_path.clone(),
            metadata: ImageMetadata {
                source: self.source.clone(),
                zoom: request.tile.zoom,
                tile_x: None,
                tile_y: None,
                width,
                height,
                meters_per_pixel: request.tile.meters_per_pixel,
                cloud_cover: None,
                capture_date: None,
                stale: false,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use solar_map_site_models::{Site, TileAddress};

    use super::*;

    #[test]
    fn query_is_centred_and_omits_key() {
        let fetcher = StaticMapFetcher {
            id: "google_static".to_string(),
            source: "Google Static Maps".to_string(),
            client: reqwest::Client::new(),
            base_url: "https://maps.example.com/staticmap".to_string(),
            width: 640,
            height: 640,
            maptype: "satellite".to_string(),
            api_key: "secret".to_string(),
        };
        let request = FetchRequest {
            site: Site {
                sample_id: 3,
                latitude: 12.5,
                longitude: 77.25,
            },
            tile: TileAddress {
                zoom: 20,
                x: 0,
                y: 0,
                meters_per_pixel: 0.146,
            },
            output_path: PathBuf::from("out/3_rooftop.jpg"),
        };

        let query = fetcher.query(&request);
        assert!(query.contains(&("center", "12.5,77.25".to_string())));
        assert!(query.contains(&("zoom", "20".to_string())));
        assert!(query.contains(&("size", "640x640".to_string())));
        assert!(query.iter().all(|(_, v)| !v.contains("secret")));
    }

    #[test]
    fn error_page_bodies_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("3_rooftop.jpg");
        assert!(write_image(b"The provided API key is invalid.", &path).is_err());
        assert!(!path.exists());
    }
}
