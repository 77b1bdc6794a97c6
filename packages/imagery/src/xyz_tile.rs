//! Slippy-map tile fetcher.
//!
//! Downloads the single 256-px tile containing the site, resizes it to a
//! square output image, and writes it to the requested path. ESRI World
//! Imagery is the built-in default; any server using the `{z}/{x}/{y}`
//! scheme works. Providers that require it get their attribution stamped
//! onto the saved image.

use std::path::Path;

use async_trait::async_trait;
use image::imageops::FilterType;
use solar_map_enrich::overlay;
use solar_map_site_models::{ImageMetadata, ImageRecord, TileAddress};

use crate::{FetchRequest, ImageFetcher, ImageryError, retry};

/// Edge length of a standard slippy-map tile. [`TileAddress`] ground
/// resolution is expressed per pixel of a tile this size.
pub const TILE_SIZE: u32 = 256;

/// Fetches one tile per site from an XYZ tile server.
pub struct XyzTileFetcher {
    id: String,
    source: String,
    client: reqwest::Client,
    url_template: String,
    output_size: u32,
    attribution: Option<String>,
}

impl XyzTileFetcher {
    /// Creates a fetcher for the given URL template.
    #[must_use]
    pub fn new(
        id: &str,
        source: &str,
        client: reqwest::Client,
        url_template: &str,
        output_size: u32,
        attribution: Option<&str>,
    ) -> Self {
        Self {
            id: id.to_string(),
            source: source.to_string(),
            client,
            url_template: url_template.to_string(),
            output_size,
            attribution: attribution.map(str::to_string),
        }
    }

    /// Expands the URL template for a tile.
    #[must_use]
    pub fn tile_url(&self, tile: &TileAddress) -> String {
        self.url_template
            .replace("{z}", &tile.zoom.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string())
    }
}

/// Ground resolution of an output image produced by resizing one tile to
/// `output_size` pixels square.
#[must_use]
pub fn scaled_resolution(tile: &TileAddress, output_size: u32) -> f64 {
    tile.meters_per_pixel * f64::from(TILE_SIZE) / f64::from(output_size)
}

/// Decodes a downloaded tile, resizes it to `output_size` square, stamps
/// `attribution` if given, and writes it to `output_path`.
///
/// # Errors
///
/// Returns [`ImageryError`] if the tile cannot be decoded or the image
/// cannot be written.
pub fn write_tile(
    bytes: &[u8],
    output_size: u32,
    attribution: Option<&str>,
    output_path: &Path,
) -> Result<(), ImageryError> {
    let tile_image = image::load_from_memory(bytes)?;
    let mut resized = if tile_image.width() == output_size && tile_image.height() == output_size
    {
        tile_image.to_rgb8()
    } else {
        tile_image
            .resize_exact(output_size, output_size, FilterType::Lanczos3)
            .to_rgb8()
    };
    if let Some(text) = attribution {
        overlay::stamp_attribution(&mut resized, text);
    }

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    resized.save(output_path)?;
    Ok(())
}

#[async_trait]
impl ImageFetcher for XyzTileFetcher {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<ImageRecord, ImageryError> {
        if self.output_size == 0 {
            return Err(ImageryError::Config {
                message: format!("{}: output_size must be positive", self.id),
            });
        }

        let url = self.tile_url(&request.tile);
        log::debug!(
            "[{}] Fetching tile z={} x={} y={} for sample {}",
            self.id,
            request.tile.zoom,
            request.tile.x,
            request.tile.y,
            request.site.sample_id,
        );

        let bytes = retry::send_bytes(|| self.client.get(&url)).await?;

        let output_size = self.output_size;
        let attribution = self.attribution.clone();
        let output_path = request.output_path.clone();
        tokio::task::spawn_blocking(move || {
            write_tile(&bytes, output_size, attribution.as_deref(), &output_path)
        })
        .await
        .map_err(std::io::Error::other)??;

        Ok(ImageRecord {
            sample_id: request.site.sample_id,
            path: request.output_path.clone(),
            metadata: ImageMetadata {
                source: self.source.clone(),
                zoom: request.tile.zoom,
                tile_x: Some(request.tile.x),
                tile_y: Some(request.tile.y),
                width: self.output_size,
                height: self.output_size,
                meters_per_pixel: scaled_resolution(&request.tile, self.output_size),
                cloud_cover: None,
                capture_date: None,
                stale: false,
            },
        })
    }
}
