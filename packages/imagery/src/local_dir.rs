//! Local directory fetcher.
//!
//! Serves pre-fetched images named `<sample_id>.png`, `<sample_id>.jpg` or
//! `<sample_id>.jpeg`. Images are referenced in place, never copied or
//! modified.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use solar_map_site_models::{ImageMetadata, ImageRecord};

use crate::{FetchRequest, ImageFetcher, ImageryError};

/// File extensions searched, in order.
const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Looks up site images in a directory.
pub struct LocalDirFetcher {
    /// Provider id.
    pub id: String,
    /// Source label recorded in image metadata.
    pub source: String,
    /// Directory to search.
    pub dir: PathBuf,
    /// Fixed ground resolution, if configured.
    pub meters_per_pixel: Option<f64>,
}

/// Returns the first existing `<sample_id>.<ext>` file in `dir`.
#[must_use]
pub fn find_image(dir: &Path, sample_id: i64) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{sample_id}.{ext}")))
        .find(|path| path.is_file())
}

#[async_trait]
impl ImageFetcher for LocalDirFetcher {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<ImageRecord, ImageryError> {
        let sample_id = request.site.sample_id;
        let path = find_image(&self.dir, sample_id).ok_or_else(|| ImageryError::NotFound {
            sample_id,
            dir: self.dir.display().to_string(),
        })?;

        let (width, height) = image::image_dimensions(&path)?;
        log::debug!(
            "[{}] Using {} ({width}x{height}) for sample {sample_id}",
            self.id,
            path.display()
        );

        Ok(ImageRecord {
            sample_id,
            path,
            metadata: ImageMetadata {
                source: self.source.clone(),
                zoom: request.tile.zoom,
                tile_x: None,
                tile_y: None,
                width,
                height,
                meters_per_pixel: self
                    .meters_per_pixel
                    .unwrap_or(request.tile.meters_per_pixel),
                cloud_cover: None,
                capture_date: None,
                stale: false,
            },
        })
    }
}
