#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Overhead imagery fetching for site enrichment.
//!
//! Every imagery backend implements the [`ImageFetcher`] trait: given a
//! site, its tile address, and an output location, it produces an
//! [`ImageRecord`] with the metadata downstream QC and area estimation
//! need (`width`, `height`, `meters_per_pixel`). Backends are configured
//! through the [`registry`] of TOML provider definitions:
//!
//! 1. **XYZ tile** ([`xyz_tile`]): one slippy-map tile (ESRI World
//!    Imagery by default), resized to a square output image.
//! 2. **Static map** ([`static_map`]): a centred satellite image from a
//!    static-maps style API that needs an API key.
//! 3. **Local directory** ([`local_dir`]): pre-fetched images named by
//!    sample id.
//!
//! Remote backends retry transient HTTP failures internally (see
//! [`retry`]); a returned error is terminal for that site.

pub mod local_dir;
pub mod registry;
pub mod retry;
pub mod static_map;
pub mod xyz_tile;

use std::path::PathBuf;

use async_trait::async_trait;
use solar_map_site_models::{ImageRecord, Site, TileAddress};
use thiserror::Error;

use crate::registry::{ImageryProvider, ProviderConfig};

/// Errors from imagery operations.
#[derive(Debug, Error)]
pub enum ImageryError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Request failed: {message}")]
    Request {
        /// Description of the failure.
        message: String,
    },

    /// The image could not be decoded or encoded.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No image exists for the site.
    #[error("No image found for sample {sample_id} in {dir}")]
    NotFound {
        /// The site that has no image.
        sample_id: i64,
        /// Directory that was searched.
        dir: String,
    },

    /// The provider is misconfigured.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what is wrong.
        message: String,
    },
}

/// What to fetch and where to put it.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// The site being processed.
    pub site: Site,
    /// Tile address for the site at the configured zoom.
    pub tile: TileAddress,
    /// Where a downloaded image should be written.
    pub output_path: PathBuf,
}

/// Trait that all imagery backends implement.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Returns the provider identifier (e.g. `"esri"`).
    fn id(&self) -> &str;

    /// Fetches the image for one site.
    ///
    /// # Errors
    ///
    /// Returns [`ImageryError`] if the image cannot be obtained, decoded,
    /// or written.
    async fn fetch(&self, request: &FetchRequest) -> Result<ImageRecord, ImageryError>;
}

/// Builds the backend described by a provider definition.
///
/// # Errors
///
/// Returns [`ImageryError::Config`] if the provider needs an API key and
/// the configured environment variable is unset.
pub fn create_fetcher(
    provider: &ImageryProvider,
    client: reqwest::Client,
) -> Result<Box<dyn ImageFetcher>, ImageryError> {
    match &provider.provider {
        ProviderConfig::XyzTile {
            url_template,
            output_size,
            attribution,
        } => Ok(Box::new(xyz_tile::XyzTileFetcher::new(
            &provider.id,
            &provider.name,
            client,
            url_template,
            *output_size,
            attribution.as_deref(),
        ))),
        ProviderConfig::StaticMap {
            base_url,
            width,
            height,
            maptype,
            api_key_env,
        } => {
            let api_key = std::env::var(api_key_env).map_err(|_| ImageryError::Config {
                message: format!("{api_key_env} environment variable not set"),
            })?;
            Ok(Box::new(static_map::StaticMapFetcher {
                id: provider.id.clone(),
                source: provider.name.clone(),
                client,
                base_url: base_url.clone(),
                width: *width,
                height: *height,
                maptype: maptype.clone(),
                api_key,
            }))
        }
        ProviderConfig::LocalDirectory {
            dir,
            meters_per_pixel,
        } => Ok(Box::new(local_dir::LocalDirFetcher {
            id: provider.id.clone(),
            source: provider.name.clone(),
            dir: dir.clone(),
            meters_per_pixel: *meters_per_pixel,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_every_keyless_builtin_provider() {
        let client = reqwest::Client::new();
        for provider in registry::all_providers() {
            if matches!(provider.provider, ProviderConfig::StaticMap { .. }) {
                continue;
            }
            let fetcher = create_fetcher(&provider, client.clone()).unwrap();
            assert_eq!(fetcher.id(), provider.id);
        }
    }

    #[test]
    fn static_map_requires_api_key() {
        let provider = ImageryProvider {
            id: "static".to_string(),
            name: "Static".to_string(),
            priority: 1,
            provider: ProviderConfig::StaticMap {
                base_url: "http://localhost/staticmap".to_string(),
                width: 640,
                height: 640,
                maptype: "satellite".to_string(),
                api_key_env: "SOLAR_MAP_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            },
        };
        let err = create_fetcher(&provider, reqwest::Client::new()).err().unwrap();
        assert!(matches!(err, ImageryError::Config { .. }));
    }
}
