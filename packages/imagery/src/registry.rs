//! Compile-time registry of imagery provider configurations.
//!
//! Each provider is defined in a TOML file under `services/`. The registry
//! embeds these at compile time and exposes them via [`all_providers`] and
//! [`provider`]. Run-time configuration can adjust a selected provider
//! through [`ImageryOverrides`].

use std::path::PathBuf;

use serde::Deserialize;

/// An imagery provider configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageryProvider {
    /// Unique identifier (e.g. `"esri"`, `"google_static"`).
    pub id: String,
    /// Human-readable name, recorded as the image `source`.
    pub name: String,
    /// Listing order, lower values first.
    pub priority: u32,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// A slippy-map tile server.
    XyzTile {
        /// URL with `{z}`, `{x}`, and `{y}` placeholders.
        url_template: String,
        /// Edge length of the square output image, in pixels.
        #[serde(default = "default_output_size")]
        output_size: u32,
        /// Attribution the provider requires on saved imagery.
        #[serde(default)]
        attribution: Option<String>,
    },
    /// A static-maps style API returning a centred image.
    StaticMap {
        /// API endpoint.
        base_url: String,
        /// Requested image width.
        width: u32,
        /// Requested image height.
        height: u32,
        /// Map type parameter (e.g. `"satellite"`).
        maptype: String,
        /// Environment variable holding the API key.
        api_key_env: String,
    },
    /// Pre-fetched images on disk.
    LocalDirectory {
        /// Directory containing `<sample_id>.{png,jpg,jpeg}` files.
        dir: PathBuf,
        /// Fixed ground resolution for every image. Defaults to the tile
        /// ground resolution at the site's latitude and zoom.
        #[serde(default)]
        meters_per_pixel: Option<f64>,
    },
}

impl ProviderConfig {
    /// The `type` tag of this configuration.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::XyzTile { .. } => "xyz_tile",
            Self::StaticMap { .. } => "static_map",
            Self::LocalDirectory { .. } => "local_directory",
        }
    }
}

const fn default_output_size() -> u32 {
    512
}

/// Optional adjustments applied on top of a built-in provider definition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImageryOverrides {
    /// Output size for tile providers.
    pub output_size: Option<u32>,
    /// Directory for the local provider.
    pub local_dir: Option<PathBuf>,
    /// Fixed ground resolution for the local provider.
    pub meters_per_pixel: Option<f64>,
    /// API key environment variable for static-map providers.
    pub api_key_env: Option<String>,
}

impl ImageryProvider {
    /// Applies the overrides that are relevant to this provider's type.
    pub fn apply_overrides(&mut self, overrides: &ImageryOverrides) {
        match &mut self.provider {
            ProviderConfig::XyzTile { output_size, .. } => {
                if let Some(size) = overrides.output_size {
                    *output_size = size;
                }
            }
            ProviderConfig::StaticMap { api_key_env, .. } => {
                if let Some(env) = &overrides.api_key_env {
                    api_key_env.clone_from(env);
                }
            }
            ProviderConfig::LocalDirectory {
                dir,
                meters_per_pixel,
            } => {
                if let Some(path) = &overrides.local_dir {
                    dir.clone_from(path);
                }
                if overrides.meters_per_pixel.is_some() {
                    *meters_per_pixel = overrides.meters_per_pixel;
                }
            }
        }
    }
}

// ── Compile-time embedded TOML files ────────────────────────────────

const PROVIDER_TOMLS: &[(&str, &str)] = &[
    ("esri", include_str!("../services/esri.toml")),
    ("google_static", include_str!("../services/google_static.toml")),
    ("local", include_str!("../services/local.toml")),
];

#[cfg(test)]
const EXPECTED_PROVIDER_COUNT: usize = 3;

/// Returns all imagery provider configurations, sorted by priority.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_providers() -> Vec<ImageryProvider> {
    let mut providers: Vec<ImageryProvider> = PROVIDER_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse imagery provider '{name}': {e}"))
        })
        .collect();
    providers.sort_by_key(|p| p.priority);
    providers
}

/// Returns the provider with the given id, if one is registered.
#[must_use]
pub fn provider(id: &str) -> Option<ImageryProvider> {
    all_providers().into_iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn loads_all_providers() {
        assert_eq!(all_providers().len(), EXPECTED_PROVIDER_COUNT);
    }

    #[test]
    fn provider_ids_are_unique() {
        let mut seen = BTreeSet::new();
        for p in &all_providers() {
            assert!(seen.insert(p.id.clone()), "Duplicate provider ID: {}", p.id);
        }
    }

    #[test]
    fn tile_templates_have_all_placeholders() {
        for p in &all_providers() {
            if let ProviderConfig::XyzTile { url_template, .. } = &p.provider {
                for placeholder in ["{z}", "{x}", "{y}"] {
                    assert!(
                        url_template.contains(placeholder),
                        "Provider {} template missing {placeholder}",
                        p.id
                    );
                }
            }
        }
    }

    #[test]
    fn esri_is_the_default_tile_provider() {
        let esri = provider("esri").unwrap();
        assert!(matches!(
            esri.provider,
            ProviderConfig::XyzTile {
                output_size: 512,
                ..
            }
        ));
        assert_eq!(esri.provider.kind(), "xyz_tile");
        if let ProviderConfig::XyzTile { attribution, .. } = &esri.provider {
            assert_eq!(attribution.as_deref(), Some("© Esri"));
        }
        assert!(provider("does_not_exist").is_none());
    }

    #[test]
    fn overrides_apply_per_provider_type() {
        let overrides = ImageryOverrides {
            output_size: Some(256),
            local_dir: Some(PathBuf::from("/tmp/sites")),
            meters_per_pixel: Some(0.3),
            api_key_env: Some("MY_KEY".to_string()),
        };

        let mut esri = provider("esri").unwrap();
        esri.apply_overrides(&overrides);
        assert!(matches!(
            esri.provider,
            ProviderConfig::XyzTile {
                output_size: 256,
                ..
            }
        ));

        let mut local = provider("local").unwrap();
        local.apply_overrides(&overrides);
        match local.provider {
            ProviderConfig::LocalDirectory {
                dir,
                meters_per_pixel,
            } => {
                assert_eq!(dir, PathBuf::from("/tmp/sites"));
                assert_eq!(meters_per_pixel, Some(0.3));
            }
            other => panic!("unexpected provider config: {other:?}"),
        }

        let mut google = provider("google_static").unwrap();
        google.apply_overrides(&overrides);
        match google.provider {
            ProviderConfig::StaticMap { api_key_env, .. } => assert_eq!(api_key_env, "MY_KEY"),
            other => panic!("unexpected provider config: {other:?}"),
        }
    }
}
