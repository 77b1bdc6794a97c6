//! Pipeline configuration.
//!
//! Read from a TOML file; every field has a default, so an empty file (or
//! no file at all) is a valid configuration:
//!
//! ```toml
//! zoom = 17
//! buffer_radius_sqft = 1200.0
//! concurrency = 4
//!
//! [qc]
//! min_confidence = 0.6
//! stale_after_days = 1095
//!
//! [overlay]
//! enabled = true
//!
//! [imagery]
//! provider = "local"
//! local_dir = "images"
//!
//! [detection]
//! predictions = "predictions.json"
//! min_score = 0.25
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use solar_map_detection::DetectionFilter;
use solar_map_enrich::overlay::OverlayConfig;
use solar_map_enrich::qc::QcConfig;
use solar_map_geography::MAX_ZOOM;
use solar_map_imagery::registry::ImageryOverrides;

use crate::PipelineError;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "SOLAR_MAP_CONFIG";

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tile zoom level imagery is requested at.
    pub zoom: i32,
    /// Buffer radius recorded on every result and shown in overlay
    /// legends. Not applied geometrically.
    pub buffer_radius_sqft: f64,
    /// Maximum number of sites processed at once.
    pub concurrency: usize,
    /// Process at most this many sites from the list.
    pub limit: Option<usize>,
    /// QC thresholds.
    pub qc: QcConfig,
    /// Overlay settings.
    pub overlay: OverlayConfig,
    /// Imagery provider selection.
    pub imagery: ImageryConfig,
    /// Detector selection and filtering.
    pub detection: DetectionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            zoom: 17,
            buffer_radius_sqft: 1200.0,
            concurrency: 1,
            limit: None,
            qc: QcConfig::default(),
            overlay: OverlayConfig::default(),
            imagery: ImageryConfig::default(),
            detection: DetectionConfig::default(),
        }
    }
}

/// Which imagery provider to use, plus adjustments to it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImageryConfig {
    /// Registry id of the provider.
    pub provider: String,
    /// Provider-specific overrides.
    #[serde(flatten)]
    pub overrides: ImageryOverrides,
}

impl Default for ImageryConfig {
    fn default() -> Self {
        Self {
            provider: "esri".to_string(),
            overrides: ImageryOverrides::default(),
        }
    }
}

/// Detector selection. Exactly one of `predictions` or `url` must be set
/// before a batch can run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Precomputed predictions file.
    pub predictions: Option<PathBuf>,
    /// HTTP inference endpoint.
    pub url: Option<String>,
    /// Request timeout for the HTTP endpoint.
    pub timeout_secs: u64,
    /// Raw detections scoring below this are dropped.
    pub min_score: f64,
    /// When set, only these class ids are kept.
    pub classes: Option<Vec<u32>>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            predictions: None,
            url: None,
            timeout_secs: 60,
            min_score: 0.0,
            classes: None,
        }
    }
}

/// A resolved detector backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorBackend {
    /// Read detections from a predictions file.
    Predictions(PathBuf),
    /// Post images to an inference endpoint.
    Http {
        /// Endpoint URL.
        url: String,
        /// Request timeout in seconds.
        timeout_secs: u64,
    },
}

impl DetectionConfig {
    /// Resolves which backend is configured.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] unless exactly one backend is set.
    pub fn backend(&self) -> Result<DetectorBackend, PipelineError> {
        match (&self.predictions, &self.url) {
            (Some(path), None) => Ok(DetectorBackend::Predictions(path.clone())),
            (None, Some(url)) => Ok(DetectorBackend::Http {
                url: url.clone(),
                timeout_secs: self.timeout_secs,
            }),
            (Some(_), Some(_)) => Err(PipelineError::Config {
                message: "set either detection.predictions or detection.url, not both"
                    .to_string(),
            }),
            (None, None) => Err(PipelineError::Config {
                message: "no detector configured (detection.predictions or detection.url)"
                    .to_string(),
            }),
        }
    }

    /// The filter applied to raw detections.
    #[must_use]
    pub fn filter(&self) -> DetectionFilter {
        DetectionFilter {
            min_score: self.min_score,
            classes: self.classes.clone(),
        }
    }
}

impl PipelineConfig {
    /// Parses a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the TOML is malformed or a
    /// value is out of range.
    pub fn from_toml(contents: &str) -> Result<Self, PipelineError> {
        let config: Self = toml::de::from_str(contents).map_err(|e| PipelineError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let contents = std::fs::read_to_string(path).map_err(|e| PipelineError::Config {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        let config = Self::from_toml(&contents)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads the configuration from `path`, falling back to the file named
    /// by [`CONFIG_ENV`], then to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a named file cannot be read or parsed.
    pub fn resolve(path: Option<&Path>) -> Result<Self, PipelineError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match std::env::var(CONFIG_ENV) {
            Ok(env_path) if !env_path.trim().is_empty() => Self::load(Path::new(env_path.trim())),
            _ => {
                log::debug!("No configuration file given; using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] describing the first bad value.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let bad = |message: String| Err(PipelineError::Config { message });

        if !(0..=i32::from(MAX_ZOOM)).contains(&self.zoom) {
            return bad(format!(
                "zoom must be within 0..={MAX_ZOOM}, got {}",
                self.zoom
            ));
        }
        if self.concurrency == 0 {
            return bad("concurrency must be at least 1".to_string());
        }
        if !self.buffer_radius_sqft.is_finite() || self.buffer_radius_sqft < 0.0 {
            return bad(format!(
                "buffer_radius_sqft must be a non-negative number, got {}",
                self.buffer_radius_sqft
            ));
        }
        if !(0.0..=1.0).contains(&self.qc.min_confidence) {
            return bad(format!(
                "qc.min_confidence must be within 0..=1, got {}",
                self.qc.min_confidence
            ));
        }
        if !(0.0..=1.0).contains(&self.qc.max_cloud_cover) {
            return bad(format!(
                "qc.max_cloud_cover must be within 0..=1, got {}",
                self.qc.max_cloud_cover
            ));
        }
        Ok(())
    }
}
