//! Builds the imagery and detection backends a configuration names.

use std::sync::Arc;
use std::time::Duration;

use solar_map_detection::Detector;
use solar_map_detection::http::HttpDetector;
use solar_map_detection::predictions::PredictionsDetector;
use solar_map_imagery::{ImageFetcher, create_fetcher, registry};

use crate::PipelineError;
use crate::config::{DetectorBackend, PipelineConfig};

const USER_AGENT: &str = "solar-map/0.1";

/// Builds the configured imagery fetcher.
///
/// # Errors
///
/// Returns [`PipelineError`] if the provider id is unknown or the provider
/// cannot be set up (e.g. a missing API key).
pub fn imagery(config: &PipelineConfig) -> Result<Arc<dyn ImageFetcher>, PipelineError> {
    let mut provider =
        registry::provider(&config.imagery.provider).ok_or_else(|| PipelineError::Config {
            message: format!(
                "unknown imagery provider '{}' (available: {})",
                config.imagery.provider,
                registry::all_providers()
                    .iter()
                    .map(|p| p.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })?;
    provider.apply_overrides(&config.imagery.overrides);

    let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
    let fetcher = create_fetcher(&provider, client)?;
    log::info!("Using imagery provider {} ({})", provider.id, provider.name);
    Ok(Arc::from(fetcher))
}

/// Builds the configured detector.
///
/// # Errors
///
/// Returns [`PipelineError`] if no single backend is configured or the
/// predictions file cannot be loaded.
pub fn detector(config: &PipelineConfig) -> Result<Arc<dyn Detector>, PipelineError> {
    match config.detection.backend()? {
        DetectorBackend::Predictions(path) => {
            Ok(Arc::new(PredictionsDetector::load(&path)?))
        }
        DetectorBackend::Http { url, timeout_secs } => {
            let client = reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(timeout_secs))
                .build()?;
            log::info!("Using inference endpoint {url}");
            Ok(Arc::new(HttpDetector::new(client, &url)))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn unknown_provider_is_a_config_error() {
        let mut config = PipelineConfig::default();
        config.imagery.provider = "nope".to_string();
        assert!(matches!(
            imagery(&config),
            Err(PipelineError::Config { .. })
        ));
    }

    #[test]
    fn builds_local_provider_with_override() {
        let mut config = PipelineConfig::default();
        config.imagery.provider = "local".to_string();
        config.imagery.overrides.local_dir = Some(PathBuf::from("/tmp/images"));
        assert_eq!(imagery(&config).unwrap().id(), "local");
    }

    #[test]
    fn builds_predictions_detector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.json");
        std::fs::write(&path, "[]").unwrap();

        let mut config = PipelineConfig::default();
        config.detection.predictions = Some(path);
        assert_eq!(detector(&config).unwrap().name(), "predictions");

        config.detection.predictions = Some(dir.path().join("missing.json"));
        assert!(matches!(
            detector(&config),
            Err(PipelineError::Detection(_))
        ));
    }

    #[test]
    fn builds_http_detector() {
        let mut config = PipelineConfig::default();
        config.detection.url = Some("http://localhost:8000/detect".to_string());
        assert_eq!(detector(&config).unwrap().name(), "http");
    }
}
