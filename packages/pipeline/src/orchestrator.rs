//! Per-site state machine and the batch loop.
//!
//! A site moves `PENDING -> IMAGE_FETCHED -> DETECTED -> ENRICHED ->
//! PERSISTED`. Any error ends that site's run and becomes a
//! [`SiteFailure`] carrying the last stage reached; it never escapes the
//! batch loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Local, NaiveDate};
use futures::StreamExt as _;
use solar_map_detection::{DetectionError, DetectionFilter, Detector, detect_site};
use solar_map_enrich::EnrichError;
use solar_map_enrich::{area, overlay, qc};
use solar_map_geography::GeoError;
use solar_map_imagery::{FetchRequest, ImageFetcher, ImageryError};
use solar_map_site_models::{
    BatchSummary, ImageRecord, Site, SiteFailure, SiteResult, SiteStage,
};
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::progress::ProgressCallback;
use crate::{PipelineError, persist};

/// Reason recorded for sites skipped after cancellation.
pub const CANCELLED: &str = "cancelled";
/// Reason recorded for sites beyond the configured `limit`.
pub const LIMITED: &str = "limit";

/// Why a single site stopped.
#[derive(Debug, Error)]
enum SiteError {
    #[error("{0}")]
    Geo(#[from] GeoError),
    #[error("image fetch failed: {0}")]
    Imagery(#[from] ImageryError),
    #[error("detection failed: {0}")]
    Detection(#[from] DetectionError),
    #[error("overlay failed: {0}")]
    Overlay(#[from] EnrichError),
    #[error("persist failed: {0}")]
    Persist(#[from] PipelineError),
}

/// Outcome of one site's run.
#[derive(Debug, Clone, PartialEq)]
pub enum SiteOutcome {
    /// The site produced a persisted result.
    Completed(Box<SiteResult>),
    /// The site stopped early.
    Failed(SiteFailure),
}

/// Everything a finished batch produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Completed results, in input order.
    pub results: Vec<SiteResult>,
    /// Failed or skipped sites, in input order.
    pub failures: Vec<SiteFailure>,
    /// Counts.
    pub summary: BatchSummary,
}

/// Rounds a value for serialization.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Drives sites through fetch, detection, enrichment, and persistence.
pub struct SiteBatchOrchestrator {
    fetcher: Arc<dyn ImageFetcher>,
    detector: Arc<dyn Detector>,
    config: PipelineConfig,
    filter: DetectionFilter,
    output_dir: PathBuf,
    today: NaiveDate,
}

impl SiteBatchOrchestrator {
    /// Creates an orchestrator writing into `output_dir`.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        detector: Arc<dyn Detector>,
        config: PipelineConfig,
        output_dir: &Path,
    ) -> Self {
        let filter = config.detection.filter();
        Self {
            fetcher,
            detector,
            config,
            filter,
            output_dir: output_dir.to_path_buf(),
            today: Local::now().date_naive(),
        }
    }

    /// Overrides the date imagery age is measured against.
    #[must_use]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// The directory results are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn mark_stale(&self, image: &mut ImageRecord) {
        let too_old = self
            .config
            .qc
            .stale_after_days
            .zip(image.metadata.capture_date)
            .is_some_and(|(days, captured)| qc::is_older_than(captured, self.today, days));
        if too_old && !image.metadata.stale {
            log::debug!(
                "Sample {}: imagery captured {:?} is stale",
                image.sample_id,
                image.metadata.capture_date
            );
            image.metadata.stale = true;
        }
    }

    async fn run_site(&self, site: Site, stage: &mut SiteStage) -> Result<SiteResult, SiteError> {
        let tile = solar_map_geography::locate(site.latitude, site.longitude, self.config.zoom)?;

        let request = FetchRequest {
            site,
            tile,
            output_path: persist::image_path(&self.output_dir, site.sample_id),
        };
        let mut image = self.fetcher.fetch(&request).await?;
        self.mark_stale(&mut image);
        *stage = SiteStage::ImageFetched;

        let detections = detect_site(self.detector.as_ref(), &image, &self.filter).await?;
        *stage = SiteStage::Detected;

        let (area_m2, geometry) =
            area::estimate(&detections.detections, image.metadata.meters_per_pixel);
        let decision = qc::decide(
            detections.has_solar.then_some(detections.confidence),
            &image.metadata,
            &self.config.qc,
        );
        log::debug!(
            "Sample {}: qc {} ({})",
            site.sample_id,
            decision.status,
            decision.reason
        );

        let overlay_path = if self.config.overlay.enabled {
            let target = overlay::overlay_path(&self.output_dir, site.sample_id);
            let legend = overlay::legend_text(site.sample_id, self.config.buffer_radius_sqft);
            let source = image.path.clone();
            let boxes = detections.detections.clone();
            let rendered = tokio::task::spawn_blocking(move || {
                overlay::render(&source, &boxes, &legend, &target)
            })
            .await
            .unwrap_or_else(|e| Err(EnrichError::Io(std::io::Error::other(e))));
            match rendered {
                Ok(_) => Some(format!("overlays/{}.png", site.sample_id)),
                Err(e) if self.config.overlay.required => return Err(e.into()),
                Err(e) => {
                    log::warn!("Sample {}: overlay skipped: {e}", site.sample_id);
                    None
                }
            }
        } else {
            None
        };
        *stage = SiteStage::Enriched;

        let result = SiteResult {
            sample_id: site.sample_id,
            lat: site.latitude,
            lon: site.longitude,
            has_solar: detections.has_solar,
            confidence: detections.confidence,
            pv_area_sqm_est: round2(area_m2),
            buffer_radius_sqft: self.config.buffer_radius_sqft,
            qc_status: decision.status,
            bbox_or_mask: geometry,
            image_metadata: image.metadata,
            overlay_path,
        };

        persist::write_site_result(&self.output_dir, &result)?;
        *stage = SiteStage::Persisted;

        Ok(result)
    }

    /// Runs one site to completion or failure.
    pub async fn process_site(&self, site: Site) -> SiteOutcome {
        log::info!(
            "Processing sample {} ({}, {})",
            site.sample_id,
            site.latitude,
            site.longitude
        );

        let mut stage = SiteStage::Pending;
        match self.run_site(site, &mut stage).await {
            Ok(result) => {
                log::info!(
                    "Sample {}: has_solar={} confidence={:.2} area={:.2} m² qc={}",
                    result.sample_id,
                    result.has_solar,
                    result.confidence,
                    result.pv_area_sqm_est,
                    result.qc_status
                );
                SiteOutcome::Completed(Box::new(result))
            }
            Err(e) => {
                log::error!("Sample {} failed at {stage}: {e}", site.sample_id);
                SiteOutcome::Failed(failure(site, stage, e.to_string()))
            }
        }
    }

    /// Processes `sites` and writes the aggregate files.
    ///
    /// At most `concurrency` sites are in flight; results keep input
    /// order. Once `cancel` is set no further site starts, and every
    /// unstarted site is recorded as a failure with reason `cancelled`.
    /// Sites beyond the configured `limit` are recorded as failures with
    /// reason `limit`, so every input site appears in the report.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] only if the output directory or the
    /// aggregate files cannot be written. Per-site problems are reported
    /// in the [`BatchReport`].
    pub async fn run(
        &self,
        sites: Vec<Site>,
        progress: &dyn ProgressCallback,
        cancel: &AtomicBool,
    ) -> Result<BatchReport, PipelineError> {
        std::fs::create_dir_all(&self.output_dir)?;

        progress.set_total(sites.len() as u64);

        let mut sites = sites;
        let skipped = match self.config.limit {
            Some(limit) if sites.len() > limit => {
                log::info!("Limiting batch to {limit} of {} sites", sites.len());
                sites.split_off(limit)
            }
            _ => Vec::new(),
        };

        let concurrency = self.config.concurrency.max(1);
        log::info!(
            "Starting batch of {} sites (imagery: {}, detector: {}, concurrency: {concurrency})",
            sites.len(),
            self.fetcher.id(),
            self.detector.name()
        );

        let outcomes = futures::stream::iter(sites)
            .map(|site| async move {
                if cancel.load(Ordering::SeqCst) {
                    SiteOutcome::Failed(failure(site, SiteStage::Pending, CANCELLED.to_string()))
                } else {
                    progress.set_message(format!("sample {}", site.sample_id));
                    self.process_site(site).await
                }
            })
            .buffered(concurrency);
        let mut outcomes = std::pin::pin!(outcomes);

        let mut report = BatchReport::default();
        while let Some(outcome) = outcomes.next().await {
            match outcome {
                SiteOutcome::Completed(result) => {
                    report.summary.record_result(&result);
                    report.results.push(*result);
                }
                SiteOutcome::Failed(failure) => {
                    report.summary.record_failure();
                    report.failures.push(failure);
                }
            }
            progress.inc(1);
        }

        for site in skipped {
            report.summary.record_failure();
            report
                .failures
                .push(failure(site, SiteStage::Pending, LIMITED.to_string()));
            progress.inc(1);
        }

        persist::write_aggregates(&self.output_dir, &report.results, &report.failures)?;

        let summary = report.summary;
        log::info!(
            "Batch complete: {} sites, {} completed ({} verifiable, {} not verifiable, {} with solar), {} failed",
            summary.total,
            summary.completed,
            summary.verifiable,
            summary.not_verifiable,
            summary.with_solar,
            summary.failed
        );
        progress.finish(format!(
            "{} completed, {} failed",
            summary.completed, summary.failed
        ));

        Ok(report)
    }
}

fn failure(site: Site, stage: SiteStage, reason: String) -> SiteFailure {
    SiteFailure {
        sample_id: site.sample_id,
        lat: site.latitude,
        lon: site.longitude,
        stage,
        reason,
    }
}
