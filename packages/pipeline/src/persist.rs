//! Output files.
//!
//! Layout under the output directory:
//!
//! - `<sample_id>_rooftop.jpg`: fetched image (remote providers)
//! - `<sample_id>.json`: per-site result
//! - `overlays/<sample_id>.png`: audit overlay
//! - `all_predictions.json`: every completed result, in input order
//! - `failures.json`: every failed or skipped site
//!
//! JSON files are written to a `.tmp` sibling and renamed into place, so
//! an interrupted run never leaves a truncated record behind.

use std::path::{Path, PathBuf};

use serde::Serialize;
use solar_map_site_models::{SiteFailure, SiteResult};

use crate::PipelineError;

/// Aggregate results file name.
pub const AGGREGATE_FILE: &str = "all_predictions.json";
/// Failures file name.
pub const FAILURES_FILE: &str = "failures.json";

/// Where the image for `sample_id` is downloaded to.
#[must_use]
pub fn image_path(output_dir: &Path, sample_id: i64) -> PathBuf {
    output_dir.join(format!("{sample_id}_rooftop.jpg"))
}

/// Where the result record for `sample_id` is written.
#[must_use]
pub fn site_record_path(output_dir: &Path, sample_id: i64) -> PathBuf {
    output_dir.join(format!("{sample_id}.json"))
}

/// Writes `value` as pretty JSON via a temporary file and rename.
///
/// # Errors
///
/// Returns [`PipelineError`] if serialization or any file operation fails.
pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), PipelineError> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let contents = serde_json::to_string_pretty(value)?;
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Writes one site's result record.
///
/// # Errors
///
/// Returns [`PipelineError`] if the record cannot be written.
pub fn write_site_result(
    output_dir: &Path,
    result: &SiteResult,
) -> Result<PathBuf, PipelineError> {
    let path = site_record_path(output_dir, result.sample_id);
    write_json_atomic(&path, result)?;
    log::debug!(
        "Saved result for sample {} to {}",
        result.sample_id,
        path.display()
    );
    Ok(path)
}

/// Writes the aggregate results and failures files.
///
/// # Errors
///
/// Returns [`PipelineError`] if either file cannot be written.
pub fn write_aggregates(
    output_dir: &Path,
    results: &[SiteResult],
    failures: &[SiteFailure],
) -> Result<(), PipelineError> {
    let aggregate = output_dir.join(AGGREGATE_FILE);
    write_json_atomic(&aggregate, results)?;
    log::info!("Saved {} results to {}", results.len(), aggregate.display());

    let failures_path = output_dir.join(FAILURES_FILE);
    write_json_atomic(&failures_path, failures)?;
    if !failures.is_empty() {
        log::info!(
            "Saved {} failures to {}",
            failures.len(),
            failures_path.display()
        );
    }
    Ok(())
}
