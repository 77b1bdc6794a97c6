#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Site batch pipeline.
//!
//! Loads a site list, then drives every site through tile location, image
//! fetch, detection, area estimation, QC, and overlay rendering, writing a
//! JSON record per site and aggregate files for the whole batch. A failure
//! at any step is confined to its site: the site is recorded in
//! `failures.json` and the batch moves on.
//!
//! Input errors (unreadable or malformed site list, bad configuration)
//! abort the batch before any site is processed.

pub mod backends;
pub mod config;
pub mod orchestrator;
pub mod persist;
pub mod progress;
pub mod sites;

use solar_map_detection::DetectionError;
use solar_map_imagery::ImageryError;
use thiserror::Error;

pub use config::PipelineConfig;
pub use orchestrator::{BatchReport, SiteBatchOrchestrator, SiteOutcome};

/// Errors that abort a batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// I/O error (site list, output directory, aggregate files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The site list is not valid CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The site list spreadsheet could not be read.
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    /// The site list lacks a required column.
    #[error("Site list is missing required column '{column}'")]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },

    /// A site row could not be parsed or is out of range.
    #[error("Invalid site on line {line}: {message}")]
    InvalidSite {
        /// 1-based line number in the site list.
        line: u64,
        /// What is wrong with the row.
        message: String,
    },

    /// Two rows share a `sample_id`.
    #[error("Duplicate sample_id {sample_id} on line {line}")]
    DuplicateSampleId {
        /// The repeated identifier.
        sample_id: i64,
        /// 1-based line number of the second occurrence.
        line: u64,
    },

    /// The configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what is wrong.
        message: String,
    },

    /// The imagery backend could not be set up.
    #[error("Imagery setup failed: {0}")]
    Imagery(#[from] ImageryError),

    /// The detection backend could not be set up.
    #[error("Detector setup failed: {0}")]
    Detection(#[from] DetectionError),

    /// HTTP client construction failed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
