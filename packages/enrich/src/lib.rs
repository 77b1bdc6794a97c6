#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-site enrichment of detection output.
//!
//! - [`area`] converts pixel-space boxes and a ground resolution into an
//!   estimated PV area in square meters.
//! - [`qc`] decides whether a site's result is verifiable from image
//!   quality and detection confidence.
//! - [`overlay`] draws detections and a legend onto a copy of the source
//!   image for auditors.

pub mod area;
mod glyphs;
pub mod overlay;
pub mod qc;

use thiserror::Error;

/// Errors from enrichment steps.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// The source image could not be read, or the overlay written.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
