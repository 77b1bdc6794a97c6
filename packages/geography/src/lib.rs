#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Slippy-map tile addressing for site coordinates.
//!
//! Converts a WGS84 `(latitude, longitude, zoom)` triple into a
//! spherical-Mercator tile address and the linear ground resolution of one
//! tile pixel at that latitude. Everything here is pure arithmetic; the
//! imagery providers use the result to decide which raster to fetch and the
//! area estimator uses the resolution to turn pixels into square meters.

pub mod tile;

pub use tile::{MAX_ZOOM, locate};

use thiserror::Error;

/// Errors that can occur while addressing a coordinate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeoError {
    /// Latitude is non-finite or at/beyond a pole, where the Mercator
    /// projection is undefined.
    #[error("Invalid latitude {latitude}: must be finite and strictly between -90 and 90")]
    InvalidLatitude {
        /// The rejected latitude.
        latitude: f64,
    },

    /// Longitude is non-finite or outside `[-180, 180]`.
    #[error("Invalid longitude {longitude}: must be finite and within [-180, 180]")]
    InvalidLongitude {
        /// The rejected longitude.
        longitude: f64,
    },

    /// Zoom level is negative or too deep to index with `u32` tiles.
    #[error("Invalid zoom level {zoom}: must be within 0..={max}")]
    InvalidZoom {
        /// The rejected zoom level.
        zoom: i32,
        /// The deepest supported zoom level.
        max: u8,
    },
}
