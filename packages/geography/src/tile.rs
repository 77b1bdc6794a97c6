//! Spherical-Mercator (Web Mercator) slippy tile math.
//!
//! See <https://wiki.openstreetmap.org/wiki/Slippy_map_tilenames>.

use std::f64::consts::PI;

use solar_map_site_models::TileAddress;

use crate::GeoError;

/// Ground resolution of one pixel of a 256-px tile at the equator at zoom
/// 0, in meters (equatorial circumference / 256).
pub const EQUATORIAL_METERS_PER_PIXEL: f64 = 156_543.033_92;

/// Deepest zoom level accepted by [`locate`].
pub const MAX_ZOOM: u8 = 30;

/// Number of tiles along one axis at `zoom`.
fn tiles_per_axis(zoom: u8) -> f64 {
    2_f64.powi(i32::from(zoom))
}

fn validate_zoom(zoom: i32) -> Result<u8, GeoError> {
    u8::try_from(zoom)
        .ok()
        .filter(|z| *z <= MAX_ZOOM)
        .ok_or(GeoError::InvalidZoom {
            zoom,
            max: MAX_ZOOM,
        })
}

fn validate_latitude(latitude: f64) -> Result<f64, GeoError> {
    if latitude.is_finite() && latitude.abs() < 90.0 {
        Ok(latitude)
    } else {
        Err(GeoError::InvalidLatitude { latitude })
    }
}

/// Clamps a fractional tile index into `0..n` and truncates it.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn tile_index(fractional: f64, n: f64) -> u32 {
    fractional.floor().clamp(0.0, n - 1.0) as u32
}

/// Linear ground resolution (meters per pixel of a 256-px tile) at a
/// latitude in radians, with `n` tiles per axis.
fn ground_resolution(lat_rad: f64, n: f64) -> f64 {
    EQUATORIAL_METERS_PER_PIXEL * lat_rad.cos() / n
}

/// Converts a coordinate and zoom level into a tile address.
///
/// Tile indices follow the standard slippy-map formula. Latitudes beyond
/// the Mercator limit (about ±85.0511°) clamp to the first or last tile
/// row, and longitude 180° maps to the last tile column.
///
/// # Errors
///
/// Returns [`GeoError`] if `|latitude| >= 90`, the longitude is outside
/// `[-180, 180]`, either is non-finite, or the zoom is negative or deeper
/// than [`MAX_ZOOM`]. These are permanent for the coordinate and must not
/// be retried.
pub fn locate(latitude: f64, longitude: f64, zoom: i32) -> Result<TileAddress, GeoError> {
    let latitude = validate_latitude(latitude)?;
    if !longitude.is_finite() || longitude.abs() > 180.0 {
        return Err(GeoError::InvalidLongitude { longitude });
    }
    let zoom = validate_zoom(zoom)?;

    let n = tiles_per_axis(zoom);
    let lat_rad = latitude.to_radians();

    let x = (longitude + 180.0) / 360.0 * n;
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n;

    Ok(TileAddress {
        zoom,
        x: tile_index(x, n),
        y: tile_index(y, n),
        meters_per_pixel: ground_resolution(lat_rad, n),
    })
}
