//! Pixel-to-area conversion.
//!
//! Each detection box is treated as a rectangle of PV panels. Areas are
//! kept at full precision; rounding happens where results are serialized.

use solar_map_site_models::Detection;

/// Geometry string for an empty detection list.
pub const EMPTY_GEOMETRY: &str = "[]";

/// Estimates PV area in square meters and serializes the detection boxes.
///
/// Area is `sum((x2 - x1) * (y2 - y1)) * meters_per_pixel²`. The geometry
/// string lists every box as `[x1, y1, x2, y2]` in input order. A
/// non-positive or non-finite resolution, or an empty detection list,
/// yields `(0.0, "[]")`.
#[must_use]
pub fn estimate(detections: &[Detection], meters_per_pixel: f64) -> (f64, String) {
    if detections.is_empty() || !meters_per_pixel.is_finite() || meters_per_pixel <= 0.0 {
        return (0.0, EMPTY_GEOMETRY.to_string());
    }

    let pixel_area: f64 = detections
        .iter()
        .map(|d| d.bbox.pixel_area().max(0.0))
        .sum();

    (
        pixel_area * meters_per_pixel * meters_per_pixel,
        serialize_boxes(detections),
    )
}

/// Serializes boxes as `[[x1, y1, x2, y2], ...]`.
#[must_use]
pub fn serialize_boxes(detections: &[Detection]) -> String {
    let boxes: Vec<String> = detections
        .iter()
        .map(|d| {
            let [x1, y1, x2, y2] = d.bbox.to_array();
            format!("[{x1:?}, {y1:?}, {x2:?}, {y2:?}]")
        })
        .collect();
    format!("[{}]", boxes.join(", "))
}
