//! Audit overlays.
//!
//! An overlay is a copy of the site image with every detection outlined
//! in green and a legend block in the top-left corner naming the site and
//! its buffer radius. The buffer radius is informational only; nothing is
//! georeferenced onto the image.

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use solar_map_site_models::Detection;

use crate::EnrichError;
use crate::glyphs::{self, ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LEGEND_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const LEGEND_TEXT: Rgb<u8> = Rgb([255, 255, 255]);

/// Outline thickness of detection boxes, in pixels.
pub const BOX_THICKNESS: u32 = 3;
/// Legend glyph scale factor.
const SCALE: u32 = 2;
/// Padding around legend text, in pixels.
const PAD: u32 = 4;
/// Distance of an attribution from the image edges, in pixels.
const ATTRIBUTION_MARGIN: u32 = 5;

/// Overlay settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Whether overlays are rendered at all.
    pub enabled: bool,
    /// Whether a rendering failure fails the site.
    pub required: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: false,
        }
    }
}

/// Legend text for a site.
#[must_use]
pub fn legend_text(sample_id: i64, buffer_radius_sqft: f64) -> String {
    format!("sample_id={sample_id}, buffer={buffer_radius_sqft} sqft")
}

/// Where the overlay for `sample_id` is written under `output_dir`.
#[must_use]
pub fn overlay_path(output_dir: &Path, sample_id: i64) -> PathBuf {
    output_dir.join("overlays").join(format!("{sample_id}.png"))
}

/// Size of the legend block for `text`, in pixels.
#[must_use]
pub fn legend_size(text: &str) -> (u32, u32) {
    (
        glyphs::text_width(text) * SCALE + PAD * 2,
        GLYPH_HEIGHT * SCALE + PAD * 2,
    )
}

/// Pixel bounds of a detection box clamped to the image, as
/// `(left, top, width, height)`. `None` if nothing of the box is visible.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_box(detection: &Detection, width: u32, height: u32) -> Option<(i32, i32, u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }
    let max_x = f64::from(width - 1);
    let max_y = f64::from(height - 1);
    let b = detection.bbox;

    if b.x2 < 0.0 || b.y2 < 0.0 || b.x1 > max_x || b.y1 > max_y {
        return None;
    }

    let left = b.x1.floor().clamp(0.0, max_x);
    let top = b.y1.floor().clamp(0.0, max_y);
    let right = b.x2.ceil().clamp(left, max_x);
    let bottom = b.y2.ceil().clamp(top, max_y);

    Some((
        left as i32,
        top as i32,
        (right - left) as u32 + 1,
        (bottom - top) as u32 + 1,
    ))
}

fn draw_detection(img: &mut RgbImage, detection: &Detection) {
    let Some((left, top, w, h)) = clamp_box(detection, img.width(), img.height()) else {
        log::debug!("Detection {:?} lies outside the image", detection.bbox);
        return;
    };
    for inset in 0..BOX_THICKNESS {
        let shrink = inset * 2;
        if w <= shrink || h <= shrink {
            break;
        }
        #[allow(clippy::cast_possible_wrap)]
        let offset = inset as i32;
        let rect = Rect::at(left + offset, top + offset).of_size(w - shrink, h - shrink);
        draw_hollow_rect_mut(img, rect, BOX_COLOR);
    }
}

/// Draws `text` with its top-left glyph corner at `(x, y)`, stopping at
/// the right edge of the image.
#[allow(clippy::cast_possible_wrap)]
fn draw_text(img: &mut RgbImage, text: &str, (x, y): (u32, u32), scale: u32, color: Rgb<u8>) {
    let mut x = x;
    for ch in text.chars() {
        if x >= img.width() {
            break;
        }
        let rows = glyphs::glyph(ch);
        for (row, bits) in (0u32..).zip(rows) {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let px = x + col * scale;
                let py = y + row * scale;
                draw_filled_rect_mut(
                    img,
                    Rect::at(px as i32, py as i32).of_size(scale, scale),
                    color,
                );
            }
        }
        x += ADVANCE * scale;
    }
}

fn draw_legend(img: &mut RgbImage, text: &str) {
    let (w, h) = legend_size(text);
    draw_filled_rect_mut(img, Rect::at(0, 0).of_size(w, h), LEGEND_BACKGROUND);
    draw_text(img, text, (PAD, PAD), SCALE, LEGEND_TEXT);
}

/// Writes a provider attribution in white, unscaled, in the bottom-left
/// corner of `img`.
///
/// The corner is kept clear of the overlay legend, which sits top-left.
pub fn stamp_attribution(img: &mut RgbImage, text: &str) {
    let y = img.height().saturating_sub(GLYPH_HEIGHT + ATTRIBUTION_MARGIN);
    draw_text(img, text, (ATTRIBUTION_MARGIN, y), 1, LEGEND_TEXT);
}

/// Draws `detections` and `legend` onto a copy of the image at
/// `image_path` and writes it as PNG to `output_path`.
///
/// The source image is never modified. Parent directories of
/// `output_path` are created as needed.
///
/// # Errors
///
/// Returns [`EnrichError`] if the source cannot be decoded or the overlay
/// cannot be written.
pub fn render(
    image_path: &Path,
    detections: &[Detection],
    legend: &str,
    output_path: &Path,
) -> Result<PathBuf, EnrichError> {
    let mut img = image::open(image_path)?.to_rgb8();

    for detection in detections {
        draw_detection(&mut img, detection);
    }
    draw_legend(&mut img, legend);

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    img.save(output_path)?;

    log::debug!(
        "Wrote overlay with {} boxes to {}",
        detections.len(),
        output_path.display()
    );

    Ok(output_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use solar_map_site_models::BoundingBox;

    use super::*;

    fn det(x1: f64, y1: f64, x2: f64, y2: f64) -> Detection {
        Detection {
            bbox: BoundingBox::new(x1, y1, x2, y2).unwrap(),
            confidence: 0.9,
            class_id: 0,
        }
    }

    fn write_source(dir: &Path) -> PathBuf {
        let path = dir.join("7_rooftop.png");
        RgbImage::from_pixel(320, 240, Rgb([120, 120, 120]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn legend_and_path_format() {
        assert_eq!(legend_text(42, 1200.0), "sample_id=42, buffer=1200 sqft");
        assert_eq!(legend_text(1, 2400.5), "sample_id=1, buffer=2400.5 sqft");
        assert_eq!(
            overlay_path(Path::new("/out"), 42),
            PathBuf::from("/out/overlays/42.png")
        );
    }

    #[test]
    fn renders_boxes_and_legend_without_touching_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path());
        let before = std::fs::read(&source).unwrap();

        let out = overlay_path(dir.path(), 7);
        let written = render(
            &source,
            &[det(100.0, 120.0, 200.0, 200.0)],
            &legend_text(7, 1200.0),
            &out,
        )
        .unwrap();
        assert_eq!(written, out);
        assert_eq!(std::fs::read(&source).unwrap(), before);

        let overlay = image::open(&out).unwrap().to_rgb8();
        assert_eq!(overlay.dimensions(), (320, 240));
        // outline and its inner edges
        assert_eq!(*overlay.get_pixel(100, 150), BOX_COLOR);
        assert_eq!(*overlay.get_pixel(102, 150), BOX_COLOR);
        // interior untouched
        assert_eq!(*overlay.get_pixel(150, 160), Rgb([120, 120, 120]));
        // legend background in the corner
        assert_eq!(*overlay.get_pixel(0, 0), LEGEND_BACKGROUND);
    }

    #[test]
    fn clamps_boxes_that_leave_the_image() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path());
        let out = dir.path().join("overlay.png");

        render(
            &source,
            &[det(-50.0, 200.0, 400.0, 400.0), det(500.0, 500.0, 600.0, 600.0)],
            "",
            &out,
        )
        .unwrap();

        let overlay = image::open(&out).unwrap().to_rgb8();
        assert_eq!(*overlay.get_pixel(0, 220), BOX_COLOR);
        assert_eq!(*overlay.get_pixel(319, 239), BOX_COLOR);
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = render(
            &dir.path().join("missing.png"),
            &[],
            "x",
            &dir.path().join("out.png"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn attribution_is_stamped_bottom_left() {
        let mut img = RgbImage::from_pixel(64, 32, Rgb([0, 0, 0]));
        stamp_attribution(&mut img, "© Esri");

        // top row of the copyright sign starts one pixel in
        let top = 32 - GLYPH_HEIGHT - ATTRIBUTION_MARGIN;
        assert_eq!(*img.get_pixel(ATTRIBUTION_MARGIN + 1, top), LEGEND_TEXT);
        assert_eq!(*img.get_pixel(ATTRIBUTION_MARGIN, top), Rgb([0, 0, 0]));
        // nothing drawn in the top half
        assert!(
            img.enumerate_pixels()
                .filter(|(_, y, _)| *y < 16)
                .all(|(_, _, p)| *p == Rgb([0, 0, 0]))
        );
    }

    #[test]
    fn attribution_on_tiny_image_does_not_panic() {
        let mut img = RgbImage::from_pixel(3, 3, Rgb([9, 9, 9]));
        stamp_attribution(&mut img, "© Esri");
        assert_eq!(img.dimensions(), (3, 3));
    }

    #[test]
    fn legend_grows_with_text() {
        let (short_w, short_h) = legend_size("a");
        let (long_w, long_h) = legend_size("sample_id=1, buffer=1200 sqft");
        assert!(long_w > short_w);
        assert_eq!(short_h, long_h);
    }
}
